use std::fmt;

use serde::Serialize;

use crate::catalog::CatalogItem;
use crate::metadata::MetadataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoMarker,
    NoCsvDistribution,
    Unchanged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoMarker => write!(f, "title lacks marker"),
            SkipReason::NoCsvDistribution => write!(f, "no csv distribution"),
            SkipReason::Unchanged => write!(f, "unchanged since last run"),
        }
    }
}

/// An in-scope item together with the URL the worker will download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedItem<'a> {
    pub item: &'a CatalogItem,
    pub download_url: &'a str,
}

#[derive(Debug, Clone)]
pub struct ItemFilter {
    title_marker: String,
    force: bool,
}

impl ItemFilter {
    pub fn new(title_marker: impl Into<String>) -> Self {
        Self {
            title_marker: title_marker.into(),
            force: false,
        }
    }

    /// Skips the change check so every marker/CSV match is reprocessed.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Conditions are checked in order and the first failure is reported.
    pub fn evaluate<'a>(
        &self,
        item: &'a CatalogItem,
        metadata: &MetadataStore,
    ) -> Result<MatchedItem<'a>, SkipReason> {
        if !item.title.contains(self.title_marker.as_str()) {
            return Err(SkipReason::NoMarker);
        }
        let download_url = match item.first_download_url() {
            Some(url) if url.ends_with(".csv") => url,
            _ => return Err(SkipReason::NoCsvDistribution),
        };
        if !self.force && !metadata.has_changed(&item.title, &item.modified) {
            return Err(SkipReason::Unchanged);
        }
        Ok(MatchedItem { item, download_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Distribution;
    use crate::metadata::MetadataRecord;
    use camino::Utf8Path;

    fn empty_store() -> MetadataStore {
        MetadataStore::with_record(Utf8Path::new("meta.json"), MetadataRecord::new())
    }

    #[test]
    fn marker_is_case_sensitive() {
        let filter = ItemFilter::new("Hospital");
        let item = CatalogItem::new("hospital lowercase", "1", "https://x/a.csv");
        assert_eq!(
            filter.evaluate(&item, &empty_store()),
            Err(SkipReason::NoMarker)
        );
    }

    #[test]
    fn only_first_distribution_counts() {
        let filter = ItemFilter::new("Hospital");
        let mut item = CatalogItem::new("Hospital Y", "1", "https://x/a.zip");
        item.distribution.push(Distribution {
            download_url: "https://x/a.csv".to_string(),
        });
        assert_eq!(
            filter.evaluate(&item, &empty_store()),
            Err(SkipReason::NoCsvDistribution)
        );
    }

    #[test]
    fn force_ignores_record() {
        let store = empty_store();
        store.record_processed("Hospital Z", "1");
        let item = CatalogItem::new("Hospital Z", "1", "https://x/z.csv");
        assert_eq!(
            ItemFilter::new("Hospital").evaluate(&item, &store),
            Err(SkipReason::Unchanged)
        );
        let matched = ItemFilter::new("Hospital")
            .with_force(true)
            .evaluate(&item, &store)
            .unwrap();
        assert_eq!(matched.download_url, "https://x/z.csv");
    }
}
