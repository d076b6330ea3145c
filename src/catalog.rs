use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::SyncError;

/// One dataset entry of the catalog.
///
/// Fields that are absent, `null` or of the wrong JSON type read as empty,
/// so a single odd entry is skipped by the filter instead of failing the
/// whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub modified: String,
    #[serde(default, deserialize_with = "lenient_distribution")]
    pub distribution: Vec<Distribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(rename = "downloadURL", default)]
    pub download_url: String,
}

impl CatalogItem {
    pub fn new(title: &str, modified: &str, download_url: &str) -> Self {
        Self {
            title: title.to_string(),
            modified: modified.to_string(),
            distribution: vec![Distribution {
                download_url: download_url.to_string(),
            }],
        }
    }

    pub fn first_download_url(&self) -> Option<&str> {
        self.distribution
            .first()
            .map(|dist| dist.download_url.as_str())
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

// Entries keep their position: a malformed first entry still counts as the
// first distribution.
fn lenient_distribution<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Distribution>, D::Error> {
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .iter()
        .map(|entry| Distribution {
            download_url: entry
                .get("downloadURL")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect())
}

/// Source of the dataset index and of the CSV bodies it points at.
pub trait CatalogClient: Send + Sync {
    fn fetch_catalog(&self) -> Result<Vec<CatalogItem>, SyncError>;

    /// Opens `url` for streaming. Non-success statuses are errors.
    fn open_download(&self, url: &str) -> Result<Box<dyn Read + Send>, SyncError>;
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    catalog_url: String,
}

impl CatalogHttpClient {
    pub fn new(catalog_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cms-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::InvalidConfig(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            catalog_url: catalog_url.to_string(),
        })
    }
}

impl CatalogClient for CatalogHttpClient {
    fn fetch_catalog(&self) -> Result<Vec<CatalogItem>, SyncError> {
        let response = self
            .client
            .get(&self.catalog_url)
            .send()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(SyncError::CatalogStatus { status, message });
        }
        let body = response
            .bytes()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        parse_catalog(&body)
    }

    fn open_download(&self, url: &str) -> Result<Box<dyn Read + Send>, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(SyncError::DownloadStatus { status, message });
        }
        Ok(Box::new(response))
    }
}

/// Parses the catalog body. Only a body that is not a JSON array is an
/// error; entries that are not objects become empty items.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<CatalogItem>, SyncError> {
    let entries: Vec<Value> =
        serde_json::from_slice(body).map_err(|err| SyncError::CatalogParse(err.to_string()))?;
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry).unwrap_or_else(|err| {
                warn!(index, error = %err, "unreadable catalog entry");
                CatalogItem::default()
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_with_missing_fields() {
        let body = br#"[
            {"title": "Hospital X", "modified": "2024-01-01",
             "distribution": [{"downloadURL": "https://example.org/x.csv", "mediaType": "text/csv"}],
             "keyword": ["hospital"]},
            {"title": "Untitled"}
        ]"#;
        let items = parse_catalog(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].first_download_url(), Some("https://example.org/x.csv"));
        assert_eq!(items[1].modified, "");
        assert!(items[1].first_download_url().is_none());
    }

    #[test]
    fn null_and_mistyped_fields_read_as_empty() {
        let body = br#"[
            {"title": "Hospital X", "modified": "2024-01-01",
             "distribution": [{"downloadURL": "https://example.org/x.csv"}]},
            {"title": "Some Dataset", "modified": null, "distribution": null},
            {"title": 42, "modified": ["x"], "distribution": {"downloadURL": "a.csv"}},
            {"title": "Hospital Y", "distribution": [null, {"downloadURL": "https://example.org/y.csv"}]},
            {"title": "Hospital Z", "distribution": [{"downloadURL": null}]},
            null
        ]"#;
        let items = parse_catalog(body).unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].first_download_url(), Some("https://example.org/x.csv"));
        assert_eq!(items[1].title, "Some Dataset");
        assert_eq!(items[1].modified, "");
        assert!(items[1].distribution.is_empty());
        assert_eq!(items[2].title, "");
        assert_eq!(items[2].modified, "");
        assert!(items[2].distribution.is_empty());
        assert_eq!(items[3].first_download_url(), Some(""));
        assert_eq!(items[3].distribution[1].download_url, "https://example.org/y.csv");
        assert_eq!(items[4].first_download_url(), Some(""));
        assert_eq!(items[5], CatalogItem::default());
    }

    #[test]
    fn rejects_non_array_catalog() {
        let err = parse_catalog(br#"{"error": "nope"}"#).unwrap_err();
        assert!(matches!(err, SyncError::CatalogParse(_)));
    }
}
