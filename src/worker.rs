use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{CatalogClient, CatalogItem};
use crate::error::SyncError;
use crate::filter::{ItemFilter, SkipReason};
use crate::metadata::MetadataStore;
use crate::normalize::to_snake_case;
use crate::transform::{TransformReport, write_normalized_csv};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Processed {
        title: String,
        modified: String,
        path: Utf8PathBuf,
        rows: u64,
    },
    Skipped {
        title: String,
        reason: SkipReason,
    },
    Failed {
        title: String,
        reason: String,
    },
    Planned {
        title: String,
        modified: String,
        path: Utf8PathBuf,
    },
}

impl ItemOutcome {
    pub fn title(&self) -> &str {
        match self {
            ItemOutcome::Processed { title, .. }
            | ItemOutcome::Skipped { title, .. }
            | ItemOutcome::Failed { title, .. }
            | ItemOutcome::Planned { title, .. } => title,
        }
    }
}

/// Everything one fetch-and-transform call needs, borrowed from the
/// dispatcher for the duration of a run.
pub struct Worker<'a, C: CatalogClient> {
    pub client: &'a C,
    pub metadata: &'a MetadataStore,
    pub filter: &'a ItemFilter,
    pub data_dir: &'a Utf8Path,
    pub dry_run: bool,
}

impl<C: CatalogClient> Worker<'_, C> {
    pub fn process(
        &self,
        item: &CatalogItem,
        worker_id: usize,
        sink: &dyn ProgressSink,
    ) -> ItemOutcome {
        let matched = match self.filter.evaluate(item, self.metadata) {
            Ok(matched) => matched,
            Err(reason) => {
                debug!(title = %item.title, %reason, "skipped");
                return ItemOutcome::Skipped {
                    title: item.title.clone(),
                    reason,
                };
            }
        };

        let path = match output_path(self.data_dir, &item.title) {
            Ok(path) => path,
            Err(err) => return self.fail(item, worker_id, err, sink),
        };

        if self.dry_run {
            sink.event(ProgressEvent::for_worker(
                worker_id,
                format!("Would download: {} -> {path}", item.title),
            ));
            return ItemOutcome::Planned {
                title: item.title.clone(),
                modified: item.modified.clone(),
                path,
            };
        }

        sink.event(ProgressEvent::for_worker(
            worker_id,
            format!("Downloading and processing: {}", item.title),
        ));
        info!(title = %item.title, url = matched.download_url, "download started");
        let start = Instant::now();

        match self.fetch_and_write(matched.download_url, &path) {
            Ok(report) => {
                self.metadata.record_processed(&item.title, &item.modified);
                let elapsed = start.elapsed();
                info!(
                    title = %item.title,
                    rows = report.rows,
                    columns = report.headers.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "processed"
                );
                sink.event(ProgressEvent {
                    worker: Some(worker_id),
                    message: format!("Processed: {} ({} rows)", item.title, report.rows),
                    elapsed: Some(elapsed),
                });
                ItemOutcome::Processed {
                    title: item.title.clone(),
                    modified: item.modified.clone(),
                    path,
                    rows: report.rows,
                }
            }
            Err(err) => self.fail(item, worker_id, err, sink),
        }
    }

    fn fetch_and_write(&self, url: &str, path: &Utf8Path) -> Result<TransformReport, SyncError> {
        let body = self.client.open_download(url)?;
        write_normalized_csv(body, path)
    }

    fn fail(
        &self,
        item: &CatalogItem,
        worker_id: usize,
        err: SyncError,
        sink: &dyn ProgressSink,
    ) -> ItemOutcome {
        warn!(title = %item.title, error = %err, "item failed");
        sink.event(ProgressEvent::for_worker(
            worker_id,
            format!("Error processing {}: {err}", item.title),
        ));
        ItemOutcome::Failed {
            title: item.title.clone(),
            reason: err.to_string(),
        }
    }
}

/// `<data_dir>/<normalized title>.csv`
pub fn output_path(data_dir: &Utf8Path, title: &str) -> Result<Utf8PathBuf, SyncError> {
    let stem = to_snake_case(title);
    if stem.is_empty() {
        return Err(SyncError::Filesystem(format!(
            "title {title:?} has no usable file name"
        )));
    }
    Ok(data_dir.join(format!("{stem}.csv")))
}
