use std::collections::VecDeque;
use std::fs;
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{info, info_span};

use crate::catalog::{CatalogClient, CatalogItem};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::filter::ItemFilter;
use crate::metadata::MetadataStore;
use crate::worker::{ItemOutcome, Worker};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub catalog_items: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
    pub dry_run: bool,
    /// Outcomes in catalog order. Skips are counted but left out of the
    /// serialized form.
    #[serde(serialize_with = "serialize_reported")]
    pub items: Vec<ItemOutcome>,
}

impl RunSummary {
    fn from_outcomes(
        started_at: String,
        catalog_items: usize,
        dry_run: bool,
        items: Vec<ItemOutcome>,
    ) -> Self {
        let mut summary = Self {
            started_at,
            finished_at: iso_timestamp(),
            catalog_items,
            processed: 0,
            skipped: 0,
            failed: 0,
            planned: 0,
            dry_run,
            items: Vec::new(),
        };
        for item in &items {
            match item {
                ItemOutcome::Processed { .. } => summary.processed += 1,
                ItemOutcome::Skipped { .. } => summary.skipped += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
                ItemOutcome::Planned { .. } => summary.planned += 1,
            }
        }
        summary.items = items;
        summary
    }
}

fn serialize_reported<S: Serializer>(
    items: &[ItemOutcome],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        items
            .iter()
            .filter(|item| !matches!(item, ItemOutcome::Skipped { .. })),
    )
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub worker: Option<usize>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            worker: None,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn for_worker(worker: usize, message: impl Into<String>) -> Self {
        Self {
            worker: Some(worker),
            message: message.into(),
            elapsed: None,
        }
    }
}

/// Receives per-item progress from every worker thread.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: CatalogClient> {
    client: C,
    config: SyncConfig,
    metadata: MetadataStore,
}

impl<C: CatalogClient> App<C> {
    /// Loads the change record once; every later run of this `App` works
    /// against the in-memory copy.
    pub fn new(client: C, config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let metadata = MetadataStore::load(&config.metadata_file)?;
        info!(
            path = %config.metadata_file,
            entries = metadata.len(),
            "loaded change record"
        );
        Ok(Self {
            client,
            config,
            metadata,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// One full fetch, filter, download, write and persist cycle.
    ///
    /// Catalog and persistence failures abort the run; per-item failures
    /// are reported in the summary.
    pub fn run(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, SyncError> {
        let span = info_span!("sync", catalog = %self.config.catalog_url);
        let _guard = span.enter();
        let started_at = iso_timestamp();

        sink.event(ProgressEvent::new("Fetching dataset catalog..."));
        let items = self.client.fetch_catalog()?;
        info!(items = items.len(), "catalog fetched");

        if !options.dry_run {
            fs::create_dir_all(self.config.data_dir.as_std_path()).map_err(|err| {
                SyncError::Filesystem(format!("create {}: {err}", self.config.data_dir))
            })?;
        }

        let filter = ItemFilter::new(self.config.title_marker.as_str()).with_force(options.force);
        let worker = Worker {
            client: &self.client,
            metadata: &self.metadata,
            filter: &filter,
            data_dir: &self.config.data_dir,
            dry_run: options.dry_run,
        };
        let outcomes = dispatch(&worker, &items, self.config.workers, sink)?;

        if !options.dry_run {
            self.metadata.persist()?;
            info!(
                path = %self.metadata.path(),
                entries = self.metadata.len(),
                "change record persisted"
            );
        }

        let summary =
            RunSummary::from_outcomes(started_at, items.len(), options.dry_run, outcomes);
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }
}

/// Runs `worker` over `items` on at most `pool_size` threads.
///
/// Threads pull from a shared queue in catalog order; outcomes come back
/// over a channel and are re-sorted by catalog position.
fn dispatch<C: CatalogClient>(
    worker: &Worker<'_, C>,
    items: &[CatalogItem],
    pool_size: usize,
    sink: &dyn ProgressSink,
) -> Result<Vec<ItemOutcome>, SyncError> {
    let count = items.len();
    let queue: Mutex<VecDeque<(usize, &CatalogItem)>> =
        Mutex::new(items.iter().enumerate().collect());
    let (tx, rx) = mpsc::channel();
    let num_workers = pool_size.min(count);

    thread::scope(|scope| -> Result<(), SyncError> {
        for worker_id in 1..=num_workers {
            let tx = tx.clone();
            let queue = &queue;
            thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn_scoped(scope, move || {
                    loop {
                        let next = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop_front();
                        let Some((index, item)) = next else {
                            break;
                        };
                        let outcome = worker.process(item, worker_id, sink);
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|err| SyncError::WorkerSpawn(err.to_string()))?;
        }
        Ok(())
    })?;
    drop(tx);

    let mut results: Vec<(usize, ItemOutcome)> = rx.into_iter().collect();
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
