use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::warn;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::worker::ItemOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(result: &RunSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Line-per-event progress for a terminal.
///
/// Progress lines cannot report a write failure to the worker that emitted
/// them, so the first error stops further progress output and is returned
/// by [`ConsoleProgress::print_summary`].
pub struct ConsoleProgress<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
    error: Mutex<Option<io::Error>>,
}

impl ConsoleProgress {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            error: Mutex::new(None),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn print_summary(&self, result: &RunSummary) -> io::Result<()> {
        if let Some(err) = self
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(err);
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for item in &result.items {
            if let ItemOutcome::Failed { title, reason } = item {
                writeln!(out, " failed: {title}: {reason}")?;
            }
        }
        if result.dry_run {
            writeln!(
                out,
                " Dry run: {} to download, {} skipped of {} catalog entries.",
                result.planned, result.skipped, result.catalog_items
            )?;
        } else {
            writeln!(
                out,
                " All done: {} processed, {} skipped, {} failed of {} catalog entries.",
                result.processed, result.skipped, result.failed, result.catalog_items
            )?;
        }
        out.flush()
    }
}

impl<W: Write + Send> ProgressSink for ConsoleProgress<W> {
    fn event(&self, event: ProgressEvent) {
        let line = match (event.worker, event.elapsed) {
            (Some(worker), Some(elapsed)) => format!(
                "[worker-{worker}] {} in {:.1}s",
                event.message,
                elapsed.as_secs_f64()
            ),
            (Some(worker), None) => format!("[worker-{worker}] {}", event.message),
            (None, _) => format!(" {}", event.message),
        };
        let mut error = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if error.is_some() {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(out, "{line}") {
            warn!(error = %err, "progress output failed; suppressing further progress");
            *error = Some(err);
        }
    }
}
