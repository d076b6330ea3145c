use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to parse catalog response: {0}")]
    CatalogParse(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("malformed CSV: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse metadata file {path}: {message}")]
    #[diagnostic(help("delete the file to start from an empty change record"))]
    MetadataParse { path: Utf8PathBuf, message: String },

    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => SyncError::Filesystem(err.to_string()),
            _ => SyncError::Csv(err.to_string()),
        }
    }
}
