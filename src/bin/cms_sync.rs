use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cms_dataset_sync::app::{App, RunOptions};
use cms_dataset_sync::catalog::CatalogHttpClient;
use cms_dataset_sync::config::{ConfigLoader, ConfigOverrides};
use cms_dataset_sync::error::SyncError;
use cms_dataset_sync::output::{ConsoleProgress, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "cms-sync")]
#[command(about = "Download changed CMS hospital datasets and normalize their CSV headers")]
#[command(version)]
struct Cli {
    /// Print the run summary as JSON instead of progress lines
    #[arg(long)]
    non_interactive: bool,

    /// Reprocess every matching dataset, ignoring the change record
    #[arg(long)]
    force: bool,

    /// List what would be downloaded without writing anything
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Args)]
struct SettingsArgs {
    /// JSON config file (defaults to ./cms-sync.json when present)
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[arg(long)]
    catalog_url: Option<String>,

    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    metadata_file: Option<Utf8PathBuf>,

    /// Number of concurrent downloads
    #[arg(long)]
    workers: Option<usize>,

    /// Case-sensitive substring a dataset title must contain
    #[arg(long)]
    marker: Option<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::ConfigRead(_) | SyncError::ConfigParse(_) | SyncError::InvalidConfig(_) => 2,
        SyncError::CatalogHttp(_) | SyncError::CatalogStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let SettingsArgs {
        config,
        catalog_url,
        data_dir,
        metadata_file,
        workers,
        marker,
        timeout_secs,
    } = cli.settings;
    let overrides = ConfigOverrides {
        catalog_url,
        data_dir,
        metadata_file,
        workers,
        title_marker: marker,
        timeout_secs,
    };
    let config = ConfigLoader::resolve(config.as_deref(), overrides)?;

    let client = CatalogHttpClient::new(
        &config.catalog_url,
        Duration::from_secs(config.timeout_secs),
    )?;
    let app = App::new(client, config)?;
    let options = RunOptions {
        force: cli.force,
        dry_run: cli.dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = app.run(options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let progress = ConsoleProgress::stdout();
            let summary = app.run(options, &progress)?;
            progress.print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
