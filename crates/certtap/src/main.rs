//! certtap - main entry point
//!
//! Watches a reverse proxy's ACME state file and taps the certificates
//! inside it out to plain PEM files.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use certtap::config::{ExtractorConfig, Layout};
use certtap::extract;
use certtap::sink::{ChangeSink, LogSink};
use certtap::watch::{Debouncer, StateWatcher};

/// How long shutdown waits for an in-flight extraction pass.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

/// Extract PEM certificate material from a reverse proxy's ACME state file.
#[derive(Parser, Debug)]
#[command(name = "certtap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// ACME state file to extract from
    #[arg(value_name = "STATE_FILE", default_value = "acme.json", env = "CERTTAP_STATE_FILE")]
    state_file: std::path::PathBuf,

    /// Directory the output layout is created under
    #[arg(value_name = "OUTPUT_ROOT", default_value = ".", env = "CERTTAP_OUTPUT")]
    output_root: std::path::PathBuf,

    /// Write one flat directory of per-name files instead of per-domain directories
    #[arg(short = 'f', long = "flat")]
    flat: bool,

    /// Only extract these primary domains (repeatable)
    #[arg(long = "include", value_name = "DOMAIN", conflicts_with = "exclude")]
    include: Vec<String>,

    /// Extract everything except these primary domains (repeatable)
    #[arg(long = "exclude", value_name = "DOMAIN")]
    exclude: Vec<String>,

    /// Challenge section to read from a multi-challenge state file
    #[arg(long = "challenge", value_name = "NAME", env = "CERTTAP_CHALLENGE")]
    challenge: Option<String>,

    /// Resolve and log output targets without writing anything
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Run a single extraction pass and exit instead of watching
    #[arg(long = "once")]
    once: bool,

    /// Report processed domains to the change sink after each pass
    #[arg(long = "notify")]
    notify: bool,

    /// Quiet interval in milliseconds between a change burst and extraction
    #[arg(long = "debounce-ms", value_name = "MS", default_value_t = 1500)]
    debounce_ms: u64,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> ExtractorConfig {
        ExtractorConfig {
            state_path: self.state_file,
            output_root: self.output_root,
            layout: if self.flat {
                Layout::Flat
            } else {
                Layout::PerDomain
            },
            include: self.include.into_iter().collect(),
            exclude: self.exclude.into_iter().collect(),
            challenge: self.challenge,
            dry_run: self.dry_run,
            notify_on_change: self.notify,
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let once = cli.once;

    let config = cli.into_config();
    config.validate().context("invalid configuration")?;

    let sink: Option<Arc<dyn ChangeSink>> = config
        .notify_on_change
        .then(|| Arc::new(LogSink) as Arc<dyn ChangeSink>);

    if once {
        let result = extract::extract(&config).context("extraction failed")?;
        notify_sink(&sink, &result);
        info!(
            processed = result.processed.len(),
            failed = result.failed.len(),
            "done"
        );
        return Ok(());
    }

    run_watch(config, sink).await
}

/// Watch the state file until ctrl-c, extracting on every settled change.
async fn run_watch(config: ExtractorConfig, sink: Option<Arc<dyn ChangeSink>>) -> Result<()> {
    let watcher =
        StateWatcher::new(&config.state_path).context("failed to start state file watcher")?;

    let job_config = config.clone();
    let debouncer = Arc::new(Debouncer::new(config.debounce, move || {
        match extract::extract(&job_config) {
            Ok(result) => notify_sink(&sink, &result),
            Err(e) => error!(error = %e, "extraction pass failed"),
        }
    }));

    // The state file already on disk is a change we were not running to
    // see; run an initial pass through the same single-flight machinery.
    debouncer.poke();

    watcher
        .run(&debouncer, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    // Let an in-flight pass finish before exiting.
    debouncer.drain(SHUTDOWN_DRAIN).await;
    info!("shutdown complete");
    Ok(())
}

fn notify_sink(sink: &Option<Arc<dyn ChangeSink>>, result: &extract::ExtractionResult) {
    if let Some(sink) = sink {
        if !result.processed.is_empty() {
            sink.notify(&result.processed);
        }
    }
}
