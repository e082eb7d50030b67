//! # Label Migrator CLI (`lmig`)
//!
//! ## Usage
//!
//! ```bash
//! lmig --config ./config/lmig.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lmig check` | Validate configuration for a run mode |
//! | `lmig discover` | Enumerate labelled files and group them by site |
//! | `lmig migrate --dry-run` | Full pipeline without writing |
//! | `lmig migrate` | Live migration |
//!
//! ## Environment
//!
//! - `LMIG_INDEX_TOKEN`: bearer token for the index service
//! - `LMIG_GRAPH_TOKEN`: bearer token for the mutation API
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use label_migrator::config::{self, Config, Overrides, RunMode};
use label_migrator::coordinator::{Coordinator, RunReport};
use label_migrator::export::{self, FileSink};
use label_migrator::graph_client::GraphMutationApi;
use label_migrator::index_client::HttpIndexService;
use label_migrator::models::Partition;
use label_migrator::progress::ProgressMode;

/// Label Migrator: move documents from one sensitivity label to another,
/// verified against the live state of every file.
#[derive(Parser)]
#[command(
    name = "lmig",
    about = "Label Migrator: reclassify sensitivity labels found through the content index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lmig.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print the effective run settings.
    ///
    /// Does not contact any service.
    Check {
        /// Mode to validate for: discovery, dry-run, or live.
        #[arg(long, default_value = "live")]
        mode: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Enumerate labelled files and group them by storage location.
    ///
    /// Writes `discovery-files.json` and `discovery-locations.json` to the
    /// output directory. Needs only the index service.
    Discover {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Migrate labelled files to the target label.
    Migrate {
        /// Run the full pipeline through the idempotency check without writing.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Overrides shared by every command.
#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Label to search for (overrides `run.label`).
    #[arg(long)]
    label: Option<String>,

    /// Label id to apply (overrides `run.target_label_id`).
    #[arg(long)]
    target_label_id: Option<String>,

    /// Partition to process; repeat for both (SharePoint, OneDrive).
    #[arg(long = "partition")]
    partitions: Vec<Partition>,

    /// Index page size (1-5000).
    #[arg(long)]
    page_size: Option<u32>,

    /// Delay after each attempted write, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Stop after this many records.
    #[arg(long)]
    limit: Option<usize>,

    /// Output directory for reports and the audit log.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            label: self.label.clone(),
            target_label_id: self.target_label_id.clone(),
            partitions: self.partitions.clone(),
            page_size: self.page_size,
            inter_record_delay_ms: self.delay_ms,
            output_dir: self.output.clone(),
        }
    }
}

fn parse_mode(s: &str) -> Result<RunMode> {
    match s.to_ascii_lowercase().as_str() {
        "discovery" | "discover" => Ok(RunMode::Discovery),
        "dry-run" | "dryrun" => Ok(RunMode::DryRun),
        "live" => Ok(RunMode::Live),
        other => anyhow::bail!(
            "Unknown mode: '{}'. Must be discovery, dry-run, or live.",
            other
        ),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (mode, run) = match &cli.command {
        Commands::Check { mode, run } => (parse_mode(mode)?, run.clone()),
        Commands::Discover { run } => (RunMode::Discovery, run.clone()),
        Commands::Migrate { dry_run, run } => (
            if *dry_run { RunMode::DryRun } else { RunMode::Live },
            run.clone(),
        ),
    };

    let mut cfg = config::load_config(&cli.config)?;
    cfg.apply_overrides(run.overrides());
    let settings = cfg.run_settings(mode, run.limit)?;
    cfg.check_endpoints(mode)?;

    if let Commands::Check { .. } = cli.command {
        print_settings(&cfg, &settings);
        return Ok(());
    }

    let index = HttpIndexService::from_config(&cfg.index)?;
    let graph = if mode.needs_mutation_api() {
        Some(GraphMutationApi::from_config(&cfg.graph)?)
    } else {
        None
    };
    let sink = FileSink::new(&cfg.output.dir)?;
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current record");
            on_signal.cancel();
        }
    });

    let mut coordinator = Coordinator::new(settings, &index)
        .with_sink(&sink)
        .with_progress(reporter.as_ref());
    if let Some(graph) = graph.as_ref() {
        coordinator = coordinator.with_mutation_api(graph);
    }

    match coordinator.run(&cancel).await? {
        RunReport::Discovery(report) => {
            let written = export::write_discovery_report(sink.dir(), &report)?;
            println!("discover {}", report.label);
            println!("  files found: {}", report.found);
            println!("  locations: {}", report.locations.len());
            for loc in report.locations.iter().take(10) {
                println!("    {:>6}  {:<10} {}", loc.file_count, loc.partition, loc.location);
            }
            print_warnings(report.warnings.iter().map(|w| w.message.as_str()));
            for path in written {
                info!(path = %path.display(), "wrote discovery artifact");
            }
            println!("{}", if report.cancelled { "cancelled" } else { "ok" });
        }
        RunReport::Migration(report) => {
            let path = export::write_migration_report(sink.dir(), &report)?;
            let t = &report.tally;
            println!("migrate {} ({})", report.label, report.mode);
            println!("  found: {}", t.found);
            println!("  processed: {}", t.processed);
            println!("  succeeded: {}", t.succeeded);
            println!("  would update: {}", t.would_update);
            println!("  skipped: {} (already current: {})", t.skipped, t.already_current);
            println!("  failed: {}", t.failed);
            print_warnings(report.warnings.iter().map(|w| w.message.as_str()));
            println!("  report: {}", path.display());
            println!("{}", if report.cancelled { "cancelled" } else { "ok" });
        }
    }

    Ok(())
}

fn print_settings(cfg: &Config, settings: &config::RunSettings) {
    let partitions: Vec<String> = settings.partitions.iter().map(|p| p.to_string()).collect();
    let extensions: Vec<&str> = settings
        .supported_extensions
        .iter()
        .map(|s| s.as_str())
        .collect();
    println!("mode: {}", settings.mode);
    println!("label: {}", settings.label);
    println!(
        "target label id: {}",
        settings.target_label_id.as_deref().unwrap_or("-")
    );
    println!("partitions: {}", partitions.join(", "));
    println!("page size: {}", settings.page_size);
    println!("inter-record delay: {} ms", settings.inter_record_delay.as_millis());
    println!("supported extensions: {}", extensions.join(", "));
    println!(
        "index endpoint: {}",
        cfg.index.endpoint.as_deref().unwrap_or("-")
    );
    if settings.mode.needs_mutation_api() {
        println!("mutation api: {}", cfg.graph.base_url);
    }
    println!("output: {}", cfg.output.dir.display());
    println!("ok");
}

fn print_warnings<'a>(warnings: impl Iterator<Item = &'a str>) {
    for warning in warnings {
        println!("  warning: {}", warning);
    }
}
