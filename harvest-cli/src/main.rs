//! Harvest CLI
//!
//! Collects proxy connection descriptors from public sources, ranks them and
//! keeps the ones that answer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use harvest_core::{CandidateExtractor, Settings};
use harvest_runtime::{Exporter, Pipeline, PipelineObserver, PipelineReport, Stage};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(author, version, about = "Harvest: proxy candidate collection and validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract, score and validate candidates
    Run {
        /// Settings file (.toml, .json or .yaml)
        #[arg(short, long, default_value = "config/settings.toml", env = "HARVEST_CONFIG")]
        config: PathBuf,

        /// Concurrent fetch and probe workers
        #[arg(long)]
        workers: Option<usize>,

        /// Skip the TCP liveness check
        #[arg(long)]
        no_validate: bool,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the default settings file
    Init {
        /// Settings file to create
        #[arg(short, long, default_value = "config/settings.toml")]
        config: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Extract candidates from a local text file
    Extract {
        /// Text or HTML file to scan
        file: PathBuf,

        /// Settings file (.toml, .json or .yaml)
        #[arg(short, long, default_value = "config/settings.toml", env = "HARVEST_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            config,
            workers,
            no_validate,
            output,
        } => {
            run_pipeline(&config, workers, no_validate, output).await?;
        }
        Commands::Init { config, force } => {
            init_settings(&config, force)?;
        }
        Commands::Extract { file, config } => {
            extract_file(&file, &config)?;
        }
    }

    Ok(())
}

/// Prints stage transitions; progress goes to the debug log
struct ConsoleObserver;

impl PipelineObserver for ConsoleObserver {
    fn stage_started(&self, stage: Stage) {
        println!("▶ {}...", stage.name());
    }

    fn progress(&self, stage: Stage, completed: usize, total: usize) {
        debug!("{}: {}/{}", stage.name(), completed, total);
    }

    fn stage_finished(&self, stage: Stage, count: usize) {
        println!("  {} done: {}", stage.name(), count);
    }
}

async fn run_pipeline(
    config: &Path,
    workers: Option<usize>,
    no_validate: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    println!("🌾 Harvest - proxy candidate pipeline\n");

    let mut settings = Settings::load(config)
        .with_context(|| format!("Failed to load settings from {}", config.display()))?;

    if let Some(workers) = workers {
        settings.fetcher.max_workers = workers;
        settings.validator.max_workers = workers;
    }
    if let Some(output) = output {
        settings.output.directory = output.display().to_string();
    }

    let validation = if no_validate || !settings.validator.enabled { "disabled" } else { "enabled" };
    println!("⚙️  Settings: {}", config.display());
    println!(
        "🔧 Workers: {} fetch / {} probe | Validation: {}\n",
        settings.fetcher.max_workers, settings.validator.max_workers, validation
    );

    let mut pipeline = Pipeline::new(settings.clone())?.with_observer(Arc::new(ConsoleObserver));
    if no_validate {
        pipeline = pipeline.without_validation();
    }

    let report = pipeline.run_configured().await?;
    pipeline.close();

    let written = Exporter::new(&settings.output).save(&report.records)?;
    print_summary(&report);
    println!("📁 {} files written to {}", written.len(), settings.output.directory);

    Ok(())
}

fn print_summary(report: &PipelineReport) {
    println!("\n{}", "=".repeat(60));
    println!("📊 Run summary ({:.1}s)", report.elapsed.as_secs_f64());
    println!("   Sources:    {}/{} returned content", report.sources_fetched, report.sources_total);
    println!("   Candidates: {}", report.candidates);
    println!("   Processed:  {}", report.processed);
    match report.validated {
        Some(live) => println!("   Live:       {}", live),
        None => println!("   Live:       not checked"),
    }
    if report.stopped {
        println!("   ⚠️  Run was stopped early");
    }

    for record in report.records.iter().take(5) {
        let latency = record
            .latency_ms
            .map(|ms| format!("{:.0}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let preview: String = record.raw_config().chars().take(60).collect();
        println!(
            "   [{:>3}] {:<11} {:<3} {:>7}  {}",
            record.score,
            record.protocol.name(),
            record.country,
            latency,
            preview
        );
    }
}

fn init_settings(config: &Path, force: bool) -> Result<()> {
    if config.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", config.display());
    }

    Settings::default().save(config)?;
    println!("✅ Default settings written to {}", config.display());
    Ok(())
}

fn extract_file(file: &Path, config: &Path) -> Result<()> {
    let settings = Settings::load(config)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let extractor = CandidateExtractor::new(settings.parser.enabled_protocols());
    let mut candidates: Vec<String> = extractor.extract(&[text]).into_iter().collect();
    candidates.sort();

    for candidate in &candidates {
        println!("{}", candidate);
    }
    eprintln!("{} candidates", candidates.len());
    Ok(())
}
