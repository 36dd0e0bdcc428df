use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use opcert::{
    Builder, CliConfig, CliEngine, ExtractionError, FactsExtractor, JsonReportWriter,
    ReportWriter, RuleSet, TestStatus,
};

/// Exit status when the run was interrupted
const EXIT_CANCELLED: i32 = 130;

/// opcert: check a built container image against partner certification rules
#[derive(Parser, Debug)]
#[command(name = "opcert")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rule to evaluate (e.g. "has_labels"), or "all"
    #[arg(required_unless_present = "list")]
    rule: Option<String>,

    /// Image reference under test
    #[arg(required_unless_present = "list")]
    image: Option<String>,

    /// List the available rules and exit
    #[arg(long)]
    list: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container engine to use (docker or podman)
    #[arg(short, long)]
    builder: Option<Builder>,

    /// Timeout in seconds for each engine invocation
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Registry hosting the certified base images
    #[arg(long)]
    base_registry: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries the report, logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Layer command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut CliConfig, cli: &Cli) -> Result<()> {
    if let Some(builder) = cli.builder {
        config.engine.builder = builder;
    }
    if let Some(timeout) = cli.timeout {
        config.engine.timeout_secs = timeout;
    }
    if let Some(registry) = &cli.base_registry {
        config.engine.base_registry = registry.clone();
    }
    config.engine.validate()
}

/// The single top-level report of a failed extraction
fn report_failure(out: &mut impl Write, err: &ExtractionError) -> std::io::Result<()> {
    writeln!(out, "opcert: {}", err)
}

fn print_rules(rules: &RuleSet) {
    for rule in &rules.rules {
        println!("{:<22} {}", rule.id, rule.description);
    }
    println!("{:<22} Evaluate every rule", opcert::rules::ALL_RULES);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let rules = RuleSet::default();
    if cli.list {
        print_rules(&rules);
        return Ok(());
    }

    let (Some(rule), Some(image)) = (cli.rule.clone(), cli.image.clone()) else {
        anyhow::bail!("Both a rule name and an image reference are required");
    };

    let mut config = CliConfig::load_or_default(cli.config.as_ref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli).context("Invalid engine settings")?;

    let selection = rules.select(&rule);
    let results = if !selection.needs_facts() {
        info!(rule = %rule, "Unknown rule requested");
        vec![rules.unknown_rule(&rule)]
    } else {
        let engine = CliEngine::from_config(&config.engine);
        let extractor = FactsExtractor::from_config(engine, &config.engine);

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        match extractor.extract_with_cancel(&image, &cancel).await {
            Ok(facts) => rules.evaluate(&selection, &facts),
            Err(e @ ExtractionError::Cancelled { .. }) => {
                error!(error = %e, "Run interrupted");
                std::process::exit(EXIT_CANCELLED);
            }
            Err(e) => {
                report_failure(&mut std::io::stderr(), &e)
                    .context("Failed to report extraction failure")?;
                std::process::exit(1);
            }
        }
    };

    JsonReportWriter::stdout()
        .write_report(&TestStatus::new(results))
        .context("Failed to write report")
}
