//! @ai:module:intent CLI for the llmfuzz pipeline
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use llmfuzz::{
    catalog::PromptCatalog,
    config::PipelineConfig,
    error::ConfigurationError,
    generation::{DryRunGenerator, OpenAiClient, TextGenerator},
    pipeline::{Pipeline, RunSummary, Stage},
    tools::ToolchainValidator,
    CancelToken,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "llmfuzz.toml";

#[derive(Parser)]
#[command(name = "llmfuzz")]
#[command(about = "Generate adversarial inputs with an LLM and compare security tools on them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one input artifact per catalog prompt
    Generate(RunArgs),

    /// Run every configured tool against every artifact
    RunTools(RunArgs),

    /// Parse recorded tool output into metric records
    Normalize(RunArgs),

    /// Run the full pipeline
    Run(RunArgs),

    /// Build comparison tables from stored metric records
    Export(RunArgs),

    /// Write a starter configuration and prompt catalog
    Init {
        /// Configuration file to create
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,

        /// Prompt catalog to create
        #[arg(long, default_value = "prompts.json")]
        catalog: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// List catalog prompts and configured tools
    List {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Prompt catalog (JSON object or TOML [prompts] table)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

/// Flags shared by every stage command
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prompt catalog (JSON object or TOML [prompts] table)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Model identifier passed to the generation endpoint
    #[arg(short, long)]
    model: Option<String>,

    /// Worker-pool size per stage
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Output directory for artifacts, invocations and metrics
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-invocation timeout in seconds, applied to every tool
    #[arg(long)]
    tool_timeout: Option<u64>,

    /// Exit successfully even when items failed
    #[arg(long)]
    ignore_failures: bool,

    /// Use an offline echo generator instead of the API
    #[arg(long)]
    dry_run: bool,

    /// Keep artifacts and invocations for ids no longer in the catalog
    #[arg(long)]
    keep_stale: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {e:#}");
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => run_stages(args, &[Stage::Generate]).await,
        Commands::RunTools(args) => run_stages(args, &[Stage::RunTools]).await,
        Commands::Normalize(args) => run_stages(args, &[Stage::Normalize]).await,
        Commands::Run(args) => run_stages(args, &Stage::ALL).await,
        Commands::Export(args) => run_stages(args, &[Stage::Export]).await,
        Commands::Init {
            output,
            catalog,
            force,
        } => init(&output, &catalog, force).map(|_| ExitCode::SUCCESS),
        Commands::List { config, catalog } => list(config, catalog).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            if e.downcast_ref::<ConfigurationError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// @ai:intent Install the fmt subscriber, RUST_LOG overrides the default directive
/// @ai:effects io
fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("llmfuzz=info".parse()?))
        .init();
    Ok(())
}

/// @ai:intent Load config, apply flags, and run the selected stages
/// @ai:effects network, process, fs:read, fs:write
async fn run_stages(args: RunArgs, stages: &[Stage]) -> Result<ExitCode> {
    let mut config = load_or_default_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let catalog = if stages.contains(&Stage::Generate) {
        Some(PromptCatalog::load(&config.paths.catalog)?)
    } else {
        None
    };

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight work");
            on_signal.cancel();
        }
    });

    let summary = if config.run.dry_run || !stages.contains(&Stage::Generate) {
        execute(config, Arc::new(DryRunGenerator), stages, catalog.as_ref(), cancel).await?
    } else {
        let client = OpenAiClient::new(&config.api)?;
        execute(config, Arc::new(client), stages, catalog.as_ref(), cancel).await?
    };

    print_summary(&summary);
    Ok(ExitCode::from(summary.exit_code()))
}

async fn execute<G: TextGenerator>(
    config: PipelineConfig,
    generator: Arc<G>,
    stages: &[Stage],
    catalog: Option<&PromptCatalog>,
    cancel: CancelToken,
) -> Result<RunSummary, ConfigurationError> {
    tracing::info!("Using generator {}", generator.name());
    let pipeline = Pipeline::new(config, generator)?.with_cancel(cancel);
    let summary = pipeline.run(stages, catalog).await?;
    tracing::info!("Run output in {}", pipeline.layout().root().display());
    Ok(summary)
}

/// @ai:intent CLI flags take precedence over the configuration file
/// @ai:effects pure
fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) {
    if let Some(path) = &args.catalog {
        config.paths.catalog = path.clone();
    }
    if let Some(model) = &args.model {
        config.api.model = model.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = concurrency;
    }
    if let Some(output) = &args.output {
        config.paths.output_dir = output.clone();
    }
    if let Some(secs) = args.tool_timeout {
        for tool in &mut config.tools {
            tool.timeout_secs = secs;
        }
    }
    config.run.ignore_failures |= args.ignore_failures;
    config.run.dry_run |= args.dry_run;
    config.run.keep_stale |= args.keep_stale;
}

/// @ai:intent Load configuration or use defaults
/// @ai:effects fs:read
fn load_or_default_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigurationError> {
    match path {
        Some(p) => PipelineConfig::load(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG);

            if default_path.exists() {
                PipelineConfig::load(default_path)
            } else {
                Ok(PipelineConfig::default())
            }
        }
    }
}

/// @ai:intent Write the example configuration and a two-prompt catalog
/// @ai:effects fs:write
fn init(output: &Path, catalog: &Path, force: bool) -> Result<()> {
    for path in [output, catalog] {
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
    }

    let mut config = PipelineConfig::example();
    config.paths.catalog = catalog.to_path_buf();
    config.save(output)?;
    println!("Configuration saved to {}", output.display());

    let prompts = serde_json::json!({
        "t1": "Generate a deeply nested JSON document with unbalanced brackets.",
        "t2": "Generate an HTTP request line with an oversized header value.",
    });
    std::fs::write(catalog, serde_json::to_string_pretty(&prompts)?)
        .with_context(|| format!("Failed to write {}", catalog.display()))?;
    println!("Prompt catalog saved to {}", catalog.display());

    Ok(())
}

/// @ai:intent Show catalog ids and tool availability without running anything
/// @ai:effects fs:read
fn list(config: Option<PathBuf>, catalog: Option<PathBuf>) -> Result<()> {
    let mut config = load_or_default_config(config.as_deref())?;
    if let Some(path) = catalog {
        config.paths.catalog = path;
    }

    match PromptCatalog::load(&config.paths.catalog) {
        Ok(catalog) => {
            println!("Prompts ({}):", catalog.len());
            for case in catalog.iter() {
                println!("  {:<20} {}", case.id, preview(&case.prompt, 56));
            }
        }
        Err(e) => println!("Prompts: unavailable ({e})"),
    }
    println!();

    let toolchain = ToolchainValidator::validate(&config.tools);

    println!("Tools ({}):", config.tools.len());
    println!("{:<16} {:<20} {:<12} {:>8}", "Name", "Program", "Parser", "Timeout");
    println!("{}", "-".repeat(60));

    for tool in &config.tools {
        let marker = if toolchain.available.contains(&tool.name) {
            ""
        } else {
            "  (missing)"
        };
        println!(
            "{:<16} {:<20} {:<12} {:>7}s{}",
            tool.name,
            tool.program,
            tool.parser.build().format(),
            tool.timeout_secs,
            marker
        );
    }

    for missing in &toolchain.missing {
        println!("  {}: {}", missing.tool_name, missing.install_hint);
    }

    Ok(())
}

fn preview(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > width {
        let cut: String = line.chars().take(width.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// @ai:intent Print summary to console
/// @ai:effects io
fn print_summary(summary: &RunSummary) {
    println!();
    println!("llmfuzz run summary");
    println!("===================");
    println!();
    println!(
        "{:<12} {:<24} {:>8} {:>9} {:>9}",
        "Stage", "Status", "Items", "Failures", "Time"
    );
    println!("{}", "-".repeat(66));

    for stage in &summary.stages {
        println!(
            "{:<12} {:<24} {:>8} {:>9} {:>8.1}s",
            stage.stage.as_str(),
            stage.status.to_string(),
            stage.items,
            stage.failures,
            stage.duration_ms as f64 / 1000.0
        );
    }

    println!();
    println!("Metric records: {}", summary.record_count);

    if !summary.failures.is_empty() {
        println!();
        println!("Failures ({}):", summary.failures.len());
        for failure in &summary.failures {
            let tool = failure.tool.as_deref().unwrap_or("-");
            println!("  {:<20} {:<12} {:<22} {}", failure.id, tool, failure.kind, failure.reason);
        }
        if summary.ignore_failures {
            println!("Failures ignored for exit status (--ignore-failures).");
        }
    }
}
