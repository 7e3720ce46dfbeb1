mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;

use imageloops_agent::{ReplicateClient, ReplicateConfig, ReplicateCritic, ReplicateProducer};
use imageloops_core::{LoopOutcome, LoopRunner, Strategy};
use imageloops_critic::{Aggregation, CritiqueParser, ScoreRange};
use imageloops_logging::{init_tracing, LogFormat, Logger, SessionWriter};
use imageloops_storage::{ArtifactStore, FsArtifactStore};

use config::{Overrides, ProjectConfig, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "imageloops",
    about = "Generate, critique and refine images until they score well",
    version,
    author
)]
struct Cli {
    /// Image prompt (or reads from prompt.md if not provided)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Path to prompt file (default: ./prompt.md)
    #[arg(long, default_value = "prompt.md")]
    prompt_file: PathBuf,

    /// Root directory for generated images (default: $OUTPUT_FOLDER)
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Maximum iterations (default: 10)
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Stop once the aggregate score is above this value (default: 9)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// How the next prompt is built
    #[arg(long, value_enum)]
    strategy: Option<StrategyChoice>,

    /// How dimension scores are combined
    #[arg(long, value_enum)]
    aggregation: Option<AggregationChoice>,

    /// Retries per failed generation or critique (default: 0)
    #[arg(long)]
    retries: Option<u32>,

    /// Score to assume when the critique has no readable score
    #[arg(long)]
    fallback_score: Option<f64>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyChoice {
    Fixed,
    Refine,
}

impl From<StrategyChoice> for Strategy {
    fn from(choice: StrategyChoice) -> Self {
        match choice {
            StrategyChoice::Fixed => Strategy::Fixed,
            StrategyChoice::Refine => Strategy::Refine,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AggregationChoice {
    Mean,
    Min,
    Weighted,
}

impl From<AggregationChoice> for Aggregation {
    fn from(choice: AggregationChoice) -> Self {
        match choice {
            AggregationChoice::Mean => Aggregation::Mean,
            AggregationChoice::Min => Aggregation::Min,
            AggregationChoice::Weighted => Aggregation::Weighted,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            output_dir: self.output_dir.clone(),
            max_iterations: self.max_iterations,
            threshold: self.threshold,
            strategy: self.strategy.map(Into::into),
            aggregation: self.aggregation.map(Into::into),
            retries: self.retries,
            fallback_score: self.fallback_score,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the variables may already be exported
    let _ = dotenvy::dotenv();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing("warn", log_format);

    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let prompt = get_prompt(&cli, &working_dir)?;

    let project_config = ProjectConfig::load(&working_dir)?;
    let config = RunConfig::resolve(cli.overrides(), project_config, |key| {
        std::env::var(key).ok()
    })?;

    let store = Arc::new(FsArtifactStore::for_prompt(&config.output_root, &prompt));

    if cli.dry_run {
        print_plan(&prompt, &config, store.root());
        return Ok(());
    }

    store
        .ensure_root()
        .await
        .context("Failed to create output directory")?;

    let client = Arc::new(
        ReplicateClient::new(config.api_token.clone(), ReplicateConfig::default())
            .context("Failed to create Replicate client")?,
    );
    let producer = ReplicateProducer::new(
        client.clone(),
        config.generator_model.clone(),
        store.clone(),
    );
    let mut parser = CritiqueParser::new(ScoreRange::default());
    if let Some(score) = config.fallback_score {
        parser = parser.with_fallback_score(score);
    }
    let critic = ReplicateCritic::new(client, config.critic_model.clone(), parser);

    let session = SessionWriter::new(store.root(), &prompt)
        .context("Failed to create run record")?;
    let logger = Arc::new(Logger::new(log_format));

    let runner = LoopRunner::new(&producer, &critic, logger)
        .with_strategy(config.strategy.build())
        .with_aggregator(config.aggregation.build(config.weights.clone()))
        .with_failure_policy(config.failure_policy.clone())
        .with_output_dir(store.root())
        .with_session_writer(Arc::new(session));

    let outcome = runner
        .run(&prompt, config.max_iterations, config.threshold)
        .await?;

    // Output result
    if cli.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    // Exit with appropriate code
    std::process::exit(outcome.exit_code());
}

fn get_prompt(cli: &Cli, working_dir: &Path) -> Result<String> {
    // Prefer --prompt flag
    if let Some(ref prompt) = cli.prompt {
        return Ok(prompt.clone());
    }

    let prompt_path = if cli.prompt_file.is_absolute() {
        cli.prompt_file.clone()
    } else {
        working_dir.join(&cli.prompt_file)
    };

    if prompt_path.exists() {
        let content =
            std::fs::read_to_string(&prompt_path).context("Failed to read prompt file")?;
        Ok(content.trim().to_string())
    } else {
        anyhow::bail!(
            "No prompt provided. Use --prompt or create a {} file",
            cli.prompt_file.display()
        )
    }
}

fn print_plan(prompt: &str, config: &RunConfig, run_dir: &Path) {
    println!("=== Dry Run ===");
    let preview: String = prompt.chars().take(100).collect();
    if preview.len() < prompt.len() {
        println!("Prompt: {}...", preview);
    } else {
        println!("Prompt: {}", prompt);
    }
    println!("Output dir: {}", run_dir.display());
    println!("Generator: {}", config.generator_model);
    println!("Critic: {}", config.critic_model);
    println!("Max iterations: {}", config.max_iterations);
    println!("Threshold: {}", config.threshold);
    println!("Strategy: {}", config.strategy);
    println!("Aggregation: {}", config.aggregation);
    println!("Retries: {}", config.failure_policy.max_retries);
}

fn print_outcome(outcome: &LoopOutcome) {
    eprintln!();
    match outcome {
        LoopOutcome::ThresholdMet { iterations, .. } => {
            eprintln!("{}", "=== THRESHOLD MET ===".green().bold());
            eprintln!("Iterations: {}", iterations);
        }
        LoopOutcome::MaxIterationsExhausted { iterations, .. } => {
            eprintln!("{}", "=== INCOMPLETE ===".yellow().bold());
            eprintln!("Reached maximum iterations ({})", iterations);
        }
        LoopOutcome::GenerationFailure {
            iterations, error, ..
        } => {
            eprintln!("{}", "=== GENERATION FAILED ===".red().bold());
            eprintln!("Error in iteration {}: {}", iterations, error);
        }
        LoopOutcome::CritiqueFailure {
            iterations, error, ..
        } => {
            eprintln!("{}", "=== CRITIQUE FAILED ===".red().bold());
            eprintln!("Error in iteration {}: {}", iterations, error);
        }
    }

    if let Some(artifact) = outcome.final_artifact() {
        eprintln!("Final image: {}", artifact.path.display());
    }
    if let Some(critique) = outcome.final_critique() {
        eprintln!("Scores: {}", critique.short_description());
    }
    if let Some(score) = outcome.final_score() {
        eprintln!("Aggregate: {:.2}", score);
    }
    eprintln!("Duration: {:.1}s", outcome.total_duration_secs());

    let paths = outcome.artifact_paths();
    if !paths.is_empty() {
        eprintln!("Images:");
        for path in paths {
            eprintln!("  {}", path.display());
        }
    }
}
