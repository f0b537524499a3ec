//! CLI command definitions for pelato.
//!
//! Every command takes a project directory holding `workflow.yaml` and a
//! `tasks/` directory. Configuration is read from the environment first and
//! then overridden by flags.

use std::path::{Path, PathBuf};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::execution::DockerClient;
use crate::orchestrator::{Stage, StageReport};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Default project directory.
const DEFAULT_PROJECT_DIR: &str = ".";

/// Code generation and deployment pipeline for wasmCloud components.
#[derive(Parser)]
#[command(name = "pelato")]
#[command(about = "Generate, build and deploy wasmCloud components from a workflow manifest")]
#[command(version)]
#[command(
    long_about = "pelato turns a workflow.yaml manifest into one wasmCloud component per task,\nthen builds, deploys or removes them through short-lived Docker workers.\n\nExample usage:\n  pelato gen ./my_project\n  pelato brush ./my_project --parallel"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Generate one component directory per workflow task under gen/.
    #[command(alias = "generate")]
    Gen(ProjectArgs),

    /// Compile every generated component and push it to the registry.
    Build(StageArgs),

    /// Deploy every generated component onto the lattice.
    Deploy(StageArgs),

    /// Remove every deployed component from the lattice.
    Remove(StageArgs),

    /// Run gen, build and deploy in sequence.
    #[command(alias = "all")]
    Brush(StageArgs),
}

/// Arguments shared by every command.
#[derive(clap::Args, Debug)]
pub struct ProjectArgs {
    /// Project directory containing workflow.yaml and tasks/.
    #[arg(default_value = DEFAULT_PROJECT_DIR)]
    pub dir: PathBuf,

    /// Directory holding templates/ and docker/.
    #[arg(long, env = "PELATO_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Append a run record to the project's metrics.yaml.
    #[arg(long, overrides_with = "no_metrics")]
    pub metrics: bool,

    /// Do not record metrics, even if ENABLE_METRICS is set.
    #[arg(long, overrides_with = "metrics")]
    pub no_metrics: bool,
}

/// Arguments of the worker-driven commands.
#[derive(clap::Args, Debug)]
pub struct StageArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Launch every worker before waiting on any.
    #[arg(short, long, overrides_with = "no_parallel")]
    pub parallel: bool,

    /// Wait for each worker before launching the next, even if PARALLEL_BUILD is set.
    #[arg(long, overrides_with = "parallel")]
    pub no_parallel: bool,
}

/// Resolves an on/off flag pair; `None` leaves the configured value.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl ProjectArgs {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(dir) = &self.assets_dir {
            config = config.with_assets_dir(dir);
        }
        if let Some(enabled) = switch(self.metrics, self.no_metrics) {
            config = config.with_metrics(enabled);
        }
        config
    }
}

impl StageArgs {
    fn apply(&self, config: PipelineConfig) -> PipelineConfig {
        let config = self.project.apply(config);
        match switch(self.parallel, self.no_parallel) {
            Some(detached) => config.with_detached(detached),
            None => config,
        }
    }
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
///
/// `cancel` is triggered on interrupt; running stages stop launching
/// workers and the command returns early.
pub async fn run_with_cli(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;

    match cli.command {
        Commands::Gen(args) => run_gen_command(args, config),
        Commands::Build(args) => run_stage_command(Stage::Build, args, config, cancel).await,
        Commands::Deploy(args) => run_stage_command(Stage::Deploy, args, config, cancel).await,
        Commands::Remove(args) => run_stage_command(Stage::Remove, args, config, cancel).await,
        Commands::Brush(args) => run_brush_command(args, config, cancel).await,
    }
}

fn run_gen_command(args: ProjectArgs, config: PipelineConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(args.apply(config));
    let report = pipeline.generate(&args.dir)?;

    println!(
        "Generated {} component(s) in {}",
        report.generated.len(),
        report.output_dir.display()
    );
    for failure in &report.failures {
        println!("  skipped {}: {}", failure.component, failure.error);
    }
    Ok(())
}

async fn run_stage_command(
    stage: Stage,
    args: StageArgs,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let config = args.apply(config);
    let docker = DockerClient::new(config.docker_timeout)?;
    let pipeline = Pipeline::new(config).with_cancellation(cancel);

    let report = pipeline
        .run_stage(&docker, stage, &args.project.dir)
        .await?;
    print_stage_report(&report);
    Ok(())
}

async fn run_brush_command(
    args: StageArgs,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let config = args.apply(config);
    let docker = DockerClient::new(config.docker_timeout)?;
    let pipeline = Pipeline::new(config).with_cancellation(cancel);
    let dir: &Path = &args.project.dir;

    let report = pipeline.brush(&docker, dir).await?;

    println!(
        "Generated {} component(s), {} skipped",
        report.generation.generated.len(),
        report.generation.failures.len()
    );
    for stage in &report.stages {
        print_stage_report(stage);
    }

    if report.cancelled {
        warn!("Brush interrupted");
    } else {
        info!(project = %dir.display(), "Brush finished");
    }
    Ok(())
}

fn print_stage_report(report: &StageReport) {
    println!(
        "{}: {} succeeded, {} failed ({:.3}s)",
        report.stage,
        report.succeeded(),
        report.failed(),
        report.components_time.as_secs_f64()
    );
    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        println!("  {} ({}): {}", outcome.component, outcome.worker, outcome.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_gen_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["pelato", "gen"]).expect("should parse");
        match cli.command {
            Commands::Gen(args) => {
                assert_eq!(args.dir, PathBuf::from(DEFAULT_PROJECT_DIR));
                assert!(!args.metrics);
            }
            _ => panic!("Expected Gen command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_aliases() {
        let cli = Cli::try_parse_from(["pelato", "generate", "proj"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Gen(_)));

        let cli = Cli::try_parse_from(["pelato", "all", "proj"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Brush(_)));
    }

    #[test]
    fn test_stage_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pelato",
            "build",
            "proj",
            "--parallel",
            "--metrics",
            "--assets-dir",
            "/opt/pelato",
            "-l",
            "debug",
        ])
        .expect("should parse");

        assert_eq!(cli.log_level, "debug");
        let Commands::Build(args) = cli.command else {
            panic!("Expected Build command");
        };
        assert_eq!(args.project.dir, PathBuf::from("proj"));

        let config = args.apply(PipelineConfig::new());
        assert!(config.detached);
        assert!(config.metrics_enabled);
        assert_eq!(config.assets_dir, PathBuf::from("/opt/pelato"));
    }

    #[test]
    fn test_flags_absent_keep_env_config() {
        let cli = Cli::try_parse_from(["pelato", "deploy", "proj"]).expect("should parse");
        let Commands::Deploy(args) = cli.command else {
            panic!("Expected Deploy command");
        };

        let config = args.apply(PipelineConfig::new().with_detached(true).with_metrics(true));
        assert!(config.detached);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_negated_flags_switch_off_env_config() {
        let cli = Cli::try_parse_from(["pelato", "brush", "proj", "--no-parallel", "--no-metrics"])
            .expect("should parse");
        let Commands::Brush(args) = cli.command else {
            panic!("Expected Brush command");
        };

        let config = args.apply(PipelineConfig::new().with_detached(true).with_metrics(true));
        assert!(!config.detached);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_last_of_flag_pair_wins() {
        let cli = Cli::try_parse_from(["pelato", "build", "proj", "--no-parallel", "--parallel"])
            .expect("should parse");
        let Commands::Build(args) = cli.command else {
            panic!("Expected Build command");
        };
        assert!(args.apply(PipelineConfig::new()).detached);
    }
}
