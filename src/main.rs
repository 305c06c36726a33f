//! clusterflow - inspect workflow graphs and validate cluster definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use clusterflow::config::{LogFormat, WorkflowConfig};
use clusterflow::interfaces::FileWriter;
use clusterflow::task::{describe, Transition};
use clusterflow::telemetry;
use clusterflow::types::{ClusterSpec, WriteOption};
use clusterflow::workflows::{CreateTask, DeleteTask, UpgradeTask};

/// clusterflow - task engine for bootstrap-driven cluster lifecycles
#[derive(Parser, Debug)]
#[command(name = "clusterflow", version, about, long_about = None)]
struct Cli {
    /// Path to a workflow configuration file
    #[arg(long, global = true, env = "CLUSTERFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format (overrides the config file)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a workflow's transition table
    ///
    /// Lists every task with the task that follows it on success and on
    /// failure, and marks cleanup and terminal tasks.
    Graph(GraphArgs),

    /// Load and validate a cluster definition
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct GraphArgs {
    /// Workflow to describe
    #[arg(value_enum)]
    workflow: WorkflowKind,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: GraphFormat,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to the cluster definition YAML
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Write the normalized definition (defaults filled in) to the output directory
    #[arg(long)]
    write: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WorkflowKind {
    Create,
    Delete,
    Upgrade,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GraphFormat {
    Text,
    Yaml,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(format) = cli.log_format {
        config.log.format = format.into();
    }

    telemetry::init_logging(&config.log)?;

    match cli.command {
        Commands::Graph(args) => run_graph(args),
        Commands::Validate(args) => run_validate(args, &config),
    }
}

fn run_graph(args: GraphArgs) -> anyhow::Result<()> {
    let table = match args.workflow {
        WorkflowKind::Create => describe::<CreateTask>(),
        WorkflowKind::Delete => describe::<DeleteTask>(),
        WorkflowKind::Upgrade => describe::<UpgradeTask>(),
    };

    match args.format {
        GraphFormat::Yaml => {
            let yaml = serde_yaml::to_string(&table)
                .map_err(|e| anyhow::anyhow!("Failed to serialize transition table: {}", e))?;
            print!("{yaml}");
        }
        GraphFormat::Text => print!("{}", render_table(&table)),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, config: &WorkflowConfig) -> anyhow::Result<()> {
    let spec = ClusterSpec::load(&args.file)?;
    info!(cluster = %spec.name, file = %args.file.display(), "Cluster definition is valid");
    println!(
        "{}: valid ({} control plane, {} workers, kubernetes {})",
        spec.name, spec.control_plane_count, spec.worker_count, spec.kubernetes_version
    );

    if args.write {
        let yaml = serde_yaml::to_string(&spec)
            .map_err(|e| anyhow::anyhow!("Failed to serialize cluster definition: {}", e))?;
        let path = config.file_writer().write(
            &spec.config_file_name(),
            yaml.as_bytes(),
            &[WriteOption::Persistent],
        )?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn render_table(table: &[Transition]) -> String {
    let width = table.iter().map(|t| t.from.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in table {
        let mut flags = Vec::new();
        if row.cleanup {
            flags.push("cleanup");
        }
        if row.terminal {
            flags.push("terminal");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", flags.join(", "))
        };
        out.push_str(&format!(
            "{:width$}  ok -> {:<32}  err -> {}{}\n",
            row.from,
            row.on_success.unwrap_or("end"),
            row.on_failure.unwrap_or("end"),
            flags,
            width = width,
        ));
    }
    out
}
