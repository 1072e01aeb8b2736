//! inventor - invent scoring and ranking functions with an LLM agent
//!
//! Usage:
//!   inventor invent --spec brief.md --depth 1  -> invent a new function tree
//!   inventor resume --name tone-score          -> continue a staged function
//!   inventor tree --events progress.jsonl      -> render a saved progress log

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use inventor_agent::LlmAgent;
use inventor_core::{
    project, FanoutSink, FieldPreset, FunctionType, ParameterOverrides, ProgressLog,
    ProgressSink, StructuralChecker, TracingSink, TypePreset,
};
use inventor_invent::{
    read_events, EventFileSink, GitAuthor, GitCli, GitHubHost, Host, InventConfig, InventRequest,
    Inventor, InventorOptions, Secrets,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "inventor",
    about = "Invent scoring and ranking functions with an LLM agent",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Invent a new function from a creative brief
    Invent(InventArgs),
    /// Continue a function staged by an earlier run
    Resume {
        /// Name of the staged function
        #[arg(long)]
        name: String,
        /// Append progress events to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Print the progress tree recorded in an events file
    Tree {
        #[arg(long)]
        events: PathBuf,
    },
}

#[derive(Args)]
struct InventArgs {
    /// Creative brief file, or - for stdin
    #[arg(long)]
    spec: String,

    /// Force the function type instead of letting the agent choose
    #[arg(long = "type", value_enum)]
    function_type: Option<TypeArg>,

    /// Append progress events to this file
    #[arg(long)]
    events: Option<PathBuf>,

    #[command(flatten)]
    widths: WidthArgs,
}

#[derive(Args)]
struct WidthArgs {
    /// Levels of sub-functions below this one
    #[arg(long)]
    depth: Option<u32>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    min_width: Option<u32>,
    #[arg(long)]
    max_width: Option<u32>,
    #[arg(long)]
    branch_width: Option<u32>,
    #[arg(long)]
    branch_min_width: Option<u32>,
    #[arg(long)]
    branch_max_width: Option<u32>,
    #[arg(long)]
    leaf_width: Option<u32>,
    #[arg(long)]
    leaf_min_width: Option<u32>,
    #[arg(long)]
    leaf_max_width: Option<u32>,
}

impl From<WidthArgs> for ParameterOverrides {
    fn from(w: WidthArgs) -> Self {
        Self {
            depth: w.depth,
            branch_min_width: w.branch_min_width,
            branch_max_width: w.branch_max_width,
            branch_width: w.branch_width,
            leaf_min_width: w.leaf_min_width,
            leaf_max_width: w.leaf_max_width,
            leaf_width: w.leaf_width,
            min_width: w.min_width,
            max_width: w.max_width,
            width: w.width,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Scalar,
    Vector,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Tree { events } => {
            let events = read_events(&events)
                .with_context(|| format!("reading {}", events.display()))?;
            print!("{}", project(&events).render());
        }
        Commands::Invent(args) => {
            let invent_spec = read_spec(&args.spec)?;
            let parameters = ParameterOverrides::from(args.widths).resolve();
            let preset = args.function_type.map(|t| TypePreset {
                function_type: match t {
                    TypeArg::Scalar => FunctionType::Scalar,
                    TypeArg::Vector => FunctionType::Vector,
                },
                fields: FieldPreset::default(),
            });
            let request = InventRequest::New {
                invent_spec,
                parameters,
                preset,
            };
            run(cli.config.as_deref(), request, args.events.as_deref()).await?;
        }
        Commands::Resume { name, events } => {
            run(
                cli.config.as_deref(),
                InventRequest::Resume { name },
                events.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inventor=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file = path
                .file_name()
                .context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn read_spec(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut spec = String::new();
        std::io::stdin().read_to_string(&mut spec)?;
        return Ok(spec);
    }
    std::fs::read_to_string(source).with_context(|| format!("reading {}", source))
}

async fn run(
    config_path: Option<&Path>,
    request: InventRequest,
    events: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => InventConfig::load(path),
        None => InventConfig::default(),
    };
    config.apply_env();
    let secrets = Secrets::from_env()?;

    let host: Arc<dyn Host> = Arc::new(GitHubHost::new(&secrets.github_token));
    let owner = host
        .authenticated_owner()
        .await
        .context("resolving the GitHub account")?;
    info!(owner = %owner, state_dir = %config.invent.state_dir.display(), "starting");

    let repository_owner = owner.clone();
    let agent = Arc::new(LlmAgent::new(&secrets.anthropic_api_key, config.agent.clone()));
    let cancel = CancellationToken::new();
    let inventor = Inventor::new(
        agent,
        Arc::new(GitCli::new()),
        host,
        Arc::new(StructuralChecker::new()),
        InventorOptions {
            state_dir: config.invent.state_dir.clone(),
            owner,
            author: GitAuthor {
                name: config.git.author_name.clone(),
                email: config.git.author_email.clone(),
            },
            max_retries: config.invent.max_retries,
            max_concurrency: config.invent.max_concurrency,
        },
    )
    .with_cancel(cancel.clone());

    let log = Arc::new(ProgressLog::new());
    let mut sink = FanoutSink::new()
        .with(log.clone())
        .with(Arc::new(TracingSink));
    if let Some(path) = events {
        sink = sink.with(Arc::new(EventFileSink::create(path)?));
    }
    let sink: Arc<dyn ProgressSink> = Arc::new(sink);

    let result = tokio::select! {
        result = inventor.invent(request, sink) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling");
            cancel.cancel();
            Err(inventor_core::Error::Cancelled)
        }
    };

    print!("{}", log.snapshot().render());
    let invented = result?;
    println!("https://github.com/{}/{}", repository_owner, invented.name);
    Ok(())
}
