use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use courier_core::app::{AllowedRoots, EngineBuilder, EngineConfig, JobStore, NewJob, Submitter};
use courier_core::domain::{ConfigError, JobId, JobMode};
use courier_core::impls::{InMemoryStore, UpstashStore};
use courier_core::ports::{Clock, KvStore, SystemClock, UlidGenerator};

#[derive(Debug, Parser)]
#[command(name = "courier", version, about = "Job queue and execution engine for coding-agent runs")]
struct Cli {
    /// Emit operator logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Durable store backend.
    #[arg(long, global = true, value_enum, env = "COURIER_STORE", default_value_t = StoreKind::Upstash)]
    store: StoreKind,

    #[arg(long, global = true, env = "UPSTASH_REDIS_REST_URL")]
    upstash_url: Option<String>,

    #[arg(long, global = true, env = "UPSTASH_REDIS_REST_TOKEN", hide_env_values = true)]
    upstash_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Upstash Redis REST API.
    Upstash,
    /// Process-local store, for trying the engine out.
    Memory,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the dispatch loop until ctrl-c.
    Worker {
        /// Comma-separated repository roots jobs may run in.
        #[arg(long)]
        allowed_roots: Option<String>,

        /// Agent executable.
        #[arg(long)]
        agent_bin: Option<String>,
    },
    /// Create a pending job and enqueue it.
    Submit {
        repo_path: String,
        prompt: String,
        #[arg(long, default_value = "plan")]
        mode: JobMode,
        /// Capability list passed to the agent instead of the default.
        #[arg(long)]
        allowed_tools: Option<String>,
    },
    /// Ask a running job to stop.
    Cancel { id: String },
    /// Queue a message for a running job.
    Send {
        id: String,
        text: String,
        /// Interrupt the agent before delivering the message.
        #[arg(long)]
        interrupt: bool,
    },
    /// Print a job's metadata.
    Status { id: String },
    /// Print a job's log.
    Logs { id: String },
    /// Print a job's post-run artifacts.
    Artifacts { id: String },
    /// List recent jobs.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier=info,courier_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn KvStore>> {
    match cli.store {
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; nothing outlives this process");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreKind::Upstash => {
            let url = cli.upstash_url.clone().ok_or(ConfigError::Missing {
                name: "UPSTASH_REDIS_REST_URL",
            })?;
            let token = cli.upstash_token.clone().ok_or(ConfigError::Missing {
                name: "UPSTASH_REDIS_REST_TOKEN",
            })?;
            Ok(Arc::new(UpstashStore::new(url, token)?))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_worker(
    kv: Arc<dyn KvStore>,
    allowed_roots: Option<String>,
    agent_bin: Option<String>,
) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_env().context("reading engine configuration")?;
    if let Some(raw) = allowed_roots {
        config.allowed_roots = AllowedRoots::parse(&raw)?;
    }
    if let Some(program) = agent_bin {
        config.agent_program = program;
    }
    tracing::info!(
        roots = ?config.allowed_roots.roots(),
        agent = %config.agent_program,
        grace = ?config.cancel_grace,
        timeout = ?config.job_timeout,
        "worker starting"
    );

    let engine = EngineBuilder::new().store(kv).config(config).build()?;
    let handle = engine.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;
    tracing::info!("shutdown requested; waiting for the in-flight job");
    handle.shutdown_and_join().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let kv = open_store(&cli)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let submitter = Submitter::new(
        JobStore::new(kv.clone()),
        Arc::new(UlidGenerator::new(clock.clone())),
        clock,
    );

    match cli.command {
        Command::Worker {
            allowed_roots,
            agent_bin,
        } => run_worker(kv, allowed_roots, agent_bin).await?,
        Command::Submit {
            repo_path,
            prompt,
            mode,
            allowed_tools,
        } => {
            let mut request = NewJob::new(repo_path, prompt, mode);
            request.allowed_tools = allowed_tools;
            let id = submitter.create_job(request).await?;
            println!("{id}");
        }
        Command::Cancel { id } => {
            submitter.request_cancel(&JobId::new(id)).await?;
        }
        Command::Send {
            id,
            text,
            interrupt,
        } => {
            if text.trim().is_empty() {
                bail!("refusing to send an empty message");
            }
            submitter
                .send_input(&JobId::new(id), text, interrupt)
                .await?;
        }
        Command::Status { id } => print_json(&submitter.status(&JobId::new(id)).await?)?,
        Command::Logs { id } => print_json(&submitter.logs(&JobId::new(id)).await?)?,
        Command::Artifacts { id } => {
            print_json(&submitter.artifacts(&JobId::new(id)).await?)?
        }
        Command::Jobs { limit } => print_json(&submitter.recent(limit).await?)?,
    }
    Ok(())
}
