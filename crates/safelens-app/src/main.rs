//! safelens application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the completion client pool, relational store, catalog and checkpoints
//! 4. Answer one question (`--question`) or read questions from stdin

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

use safelens_chat::{
    ClientPool, Orchestrator, RunContext, SchemaCatalog, SemanticLoader, SessionStore,
};
use safelens_core::config::{expand_home, CheckpointBackend, StoreBackend};
use safelens_core::{SafelensConfig, VisualizationSpec};
use safelens_storage::{
    CheckpointStore, Database, MemoryCheckpointStore, RelationalStore, SqliteCheckpointStore,
    SqliteStore,
};

use cli::CliArgs;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn build_relational_store(config: &SafelensConfig) -> AppResult<Arc<dyn RelationalStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = expand_home(&config.store.sqlite_path);
            tracing::info!(path = %path.display(), "Using SQLite relational store");
            Ok(Arc::new(SqliteStore::new(path)))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            tracing::info!(url = %config.store.masked_url(), "Using Postgres relational store");
            Ok(Arc::new(safelens_storage::PostgresStore::from_config(
                &config.store,
            )))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            Err("the postgres store backend requires building with the `postgres` feature".into())
        }
    }
}

fn build_checkpoint_store(config: &SafelensConfig) -> AppResult<Arc<dyn CheckpointStore>> {
    match config.checkpoint.backend {
        CheckpointBackend::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        CheckpointBackend::Sqlite => {
            let path = expand_home(&config.checkpoint.sqlite_path);
            ensure_parent(&path)?;
            let db = Database::new(&path)?;
            tracing::info!(path = %path.display(), "Checkpoint database opened");
            Ok(Arc::new(SqliteCheckpointStore::new(Arc::new(db))))
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn build_orchestrator(config: &SafelensConfig) -> AppResult<Orchestrator> {
    let pool = ClientPool::from_config(&config.completion)?;
    if pool.is_empty() {
        tracing::warn!("No completion API keys configured; every question will fail");
    } else {
        tracing::info!(
            clients = pool.len(),
            model = %config.completion.model,
            "Completion client pool ready"
        );
    }

    let catalog = SchemaCatalog::load(&expand_home(&config.catalog.schema_path));
    let semantics = SemanticLoader::from_dir(expand_home(&config.catalog.semantics_dir));

    let orchestrator = Orchestrator::builder()
        .completion_client(Arc::new(pool))
        .relational_store(build_relational_store(config)?)
        .catalog(catalog)
        .semantics(semantics)
        .checkpoint_store(build_checkpoint_store(config)?)
        .session_store(Arc::new(SessionStore::new(
            config.workflow.max_session_turns,
        )))
        .workflow_config(&config.workflow)
        .build()?;
    Ok(orchestrator)
}

fn print_answer(answer: &str, spec: &VisualizationSpec) {
    println!("{}", answer);
    if !spec.is_empty() {
        match serde_json::to_string_pretty(spec) {
            Ok(json) => println!("\nChart:\n{}", json),
            Err(e) => tracing::warn!(error = %e, "Failed to render chart spec"),
        }
    }
}

/// Answer one question. Ctrl-C cancels the run in flight.
async fn answer(orchestrator: &Arc<Orchestrator>, thread_id: &str, question: &str, stream: bool) {
    let ctx = RunContext::new();
    let token = ctx.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    if stream {
        let events = orchestrator.ask_streamed(thread_id, question, ctx);
        tokio::pin!(events);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) if event.is_final() => {
                    let answer = event.data["final_answer"].as_str().unwrap_or_default();
                    let spec = event.data["visualization_spec"]
                        .as_object()
                        .cloned()
                        .unwrap_or_default();
                    print_answer(answer, &spec);
                }
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                },
                Err(e) => {
                    tracing::error!(error = %e, "Request failed");
                    println!("{}", e.user_message());
                }
            }
        }
    } else {
        match orchestrator.ask(thread_id, question, &ctx).await {
            Ok(outcome) => print_answer(&outcome.final_answer, &outcome.visualization_spec),
            Err(e) => {
                tracing::error!(error = %e, "Request failed");
                println!("{}", e.user_message());
            }
        }
    }

    ctrl_c.abort();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = SafelensConfig::load_or_default(&config_file);
    config.apply_env_overrides();

    // Tracing. An explicit --log-level wins over RUST_LOG.
    let level = args.resolve_log_level(&config.general.log_level);
    let filter = if args.log_level.is_some() {
        tracing_subscriber::EnvFilter::new(&level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting safelens v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let thread_id = args.resolve_thread_id();
    tracing::info!(thread_id = %thread_id, "Conversation thread");

    if let Some(question) = args.question.as_deref() {
        answer(&orchestrator, &thread_id, question, args.stream).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }
        answer(&orchestrator, &thread_id, question, args.stream).await;
        println!();
    }

    tracing::info!("safelens shutting down");
    Ok(())
}
