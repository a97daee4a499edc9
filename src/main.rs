//! Chat Strategy CLI
//!
//! # Usage
//! ```bash
//! chat-strategy ask "How do I configure the daemon?" --project docs
//! chat-strategy index ./guide.md --project docs --title "User Guide"
//! chat-strategy models
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use chat_strategy::models::conversation::ConversationTurn;
use chat_strategy::models::knowledge::KnowledgeItem;
use chat_strategy::models::settings::AppConfig;
use chat_strategy::models::status::{PipelineStage, StrategyStatus, TaskStatus};
use chat_strategy::services::knowledge::KnowledgeIndexer;
use chat_strategy::services::strategy::{ChannelObserver, StrategyOrchestrator, TurnRequest};
use chat_strategy::storage::{ConfigService, Database};
use chat_strategy_llm::{LlmProvider, OllamaProvider, ProviderConfig};

/// Chat strategy pipeline against a local Ollama backend
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.chat-strategy/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge database (default: ~/.chat-strategy/knowledge.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one turn and print the reply
    Ask {
        /// The user message
        message: String,

        /// Knowledge base project to search
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Chunk, embed and store a markdown file
    Index {
        /// Markdown file to index
        file: PathBuf,

        /// Project the item belongs to
        #[arg(short, long)]
        project: String,

        /// Item title (default: file name)
        #[arg(short, long)]
        title: Option<String>,
    },
    /// List the models installed on the backend
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_target(false)
            .init();
    }

    let config = match &cli.config {
        Some(path) => ConfigService::open(path.clone()),
        None => ConfigService::new(),
    }
    .context("failed to load configuration")?;
    let settings = config.get_config().clone();

    let db = match &cli.database {
        Some(path) => Database::open(path),
        None => Database::new(),
    }
    .context("failed to open knowledge database")?;

    let provider: Arc<dyn LlmProvider> = Arc::new(
        OllamaProvider::new(provider_config(&settings)).context("failed to create backend client")?,
    );

    match cli.command {
        Command::Ask { message, project } => ask(provider, db, settings, message, project).await,
        Command::Index {
            file,
            project,
            title,
        } => index(provider, db, settings, file, project, title).await,
        Command::Models => models(provider, settings).await,
    }
}

fn provider_config(settings: &AppConfig) -> ProviderConfig {
    ProviderConfig {
        base_url: Some(settings.backend_host.clone()),
        model: settings.generation_model.clone(),
        request_timeout_secs: settings.request_timeout_secs,
        ..ProviderConfig::default()
    }
}

async fn ask(
    provider: Arc<dyn LlmProvider>,
    db: Database,
    settings: AppConfig,
    message: String,
    project: Option<String>,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_transitions(rx));

    let mut orchestrator = StrategyOrchestrator::new(provider, settings)
        .with_store(Arc::new(db))
        .with_observer(Arc::new(ChannelObserver::new(tx)));

    let chat_id = uuid::Uuid::new_v4().to_string();
    let request = TurnRequest {
        history: vec![ConversationTurn::user(&chat_id, message)],
        chat_id,
        project_id: project,
    };

    let outcome = orchestrator.run_turn(request).await?;
    // The orchestrator owns the last sender; dropping it ends the printer.
    drop(orchestrator);
    printer.await.context("status printer panicked")?;

    if !outcome.retrieval.summary.is_empty() {
        println!("\n[context] {}", outcome.retrieval.summary);
    }
    if outcome.reasoning.activate {
        println!("[deep reasoning] {}", outcome.reasoning.reason);
    }
    println!("\n[{}]\n{}", outcome.turn.actor, outcome.turn.content.to_plain_text());
    Ok(())
}

async fn print_transitions(mut rx: mpsc::UnboundedReceiver<StrategyStatus>) {
    let mut seen: HashMap<PipelineStage, TaskStatus> = HashMap::new();
    while let Some(status) = rx.recv().await {
        for task in &status.tasks {
            if seen.get(&task.id) != Some(&task.status) {
                seen.insert(task.id, task.status);
                if task.status != TaskStatus::Todo {
                    println!("  {:<18} {:<11} {}", task.id.id(), status_label(task.status), task.message);
                }
            }
        }
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in-progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Error => "error",
    }
}

async fn index(
    provider: Arc<dyn LlmProvider>,
    db: Database,
    settings: AppConfig,
    file: PathBuf,
    project: String,
    title: Option<String>,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let item = KnowledgeItem::markdown(project, title, content);
    let indexer = KnowledgeIndexer::new(provider, db, settings.embedding_model);
    let count = indexer.index_item(&item).await?;
    println!("Indexed '{}' ({}) into {} chunk(s)", item.title, item.id, count);
    Ok(())
}

async fn models(provider: Arc<dyn LlmProvider>, settings: AppConfig) -> anyhow::Result<()> {
    let Some(models) = provider
        .list_models()
        .await
        .with_context(|| format!("failed to list models on {}", settings.backend_host))?
    else {
        println!("The backend does not report its models");
        return Ok(());
    };

    let configured = [
        ("generation", settings.generation_model.as_str()),
        ("intermediate", settings.intermediate_model.as_str()),
        ("embedding", settings.embedding_model.as_str()),
    ];
    for name in &models {
        let roles: Vec<&str> = configured
            .iter()
            .filter(|(_, model)| model_matches(name, model))
            .map(|(role, _)| *role)
            .collect();
        if roles.is_empty() {
            println!("{}", name);
        } else {
            println!("{}  ({})", name, roles.join(", "));
        }
    }
    for (role, model) in configured {
        if !models.iter().any(|name| model_matches(name, model)) {
            println!("warning: {} model `{}` is not installed", role, model);
        }
    }
    Ok(())
}

/// Ollama reports `name:tag`; an untagged setting means `latest`.
fn model_matches(installed: &str, configured: &str) -> bool {
    installed == configured || installed == format!("{}:latest", configured)
}
