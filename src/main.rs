use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adaptrag_agent::{Capabilities, WorkflowEngine};
use adaptrag_core::config::AppConfig;
use adaptrag_core::event::EventBus;
use adaptrag_core::types::WorkflowEvent;
use adaptrag_index::{HttpEmbeddingProvider, IndexBuilder, VectorRetriever, VectorStore};

const DEMO_QUESTIONS: [(&str, &str); 2] = [
    ("should route to vectorstore", "What are the types of agent memory?"),
    (
        "should route to web_search",
        "What player at the Bears expected to draft first in the 2024 NFL draft?",
    ),
];

#[derive(Parser)]
#[command(name = "adaptrag", version, about = "Adaptive retrieval-augmented question answering")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "adaptrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,
    /// Answer a single question and exit
    Ask {
        /// Print each workflow node as it executes
        #[arg(long)]
        stream: bool,
        /// The question (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Run the two reference questions, printing every executed node
    Demo,
    /// Show the effective configuration with secrets masked
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adaptrag=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "adaptrag", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    config.require_secrets()?;
    let event_bus = Arc::new(EventBus::default());
    let engine = Arc::new(build_engine(&config, event_bus.clone()).await?);

    match cli.command {
        Commands::Serve => {
            info!(bind = %config.gateway.bind, "Starting HTTP gateway");
            let server = adaptrag_gateway::GatewayServer::new(config.gateway.clone(), engine);
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Ask { stream, question } => {
            let mut text = question.join(" ");
            if text.trim().is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let answer = run_question(&engine, &event_bus, &text, stream).await?;
            println!("{}", answer);
        }
        Commands::Demo => {
            for (i, (expectation, question)) in DEMO_QUESTIONS.iter().enumerate() {
                println!("\n--- Case {}: {} ---", i + 1, expectation);
                println!("Question: {}", question);
                let answer = run_question(&engine, &event_bus, question, true).await?;
                println!("\n>>> Final answer {}:\n{}", i + 1, answer);
            }
        }
        Commands::Config | Commands::Completions { .. } => unreachable!("handled before engine setup"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        return Ok(AppConfig::load(path)?);
    }

    warn!(
        path = %path.display(),
        "No config file found, using defaults and OPENAI_API_KEY / TAVILY_API_KEY from the environment"
    );
    let config = AppConfig::from_env();
    config.validate()?;
    Ok(config)
}

/// Build the index once and wire every capability into an engine.
async fn build_engine(config: &AppConfig, event_bus: Arc<EventBus>) -> anyhow::Result<WorkflowEngine> {
    let llm = adaptrag_llm::build_client(&config.model, &config.fallback_models);
    let embedder = Arc::new(HttpEmbeddingProvider::from_config(
        &config.embedding,
        config.embedding_api_key(),
    ));

    let store = match &config.index.db_path {
        Some(path) => VectorStore::open(Path::new(path), &config.index.collection_name)?,
        None => VectorStore::in_memory(&config.index.collection_name)?,
    };

    let stats = IndexBuilder::from_config(&config.index, &config.embedding, embedder.clone())
        .build(&config.index.urls, &store)
        .await?;
    info!(sources = stats.sources, chunks = stats.chunks, "Document index ready");

    let retriever = VectorRetriever::new(Arc::new(store), embedder, config.index.top_k)
        .with_min_score(config.index.min_score);
    let capabilities = Capabilities::from_config(config, llm, Arc::new(retriever))?;

    Ok(WorkflowEngine::from_config(config, capabilities).with_event_bus(event_bus))
}

/// Run one question, optionally echoing node executions as they finish.
async fn run_question(
    engine: &WorkflowEngine,
    event_bus: &EventBus,
    question: &str,
    stream: bool,
) -> anyhow::Result<String> {
    let printer = stream.then(|| {
        let mut rx = event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    WorkflowEvent::Routed { datasource, .. } => {
                        eprintln!("Route: {}", datasource);
                    }
                    WorkflowEvent::NodeFinished { step, elapsed_ms, .. } => {
                        eprintln!("Node '{}' executed ({} ms).", step, elapsed_ms);
                    }
                    WorkflowEvent::RunComplete { .. } | WorkflowEvent::RunFailed { .. } => break,
                    _ => {}
                }
            }
        })
    });

    let result = engine.invoke(question).await;
    if let Some(handle) = printer {
        handle.await.ok();
    }

    let run = result?;
    Ok(run
        .state
        .into_generation()
        .unwrap_or_else(|| "Failed to generate an answer.".to_string()))
}
