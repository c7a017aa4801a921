use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::TryStreamExt;
use kinetic_flow::adk::embedding::OllamaEmbedder;
use kinetic_flow::adk::history::InMemoryHistoryStore;
use kinetic_flow::adk::model::{compare_models, GenerationConfig, Message, Model, OllamaModel};
use kinetic_flow::config::{Settings, Temperature};
use kinetic_flow::tools::register_builtin_tools;
use kinetic_flow::workflow::builder::Builder;
use kinetic_flow::workflow::graph::{RunConfig, UnreachablePolicy};
use kinetic_flow::workflow::registry::HandlerRegistry;
use std::io::Write;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Initial state as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Override the step ceiling
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print the execution trace
        #[arg(long)]
        trace: bool,
    },
    /// Compile a workflow file and report diagnostics
    Validate {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Treat unreachable nodes as errors
        #[arg(long)]
        strict: bool,
    },
    /// Run a simple prompt directly
    Prompt {
        /// The prompt to send
        #[arg(short, long)]
        prompt: String,

        /// The model to use; `primary` and `alternative` name the configured ones
        #[arg(short, long)]
        model: Option<String>,

        /// Print chunks as they arrive
        #[arg(long)]
        stream: bool,
    },
    /// Send one prompt to every configured comparison model
    Compare {
        /// The prompt to send
        #[arg(short, long)]
        prompt: String,
    },
    /// Print the effective settings
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    match args.command {
        Commands::Run {
            file,
            input,
            max_steps,
            trace,
        } => {
            let initial: serde_json::Value =
                serde_json::from_str(&input).context("--input must be a JSON object")?;

            let graph = builder(&settings).await.build_file(&file).await?;
            log::info!("Running workflow: {}", graph.name());

            let mut config = RunConfig::new();
            config.max_steps = max_steps;
            config.trace = trace;

            let outcome = graph.invoke_with(initial, config).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            if let Some(trace) = outcome.trace {
                println!("{}", serde_json::to_string_pretty(&trace)?);
            }
        }
        Commands::Validate { file, strict } => {
            let policy = if strict {
                UnreachablePolicy::Deny
            } else {
                UnreachablePolicy::Warn
            };
            let graph = builder(&settings)
                .await
                .with_unreachable_policy(policy)
                .build_file(&file)
                .await?;

            println!("{}", serde_json::to_string_pretty(&graph.summary())?);
            for diagnostic in graph.diagnostics() {
                println!("warning: {}", diagnostic);
            }
        }
        Commands::Prompt {
            prompt,
            model,
            stream,
        } => {
            let client = ollama(&settings);
            let timeout = if stream {
                settings.extended_timeout
            } else {
                settings.timeout
            };
            let mut config = GenerationConfig::default().with_timeout(timeout);
            config.model = model.map(|m| settings.resolve_model(&m));
            let messages = [Message::user(prompt)];

            log::info!(
                "Using model: {}",
                config.model.as_deref().unwrap_or(client.name())
            );

            if stream {
                let mut chunks = client.stream(&messages, &config).await?;
                let mut stdout = std::io::stdout();
                while let Some(chunk) = chunks.try_next().await? {
                    write!(stdout, "{}", chunk)?;
                    stdout.flush()?;
                }
                writeln!(stdout)?;
            } else {
                let response = client.complete(&messages, &config).await?;
                println!("{}", response);
            }
        }
        Commands::Compare { prompt } => {
            let client = ollama(&settings);
            let config = GenerationConfig::default()
                .with_temperature(Temperature::Balanced.value())
                .with_timeout(settings.timeout);
            let messages = [Message::user(prompt)];

            let results =
                compare_models(&client, &settings.comparison_models, &messages, &config).await;
            for comparison in results {
                println!("=== {} ===", comparison.model);
                match comparison.result {
                    Ok(answer) => println!("{}\n", answer),
                    Err(err) => println!("error: {}\n", err),
                }
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

fn ollama(settings: &Settings) -> OllamaModel {
    OllamaModel::new(settings.model.clone())
        .with_base_url(settings.base_url.clone())
        .with_timeout(settings.timeout)
}

/// Workflow builder wired to the configured model and embedder, a fresh
/// history store and the built-in handlers
async fn builder(settings: &Settings) -> Builder {
    let registry = HandlerRegistry::new();
    register_builtin_tools(&registry).await;

    let embedder = OllamaEmbedder::new(settings.embedding_model.clone())
        .with_base_url(settings.base_url.clone())
        .with_timeout(settings.timeout);

    Builder::new(registry)
        .with_model(Arc::new(ollama(settings)))
        .with_embedder(Arc::new(embedder))
        .with_history(Arc::new(InMemoryHistoryStore::new()))
        .with_settings(settings.clone())
}
