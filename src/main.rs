use anyhow::{Context, Result};
use chatgraph::{
    config::{ChatGraphConfig, EmbeddingMode},
    demo::{demo_export, generate_demo_export},
    insights::GraphInsights,
    logging::{init_logging, LogFormat, LogLevel, LoggingConfig},
    processing::{ProcessingOutput, ProcessingService},
    types::{ColorScheme, NodeSizeMode, ProcessingProgress},
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[clap(name = "chatgraph")]
#[clap(about = "ChatGraph - map a chat export into a graph of related conversations")]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format: compact, pretty or json
    #[clap(long, global = true, env = "CHATGRAPH_LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a chat export into a conversation graph
    Process {
        /// Chat export file (conversations.json)
        #[clap(short, long)]
        input: PathBuf,

        /// Where to write the graph JSON
        #[clap(short, long, default_value = "graph.json")]
        output: PathBuf,

        /// Use deterministic offline embeddings instead of the remote model
        #[clap(long)]
        offline: bool,

        /// Minimum similarity for an edge (0.1 to 1.0)
        #[clap(short, long)]
        threshold: Option<f32>,

        /// Node size mode: messageCount, wordCount or uniform
        #[clap(long)]
        node_size: Option<NodeSizeMode>,

        /// Color scheme: cluster, chronological or topic
        #[clap(long)]
        color_scheme: Option<ColorScheme>,

        /// Also write the intermediate conversations, embeddings and matrix
        #[clap(long)]
        include_raw: bool,
    },

    /// Write a sample export that can be fed back into `process`
    Demo {
        /// Output file path
        #[clap(short, long, default_value = "demo_export.json")]
        output: PathBuf,

        /// Number of generated conversations; the five built-in samples when omitted
        #[clap(short = 'n', long)]
        count: Option<usize>,

        /// Seed for generated conversations
        #[clap(long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&LoggingConfig {
        level: if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        },
        format: cli.log_format,
        span_events: cli.verbose,
    })?;

    match cli.command {
        Commands::Process {
            input,
            output,
            offline,
            threshold,
            node_size,
            color_scheme,
            include_raw,
        } => {
            let mut config = load_config(cli.config.as_deref()).await?;
            if offline {
                config.embedding_mode = EmbeddingMode::Offline;
            }
            if let Some(threshold) = threshold {
                config.default_controls.similarity_threshold = threshold;
            }
            if let Some(node_size) = node_size {
                config.default_controls.node_size = node_size;
            }
            if let Some(color_scheme) = color_scheme {
                config.default_controls.color_scheme = color_scheme;
            }
            config.default_controls = config.default_controls.validated();

            process_command(config, &input, &output, include_raw).await?;
        }

        Commands::Demo {
            output,
            count,
            seed,
        } => {
            demo_command(&output, count, seed).await?;
        }
    }

    Ok(())
}

/// File settings first, then credentials from the environment if the file
/// leaves them out.
async fn load_config(path: Option<&Path>) -> Result<ChatGraphConfig> {
    let from_env = ChatGraphConfig::from_env();

    let Some(path) = path else {
        return Ok(from_env);
    };

    let mut config = ChatGraphConfig::load(path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    if config.embedding_api_key.is_none() {
        config.embedding_api_key = from_env.embedding_api_key;
    }
    if from_env.embedding_mode == EmbeddingMode::Offline {
        config.embedding_mode = EmbeddingMode::Offline;
    }
    Ok(config)
}

async fn process_command(
    config: ChatGraphConfig,
    input: &Path,
    output: &Path,
    include_raw: bool,
) -> Result<()> {
    info!(
        "Processing {:?} with {} embeddings",
        input, config.embedding_mode
    );

    let service = ProcessingService::new(config)?;
    let report = |progress: ProcessingProgress| match &progress.error {
        Some(error) => warn!("[{}] {}", progress.stage, error),
        None => info!(
            "[{}] {:>3.0}% {}",
            progress.stage, progress.progress, progress.message
        ),
    };

    let result: ProcessingOutput = service.process_file(input, &report).await?;

    let json = if include_raw {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string_pretty(&result.graph)?
    };
    fs::write(output, json)
        .await
        .with_context(|| format!("Failed to write graph to {:?}", output))?;

    let stats = service.stats(&result.graph);
    info!(
        "{} conversations, {} connections, {} clusters (average size {}, largest {})",
        stats.total_conversations,
        stats.total_connections,
        stats.total_clusters,
        stats.average_cluster_size,
        stats.largest_cluster
    );

    if let Some(insights) = GraphInsights::from_graph(&result.graph) {
        let topics: Vec<String> = insights
            .top_topics
            .iter()
            .take(5)
            .map(|t| format!("{} ({})", t.topic, t.count))
            .collect();
        info!("Top topics: {}", topics.join(", "));
        info!(
            "Sentiment: {} positive, {} neutral, {} negative",
            insights.sentiment.positive, insights.sentiment.neutral, insights.sentiment.negative
        );
    }

    for cluster in &result.graph.clusters {
        info!("  {} '{}': {}", cluster.id, cluster.name, cluster.description);
    }

    info!("Graph written to {:?}", output);
    Ok(())
}

async fn demo_command(output: &Path, count: Option<usize>, seed: u64) -> Result<()> {
    let export = match count {
        Some(count) => {
            info!("Generating {} demo conversations (seed {})", count, seed);
            generate_demo_export(count, seed)
        }
        None => demo_export(),
    };

    let json = serde_json::to_string_pretty(&export)?;
    fs::write(output, json).await?;

    info!("Wrote {} conversations to {:?}", export.len(), output);
    info!(
        "Run 'chatgraph process --offline -i {:?}' to build a graph from it",
        output
    );
    Ok(())
}
