use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use stylesnap::api::serve_api;
use stylesnap::config::AppConfig;
use stylesnap::features::FeatureExtractor;
use stylesnap::index::VectorSearch;
use stylesnap::ingest::IngestService;
use stylesnap::Result;
use tracing::info;

#[derive(Parser)]
#[command(name = "stylesnap")]
#[command(about = "StyleSnap fashion visual-search service and catalog tooling")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind host (overrides configuration)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
        /// Disable CORS even if the configuration enables it
        #[arg(long)]
        no_cors: bool,
    },
    /// Run catalog ingestion from shopping search
    Ingest {
        /// Queries to ingest; uses the configured query set when omitted
        queries: Vec<String>,
        /// Maximum results per query (overrides configuration)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Vector index maintenance
    #[command(subcommand)]
    Index(IndexCommands),
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Show index statistics
    Stats,
    /// Sample indexed products and print their metadata
    View {
        /// Number of products to sample
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Delete one product by id
    Delete {
        /// Product id to delete
        product_id: String,
    },
    /// Delete every vector in the index
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    stylesnap::logging::init_logging_with_config(Some(&config))?;
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_cors,
        } => {
            let host = host.unwrap_or_else(|| config.server_host().to_string());
            let port = port.unwrap_or_else(|| config.server_port());
            let enable_cors = config.cors_enabled() && !no_cors;
            serve_api(&config, host, port, enable_cors).await?;
        }
        Commands::Ingest { queries, limit } => {
            handle_ingest_command(config, queries, limit).await?;
        }
        Commands::Index(index_command) => {
            handle_index_command(&config, index_command).await?;
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| stylesnap::StyleSnapError::Config(e.to_string()))?;
            println!("{rendered}");
        }
    }

    Ok(())
}

async fn handle_ingest_command(
    mut config: AppConfig,
    queries: Vec<String>,
    limit: Option<usize>,
) -> Result<()> {
    if let Some(limit) = limit {
        config.ingestion.results_per_query = limit;
    }

    let extractor = Arc::new(FeatureExtractor::from_config(&config)?);
    let index = Arc::new(VectorSearch::from_config(&config).await?);
    let service = IngestService::new(&config.ingestion, extractor, index)?;

    // Ctrl-C requests a graceful stop; the partial batch still gets flushed
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current product...");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let report = service.run(&queries, &shutdown).await?;
    println!(
        "Ingestion complete: {} indexed, {} skipped, {} products failed, {} queries failed",
        report.indexed, report.skipped, report.failed, report.failed_queries
    );
    Ok(())
}

async fn handle_index_command(config: &AppConfig, command: IndexCommands) -> Result<()> {
    let index = VectorSearch::from_config(config).await?;

    match command {
        IndexCommands::Stats => {
            let stats = index.stats().await?;
            println!("Index: {}", config.index_name());
            println!("  Total vectors:  {}", stats.total_vectors);
            println!("  Dimension:      {}", stats.dimension);
            println!("  Index fullness: {:.4}", stats.index_fullness);
        }
        IndexCommands::View { limit } => {
            // Dummy-vector query; any unit direction samples the catalog
            let dim = index.dimension();
            let sample_query = vec![1.0 / (dim as f32).sqrt(); dim];
            let results = index
                .search(&sample_query, limit, &stylesnap::index::SearchFilters::default())
                .await?;

            println!("Sampling {} of index '{}':", results.len(), config.index_name());
            for (i, result) in results.iter().enumerate() {
                let m = &result.metadata;
                println!("{}. {} [{}]", i + 1, m.name_or_unknown(), result.product_id);
                println!("   category: {}", m.category_or_unknown());
                println!("   brand:    {}", m.brand_or_unknown());
                println!("   price:    {}", m.price_display());
                println!("   url:      {}", m.product_url_or_empty());
            }
        }
        IndexCommands::Delete { product_id } => {
            index.delete(&product_id).await?;
            println!("Deleted '{product_id}'");
        }
        IndexCommands::Clear { force } => {
            if !force && !confirm_destructive(config.index_name())? {
                println!("Aborted");
                return Ok(());
            }
            index.delete_all().await?;
            println!("Index '{}' cleared", config.index_name());
        }
    }
    Ok(())
}

/// Interactive confirmation for destructive index operations
fn confirm_destructive(index_name: &str) -> Result<bool> {
    println!("This will delete EVERY vector in index '{index_name}'.");
    println!("Type 'yes' to confirm:");
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}
