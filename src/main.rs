//! Signal intelligence engine for crypto chat streams
//!
//! Ingests chat messages, extracts token and wallet references, clusters
//! mentions per token, scores and ranks them, and emits a live feed plus a
//! batch discovery scan.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use alpha_radar::config::Config;
use alpha_radar::extract::RawMessage;
use alpha_radar::pipeline::Engine;
use alpha_radar::scan::ScanMessage;

/// Signal intelligence engine for crypto chat streams
#[derive(Parser)]
#[command(name = "radar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming pipeline over a JSONL message stream
    Start {
        /// Path to a JSONL file of raw messages, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// After the stream ends, run the contextual scanner over the
        /// retained message window and print the discovery feed
        #[arg(long)]
        digest: bool,
    },

    /// Batch contextual scan over a JSONL message file
    Scan {
        /// Path to a JSONL file of scan messages
        #[arg(short, long)]
        input: String,

        /// Maximum tokens to return
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alpha_radar=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { input, digest } => start(config, &input, digest).await,
        Commands::Scan { input, limit } => scan(config, &input, limit).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Run the streaming pipeline until the input ends or ctrl-c
async fn start(config: Config, input: &str, digest: bool) -> Result<()> {
    let engine = Arc::new(Engine::from_config(config).context("failed to assemble engine")?);

    // Print feed updates as JSON lines
    let mut subscription = engine.publisher.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(entry) = subscription.rx.recv().await {
            match serde_json::to_string(&entry) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("feed entry serialization failed: {}", e),
            }
        }
    });

    // Feed the ingest queue from the JSONL stream
    let producer = {
        let engine = engine.clone();
        let input = input.to_string();
        tokio::spawn(async move {
            if let Err(e) = produce_messages(&engine, &input).await {
                error!("message producer failed: {}", e);
            }
            // End of stream: let the workers drain and exit
            engine.queue.close();
        })
    };

    // Ctrl-c triggers a drain-and-exit shutdown
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                engine.shutdown();
            }
        });
    }

    engine.run().await;
    producer.abort();
    printer.abort();

    info!(
        dropped = engine.queue.dropped_count(),
        sink_dropped = engine.sink.dropped_count(),
        "stream ended: {}",
        engine.metrics().summary()
    );

    // Final ranked snapshot of whatever is still active
    let feed = engine.ranked_feed();
    if !feed.is_empty() {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    }

    if digest {
        let discoveries = engine.scan_recent().await?;
        println!("{}", serde_json::to_string_pretty(&discoveries)?);
    }

    Ok(())
}

/// Push JSONL messages from a file or stdin into the engine
async fn produce_messages(engine: &Engine, input: &str) -> Result<()> {
    if input == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        push_lines(engine, reader).await
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("cannot open {input}"))?;
        push_lines(engine, BufReader::new(file)).await
    }
}

async fn push_lines<R>(engine: &Engine, reader: BufReader<R>) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    let mut pushed = 0u64;
    let mut skipped = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawMessage>(&line) {
            Ok(message) => {
                if engine.queue.push(message, false) {
                    pushed += 1;
                }
            }
            Err(e) => {
                skipped += 1;
                warn!("skipping undecodable message line: {}", e);
            }
        }
    }

    info!(pushed, skipped, "input stream exhausted");
    Ok(())
}

/// Batch contextual scan: read messages, discover tokens, print JSON
async fn scan(mut config: Config, input: &str, limit: usize) -> Result<()> {
    config.scanner.scan_limit = limit;
    let engine = Engine::from_config(config).context("failed to assemble engine")?;

    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("cannot open {input}"))?;

    let messages: Vec<ScanMessage> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("skipping undecodable scan line: {}", e);
                None
            }
        })
        .collect();

    info!(count = messages.len(), "running contextual scan");
    let discoveries = engine.scan_messages(&messages).await?;
    println!("{}", serde_json::to_string_pretty(&discoveries)?);

    Ok(())
}
