//! Pipeline assembly - ingest, processing, scheduling and publishing
//!
//! `Engine` owns one instance of every collaborator and wires them together.
//! Components are injectable, so tests build engines from stubs.

pub mod ingest;
pub mod processor;
pub mod publisher;
pub mod scheduler;

pub use ingest::IngestQueue;
pub use processor::{PipelineMetrics, Processor};
pub use publisher::{Publisher, Subscription};
pub use scheduler::Scheduler;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::{ClusteringEngine, ContextMessage};
use crate::config::Config;
use crate::dedup::{Deduplicator, Embedder, HttpEmbedder};
use crate::error::{Error, Result};
use crate::extract::{Chain, Extractor, SentimentAnalyzer};
use crate::market::{DexScreenerClient, MarketOracle};
use crate::persist::{BufferedSink, JsonlSink, PersistenceSink};
use crate::rank::{FeedEntry, RankingEngine};
use crate::scan::{ChatCompletionSummarizer, ContextualScanner, ScanMessage, TokenDiscussion};
use crate::sources::SourceTracker;

/// The signal engine: every pipeline component behind one handle
pub struct Engine {
    config: Config,
    pub queue: Arc<IngestQueue>,
    pub dedup: Arc<Deduplicator>,
    pub clustering: Arc<ClusteringEngine>,
    pub tracker: Arc<SourceTracker>,
    pub ranking: Arc<RankingEngine>,
    pub publisher: Arc<Publisher>,
    pub sink: Arc<BufferedSink>,
    pub processor: Arc<Processor>,
    scheduler: Arc<Scheduler>,
    scanner: Option<Arc<ContextualScanner>>,
    cancel: CancellationToken,
}

impl Engine {
    /// Assemble an engine from explicit collaborators
    pub fn new(
        config: Config,
        market: Arc<dyn MarketOracle>,
        embedder: Option<Arc<dyn Embedder>>,
        summarizer: Option<Arc<dyn crate::scan::Summarizer>>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        let default_chain = Chain::parse(&config.clustering.default_chain).unwrap_or(Chain::Solana);

        let queue = Arc::new(IngestQueue::new(&config.ingest));
        let dedup = Arc::new(Deduplicator::new(config.dedup.clone(), embedder));
        let clustering = Arc::new(ClusteringEngine::new(
            &config.clustering,
            config.scoring.clone(),
        ));
        let tracker = Arc::new(SourceTracker::new(config.reputation.clone()));
        let ranking = Arc::new(RankingEngine::new(
            config.scoring.clone(),
            config.ranking.clone(),
        ));
        let publisher = Arc::new(Publisher::new(config.pipeline.subscriber_buffer));
        let buffered = Arc::new(BufferedSink::new(sink, config.persistence.buffer_cap));

        let processor = Arc::new(Processor::new(
            Extractor::new(default_chain),
            dedup.clone(),
            clustering.clone(),
            tracker.clone(),
            ranking.clone(),
            publisher.clone(),
            buffered.clone(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            config.pipeline.clone(),
            clustering.clone(),
            tracker.clone(),
            market.clone(),
            buffered.clone(),
        ));

        let scanner = Some(Arc::new(ContextualScanner::new(
            config.scanner.clone(),
            market,
            summarizer,
        )));

        Self {
            config,
            queue,
            dedup,
            clustering,
            tracker,
            ranking,
            publisher,
            sink: buffered,
            processor,
            scheduler,
            scanner,
            cancel: CancellationToken::new(),
        }
    }

    /// Assemble an engine with the production collaborators described by the
    /// configuration: DexScreener market data, optional HTTP embedding and
    /// summarizer oracles, JSONL persistence.
    pub fn from_config(config: Config) -> Result<Self> {
        let market: Arc<dyn MarketOracle> =
            Arc::new(DexScreenerClient::new(config.oracles.market_timeout_secs));

        let embedder: Option<Arc<dyn Embedder>> = if config.oracles.embedding_endpoint.is_empty() {
            None
        } else {
            Some(Arc::new(HttpEmbedder::new(
                config.oracles.embedding_endpoint.clone(),
                config.oracles.embedding_dimension,
                config.oracles.embedding_timeout_secs,
            )))
        };

        let summarizer: Option<Arc<dyn crate::scan::Summarizer>> =
            if config.oracles.summarizer_endpoint.is_empty() {
                None
            } else {
                Some(Arc::new(ChatCompletionSummarizer::new(
                    config.oracles.summarizer_endpoint.clone(),
                    config.oracles.summarizer_api_key.clone(),
                    config.oracles.summarizer_model.clone(),
                    config.oracles.summarizer_timeout_secs,
                )))
            };

        let sink: Arc<dyn PersistenceSink> = Arc::new(
            JsonlSink::new(&config.persistence.data_dir).map_err(|e| Error::Io(e.to_string()))?,
        );

        Ok(Self::new(config, market, embedder, summarizer, sink))
    }

    /// Run processing and scheduling until shutdown
    pub async fn run(&self) {
        info!("engine started");
        let scheduler = self.scheduler.clone();
        let cancel = self.cancel.clone();
        let scheduler_task = tokio::spawn(async move { scheduler.run(cancel).await });

        let interval = Duration::from_secs_f64(self.config.pipeline.batch_interval_seconds);
        loop {
            let batch = self.queue.pop_batch(self.config.pipeline.batch_size).await;
            if batch.is_empty() {
                // Queue closed and drained
                break;
            }
            self.processor.process_batch(batch).await;

            // Pace batches unless we're shutting down
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.cancel.cancel();
        let _ = scheduler_task.await;
        info!(metrics = %self.processor.metrics.summary(), "engine stopped");
    }

    /// Drain and process at most one batch; used by tests and backfills
    pub async fn drain_once(&self) -> usize {
        let batch = self.queue.pop_batch(self.config.pipeline.batch_size).await;
        self.processor.process_batch(batch).await
    }

    /// Signal shutdown: close the ingest queue so workers drain and exit,
    /// and cancel the scheduler's timers.
    pub fn shutdown(&self) {
        self.queue.close();
        self.cancel.cancel();
    }

    /// Current ranked feed at the configured size
    pub fn ranked_feed(&self) -> Vec<FeedEntry> {
        self.top_signals(self.config.ranking.feed_limit)
    }

    /// Current ranked feed
    pub fn top_signals(&self, limit: usize) -> Vec<FeedEntry> {
        let now = chrono::Utc::now();
        self.clustering.refresh_scores_at(now);
        self.ranking.top_signals(
            self.clustering.active_clusters(),
            &self.ranking.default_criteria(),
            &self.tracker,
            limit,
            now,
        )
    }

    /// Run the contextual scanner over an explicit message batch
    pub async fn scan_messages(&self, messages: &[ScanMessage]) -> Result<Vec<TokenDiscussion>> {
        let scanner = self
            .scanner
            .as_ref()
            .ok_or_else(|| Error::Internal("scanner not configured".into()))?;
        Ok(scanner.scan(messages).await)
    }

    /// Run the contextual scanner over recently ingested messages and attach
    /// the discovered discussion windows to their active clusters.
    pub async fn scan_recent(&self) -> Result<Vec<TokenDiscussion>> {
        let recent: Vec<ScanMessage> = self
            .processor
            .recent_messages()
            .into_iter()
            .map(|m| ScanMessage {
                text: m.text,
                source_name: m.source_name,
                timestamp: m.timestamp.to_rfc3339(),
            })
            .collect();

        let discoveries = self.scan_messages(&recent).await?;

        let analyzer = SentimentAnalyzer::new();
        for token in &discoveries {
            let Some(chain) = Chain::parse(&token.chain) else {
                continue;
            };
            let context: Vec<ContextMessage> = token
                .discussions
                .iter()
                .flat_map(|window| {
                    let chat = window.chat.clone();
                    let analyzer = &analyzer;
                    window.messages.iter().map(move |m| ContextMessage {
                        text: m.text.clone(),
                        source_name: chat.clone(),
                        timestamp: m.time,
                        sentiment: Some(analyzer.analyze(&m.text).polarity),
                    })
                })
                .collect();
            if !context.is_empty() {
                self.clustering.attach_context(&token.address, chain, context);
            }
        }

        Ok(discoveries)
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.processor.metrics
    }
}
