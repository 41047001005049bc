//! Ranking - spam detection, priority scoring, filtering and the feed

pub mod feed;
pub mod ranking;
pub mod spam;

pub use feed::{FeedEntry, FeedMetrics, FeedSentiment, FeedTiming, FeedToken, TopSignal};
pub use ranking::{
    overall_sentiment, percent_bullish, representative_message, FilterCriteria, RankingEngine,
};
pub use spam::spam_score;
