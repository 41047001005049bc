//! Contextual scanner - batch token discovery with market data and summaries

pub mod contextual;
pub mod summarizer;

pub use contextual::{
    ContextualScanner, DiscussionWindow, ScanMessage, TokenDiscussion, WindowMessage,
};
pub use summarizer::{
    sentiment_from_summary, strip_markdown, ChatCompletionSummarizer, DiscussionSentiment,
    Summarizer,
};
