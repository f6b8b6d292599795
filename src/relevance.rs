// src/relevance.rs
//! Relevance gate over a classification result.

use crate::classify::{ClassificationResult, Impact, Sentiment};

/// Keep iff impact is not low, at least one topic was assigned, and the
/// sentiment is positive or neutral.
pub fn accept(result: &ClassificationResult) -> bool {
    result.impact != Impact::Low
        && !result.topics.is_empty()
        && matches!(result.sentiment, Sentiment::Positive | Sentiment::Neutral)
}

/// Short label for logs/metrics explaining a rejection.
pub fn rejection_reason(result: &ClassificationResult) -> Option<&'static str> {
    if result.impact == Impact::Low {
        Some("low_impact")
    } else if result.topics.is_empty() {
        Some("no_topics")
    } else if result.sentiment == Sentiment::Negative {
        Some("negative")
    } else {
        None
    }
}
