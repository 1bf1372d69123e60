//! Usage and timing metrics for messages and threads.
//!
//! Every field defaults to zero or empty so partial metrics compose
//! safely: addition is componentwise and nothing is discarded on save.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage statistics for a single completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the generated completion.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Total tokens consumed.
    #[serde(default)]
    pub total_tokens: u64,
}

/// Wall-clock timing for a model or tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// When the call started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the call ended.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Call latency in milliseconds.
    #[serde(default)]
    pub latency_ms: f64,
}

impl Timing {
    /// Timing spanning `started_at..ended_at` with the latency derived.
    #[must_use]
    pub fn between(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let latency_ms = (ended_at - started_at).num_microseconds().unwrap_or(0) as f64 / 1000.0;
        Self {
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            latency_ms,
        }
    }
}

/// Provider-specific tracing identifiers, recorded when available and
/// otherwise left as empty strings. Treated as opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveCall {
    /// Call identifier.
    #[serde(default)]
    pub id: String,
    /// Trace identifier.
    #[serde(default)]
    pub trace_id: String,
    /// Project identifier.
    #[serde(default)]
    pub project_id: String,
    /// Request identifier.
    #[serde(default)]
    pub request_id: String,
}

/// Per-message metrics attached by the agent loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetrics {
    /// The model that produced this message, if any.
    #[serde(default)]
    pub model: Option<String>,
    /// Wall-clock timing of the producing call.
    #[serde(default)]
    pub timing: Timing,
    /// Token usage of the producing call.
    #[serde(default)]
    pub usage: TokenUsage,
    /// Opaque tracing identifiers.
    #[serde(default)]
    pub weave_call: WeaveCall,
}

/// Per-model usage counters within a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of completions attributed to the model.
    #[serde(default)]
    pub calls: u64,
    /// Completion tokens attributed to the model.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Prompt tokens attributed to the model.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Total tokens attributed to the model.
    #[serde(default)]
    pub total_tokens: u64,
}

/// Aggregated metrics for a thread: the running sum of its messages'
/// usage, overall and broken down by model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetrics {
    /// Completion tokens across all messages.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Prompt tokens across all messages.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Total tokens across all messages.
    #[serde(default)]
    pub total_tokens: u64,
    /// Usage broken down by model name.
    #[serde(default)]
    pub model_usage: BTreeMap<String, ModelUsage>,
}

impl ThreadMetrics {
    /// Fold one message's metrics into the thread totals.
    ///
    /// Missing fields contribute zero; a message without a model updates
    /// only the overall counters.
    pub fn absorb(&mut self, metrics: &MessageMetrics) {
        self.completion_tokens += metrics.usage.completion_tokens;
        self.prompt_tokens += metrics.usage.prompt_tokens;
        self.total_tokens += metrics.usage.total_tokens;

        if let Some(model) = &metrics.model {
            let entry = self.model_usage.entry(model.clone()).or_default();
            entry.calls += 1;
            entry.completion_tokens += metrics.usage.completion_tokens;
            entry.prompt_tokens += metrics.usage.prompt_tokens;
            entry.total_tokens += metrics.usage.total_tokens;
        }
    }
}
