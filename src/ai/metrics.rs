//! Usage Metrics Collection
//!
//! Aggregates provider usage across adapters: network calls, cache hits,
//! retries, token counts and estimated cost. Thread-safe for concurrent
//! feature requests.
//!
//! The pre-call token estimate is recorded next to the provider-reported
//! input count, so estimator drift stays visible.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = create_shared_metrics("session-123");
//! metrics.record_call("gpt-4o-mini", 1_200, Some(usage), 0.0004, 850);
//! println!("{}", metrics.summary().display());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::ai::provider::TokenUsage;

// =============================================================================
// Usage Metrics
// =============================================================================

/// Thread-safe usage collector
///
/// Counters are atomics; the per-model breakdown sits behind a `RwLock`.
#[derive(Debug)]
pub struct UsageMetrics {
    session_id: String,
    started_at: DateTime<Utc>,
    start_time: Instant,
    network_calls: AtomicU32,
    failed_calls: AtomicU32,
    retries: AtomicU32,
    cache_hits: AtomicU32,
    cache_misses: AtomicU32,
    /// Pre-call estimate of prompt tokens
    estimated_prompt_tokens: AtomicU64,
    /// Provider-reported input tokens
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    /// Estimated cost in microdollars for atomic ops
    total_cost_micros: AtomicU64,
    per_model: RwLock<BTreeMap<String, ModelUsage>>,
}

/// Usage attributed to one model
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelUsage {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Snapshot of collected usage
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub network_calls: u32,
    pub failed_calls: u32,
    pub retries: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub estimated_prompt_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    pub models: BTreeMap<String, ModelUsage>,
}

impl UsageMetrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            start_time: Instant::now(),
            network_calls: AtomicU32::new(0),
            failed_calls: AtomicU32::new(0),
            retries: AtomicU32::new(0),
            cache_hits: AtomicU32::new(0),
            cache_misses: AtomicU32::new(0),
            estimated_prompt_tokens: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            total_cost_micros: AtomicU64::new(0),
            per_model: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a successful provider call
    pub fn record_call(
        &self,
        model: &str,
        estimated_prompt_tokens: usize,
        usage: Option<TokenUsage>,
        cost_usd: f64,
        latency_ms: u64,
    ) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
        self.estimated_prompt_tokens
            .fetch_add(estimated_prompt_tokens as u64, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.total_cost_micros
            .fetch_add((cost_usd * 1_000_000.0) as u64, Ordering::Relaxed);

        let usage = usage.unwrap_or_default();
        self.input_tokens
            .fetch_add(usage.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens as u64, Ordering::Relaxed);

        if usage.input_tokens > 0 {
            let drift = estimated_prompt_tokens as f64 / usage.input_tokens as f64 - 1.0;
            debug!(
                model,
                estimated = estimated_prompt_tokens,
                reported = usage.input_tokens,
                drift_pct = %format!("{:+.1}", drift * 100.0),
                "Prompt token estimate vs provider usage"
            );
        }

        let mut models = self.per_model.write().unwrap_or_else(|poisoned| {
            tracing::error!("Metrics per_model RwLock poisoned, recovering");
            poisoned.into_inner()
        });
        let entry = models.entry(model.to_string()).or_default();
        entry.calls += 1;
        entry.input_tokens += usage.input_tokens as u64;
        entry.output_tokens += usage.output_tokens as u64;
        entry.cost_usd += cost_usd;
    }

    /// Record a call that ended in an error after all attempts
    pub fn record_failure(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current snapshot
    pub fn summary(&self) -> MetricsSummary {
        let network_calls = self.network_calls.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let avg_latency_ms = if network_calls > 0 {
            total_latency as f64 / network_calls as f64
        } else {
            0.0
        };

        let models = self
            .per_model
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Metrics per_model RwLock poisoned on read, recovering");
                poisoned.into_inner()
            })
            .clone();

        MetricsSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            total_duration_ms: self.start_time.elapsed().as_millis() as u64,
            network_calls,
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            estimated_prompt_tokens: self.estimated_prompt_tokens.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            avg_latency_ms,
            total_cost_usd: self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            models,
        }
    }
}

impl MetricsSummary {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }

    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "Session: {} (started {})\n\
             Duration: {:.1}s\n\
             Network Calls: {} ({} failed, {} retries)\n\
             Cache: {} hits / {} misses\n\
             Tokens: input {} (estimated {}), output {}\n\
             Avg Latency: {:.0}ms\n\
             Estimated Cost: ${:.4}",
            self.session_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.total_duration_ms as f64 / 1000.0,
            self.network_calls,
            self.failed_calls,
            self.retries,
            self.cache_hits,
            self.cache_misses,
            self.input_tokens,
            self.estimated_prompt_tokens,
            self.output_tokens,
            self.avg_latency_ms,
            self.total_cost_usd
        )
    }
}

// =============================================================================
// Shared Type
// =============================================================================

pub type SharedMetrics = Arc<UsageMetrics>;

pub fn create_shared_metrics(session_id: impl Into<String>) -> SharedMetrics {
    Arc::new(UsageMetrics::new(session_id))
}
