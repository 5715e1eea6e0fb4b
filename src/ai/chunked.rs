//! Chunked Generation
//!
//! Runs whole-document extraction when content is too large for one call.
//!
//! ## Batch lifecycle
//!
//! ```text
//! NotStarted → ProcessingChunk(i) → ChunkDone(i) | ChunkRetrying(i) | ChunkAbandoned(i)
//!            → ... → Merged → Done
//! ```
//!
//! Chunks are dispatched strictly in order through one adapter, with a pause
//! before every chunk after the first. Each chunk prompt carries every item
//! discovered so far. Adapter-level retries are disabled for chunk calls and
//! transient failures are retried here instead, up to `max_chunk_attempts`
//! attempts: a rate-limited chunk waits out the profile cooldown, an
//! overloaded one backs off x3 per attempt. Any other chunk failure is local:
//! the chunk is skipped and the batch continues. Only cancellation aborts a
//! batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::prompt::{ChunkPromptBuilder, SubjectExtractionPrompt};
use super::provider::{GenerationOptions, GenerationResponse, ProviderAdapter, backoff_delay};
use super::tokenizer::split_into_chunks;
use super::validation::{DiscoveredItem, dedup_items, normalize_name, parse_item_list};
use crate::config::{ChunkingConfig, ChunkingProfile};
use crate::types::{ErrorCategory, QuizloomError, Result};

// =============================================================================
// Batch State
// =============================================================================

/// Position of a batch in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "chunk", rename_all = "snake_case")]
pub enum BatchPhase {
    NotStarted,
    ProcessingChunk(usize),
    ChunkDone(usize),
    ChunkRetrying(usize),
    ChunkAbandoned(usize),
    Merged,
    Done,
}

/// Final state of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChunkState {
    Done { items: usize, attempts: u32 },
    /// Reply could not be parsed into items
    Skipped { attempts: u32, reason: String },
    /// Rate-limited or overloaded on every attempt, or failed with a non-retryable error
    Abandoned { attempts: u32, reason: String },
}

impl ChunkState {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Done { attempts, .. }
            | Self::Skipped { attempts, .. }
            | Self::Abandoned { attempts, .. } => *attempts,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// What happened during one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub single_call: bool,
    pub phase: BatchPhase,
    /// Every phase the batch passed through, in order
    pub history: Vec<BatchPhase>,
    pub chunks: Vec<ChunkState>,
}

impl BatchReport {
    fn new(single_call: bool) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            single_call,
            phase: BatchPhase::NotStarted,
            history: vec![BatchPhase::NotStarted],
            chunks: Vec::new(),
        }
    }

    fn transition(&mut self, phase: BatchPhase) {
        debug!(batch_id = %self.batch_id, ?phase, "Batch transition");
        self.phase = phase;
        self.history.push(phase);
    }

    pub fn completed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_done()).count()
    }

    /// Number of times the batch entered `phase`
    pub fn count(&self, phase: BatchPhase) -> usize {
        self.history.iter().filter(|p| **p == phase).count()
    }
}

/// Merged items plus the synthetic response that carries them
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub response: GenerationResponse,
    pub items: Vec<DiscoveredItem>,
    pub report: BatchReport,
}

/// One slice of a document awaiting dispatch
#[derive(Debug)]
struct ChunkJob<'a> {
    index: usize,
    total: usize,
    content: &'a str,
    known_items: Vec<String>,
    attempts: u32,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Sequential chunk dispatcher with per-chunk retry and cross-chunk dedup
#[derive(Clone)]
pub struct ChunkedGenerationCoordinator {
    chunking: ChunkingConfig,
    prompts: Arc<dyn ChunkPromptBuilder>,
}

impl std::fmt::Debug for ChunkedGenerationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedGenerationCoordinator")
            .field("chunking", &self.chunking)
            .finish_non_exhaustive()
    }
}

impl ChunkedGenerationCoordinator {
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self {
            chunking,
            prompts: Arc::new(SubjectExtractionPrompt),
        }
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn ChunkPromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Profile for the model the adapter will use for `options`
    pub fn profile_for(&self, adapter: &ProviderAdapter, options: &GenerationOptions) -> ChunkingProfile {
        let model = adapter.resolve_model(options.model.as_deref());
        self.chunking
            .profile_for(adapter.catalog().context_limit(&model))
    }

    /// Extract items from `content`, splitting it when it is too large
    #[instrument(skip_all, fields(provider = %adapter.kind(), chars = content.len()))]
    pub async fn generate(
        &self,
        adapter: &ProviderAdapter,
        content: &str,
        options: &GenerationOptions,
    ) -> Result<BatchOutcome> {
        let profile = self.profile_for(adapter, options);
        let estimated = adapter.estimator().estimate(content);

        if estimated < profile.single_call_threshold_tokens {
            return self.single_call(adapter, content, options).await;
        }

        let chunks = split_into_chunks(content, profile.chunk_char_limit);
        let mut report = BatchReport::new(false);
        info!(
            batch_id = %report.batch_id,
            estimated_tokens = estimated,
            chunks = chunks.len(),
            chunk_char_limit = profile.chunk_char_limit,
            "Starting chunked generation"
        );

        let cancel = options.cancel.clone().unwrap_or_default();
        let chunk_options = GenerationOptions {
            max_tokens: Some(self.chunking.chunk_max_tokens),
            cancel: Some(cancel.clone()),
            ..options.clone()
        }
        .without_retries();

        let mut known_items = options.existing_items.clone();
        let mut known_keys: HashSet<String> =
            known_items.iter().map(|n| normalize_name(n)).collect();
        let mut gathered = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                adapter
                    .delay()
                    .sleep(profile.inter_chunk_delay(), &cancel)
                    .await?;
            }

            let job = ChunkJob {
                index,
                total: chunks.len(),
                content: chunk,
                known_items: known_items.clone(),
                attempts: 0,
            };
            let (state, items) = self
                .process_chunk(adapter, job, &profile, &chunk_options, &cancel, &mut report)
                .await?;

            for item in &items {
                if known_keys.insert(item.dedup_key()) {
                    known_items.push(item.name.trim().to_string());
                }
            }
            gathered.extend(items);
            report.chunks.push(state);
        }

        let existing: HashSet<String> = options
            .existing_items
            .iter()
            .map(|n| normalize_name(n))
            .collect();
        let merged: Vec<DiscoveredItem> = dedup_items(gathered)
            .into_iter()
            .filter(|item| !existing.contains(&item.dedup_key()))
            .collect();
        report.transition(BatchPhase::Merged);

        let model = adapter.resolve_model(options.model.as_deref());
        let response = synthetic_response(&merged, model, adapter, &report)?;
        report.transition(BatchPhase::Done);

        info!(
            batch_id = %report.batch_id,
            completed = report.completed_chunks(),
            total = report.chunks.len(),
            items = merged.len(),
            "Chunked generation complete"
        );

        Ok(BatchOutcome {
            response,
            items: merged,
            report,
        })
    }

    async fn single_call(
        &self,
        adapter: &ProviderAdapter,
        content: &str,
        options: &GenerationOptions,
    ) -> Result<BatchOutcome> {
        let mut report = BatchReport::new(true);
        report.transition(BatchPhase::ProcessingChunk(0));

        let prompt = self.prompts.build(
            content,
            &options.existing_items,
            options.language.as_deref(),
            0,
            1,
        );
        let response = adapter.generate_text(&prompt, options).await?;
        let items = parse_item_list(&response.content)?;

        let existing: HashSet<String> = options
            .existing_items
            .iter()
            .map(|n| normalize_name(n))
            .collect();
        let items: Vec<DiscoveredItem> = dedup_items(items)
            .into_iter()
            .filter(|item| !existing.contains(&item.dedup_key()))
            .collect();

        report.transition(BatchPhase::ChunkDone(0));
        report.chunks.push(ChunkState::Done {
            items: items.len(),
            attempts: 1,
        });
        report.transition(BatchPhase::Merged);
        report.transition(BatchPhase::Done);

        Ok(BatchOutcome {
            response,
            items,
            report,
        })
    }

    /// Run one chunk to completion; only cancellation is returned as an error
    async fn process_chunk(
        &self,
        adapter: &ProviderAdapter,
        mut job: ChunkJob<'_>,
        profile: &ChunkingProfile,
        options: &GenerationOptions,
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) -> Result<(ChunkState, Vec<DiscoveredItem>)> {
        let prompt = self.prompts.build(
            job.content,
            &job.known_items,
            options.language.as_deref(),
            job.index,
            job.total,
        );

        loop {
            job.attempts += 1;
            report.transition(BatchPhase::ProcessingChunk(job.index));

            let error = match adapter.generate_text(&prompt, options).await {
                Ok(response) => match parse_item_list(&response.content) {
                    Ok(items) => {
                        debug!(chunk = job.index, items = items.len(), "Chunk done");
                        report.transition(BatchPhase::ChunkDone(job.index));
                        let state = ChunkState::Done {
                            items: items.len(),
                            attempts: job.attempts,
                        };
                        return Ok((state, items));
                    }
                    Err(e) => {
                        warn!(chunk = job.index, error = %e, "Unparseable chunk reply, skipping");
                        report.transition(BatchPhase::ChunkAbandoned(job.index));
                        let state = ChunkState::Skipped {
                            attempts: job.attempts,
                            reason: e.to_string(),
                        };
                        return Ok((state, Vec::new()));
                    }
                },
                Err(e) => e,
            };

            match error {
                QuizloomError::Cancelled { .. } => return Err(error),
                QuizloomError::RateLimited { .. }
                    if job.attempts < self.chunking.max_chunk_attempts =>
                {
                    warn!(
                        chunk = job.index,
                        attempt = job.attempts,
                        cooldown_ms = profile.rate_limit_cooldown_ms,
                        "Chunk rate limited, cooling down"
                    );
                    report.transition(BatchPhase::ChunkRetrying(job.index));
                    adapter
                        .delay()
                        .sleep(profile.rate_limit_cooldown(), cancel)
                        .await?;
                }
                QuizloomError::Overloaded { .. }
                    if job.attempts < self.chunking.max_chunk_attempts =>
                {
                    let backoff = backoff_delay(ErrorCategory::Overloaded, job.attempts);
                    warn!(
                        chunk = job.index,
                        attempt = job.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Chunk hit an overloaded provider, backing off"
                    );
                    report.transition(BatchPhase::ChunkRetrying(job.index));
                    adapter.delay().sleep(backoff, cancel).await?;
                }
                other => {
                    warn!(
                        chunk = job.index,
                        attempts = job.attempts,
                        error = %other,
                        "Abandoning chunk"
                    );
                    report.transition(BatchPhase::ChunkAbandoned(job.index));
                    let state = ChunkState::Abandoned {
                        attempts: job.attempts,
                        reason: other.to_string(),
                    };
                    return Ok((state, Vec::new()));
                }
            }
        }
    }
}

fn synthetic_response(
    items: &[DiscoveredItem],
    model: String,
    adapter: &ProviderAdapter,
    report: &BatchReport,
) -> Result<GenerationResponse> {
    let count = |pred: fn(&ChunkState) -> bool| report.chunks.iter().filter(|c| pred(c)).count();

    let mut metadata = BTreeMap::new();
    metadata.insert("provider".to_string(), json!(adapter.kind().as_str()));
    metadata.insert("batch_id".to_string(), json!(report.batch_id.to_string()));
    metadata.insert("chunks_total".to_string(), json!(report.chunks.len()));
    metadata.insert(
        "chunks_completed".to_string(),
        json!(count(ChunkState::is_done)),
    );
    metadata.insert(
        "chunks_skipped".to_string(),
        json!(count(|c| matches!(c, ChunkState::Skipped { .. }))),
    );
    metadata.insert(
        "chunks_abandoned".to_string(),
        json!(count(|c| matches!(c, ChunkState::Abandoned { .. }))),
    );
    metadata.insert("items".to_string(), json!(items.len()));

    Ok(GenerationResponse {
        content: serde_json::to_string(items)?,
        model_used: model,
        token_count: None,
        metadata,
    })
}
