//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Generation defaults applied when a request leaves a parameter unset
pub mod generation {
    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default output token allowance
    pub const DEFAULT_MAX_TOKENS: usize = 1000;
}

/// Token budget arithmetic
pub mod budget {
    /// Characters per estimated token for the default heuristic
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Tokens held back from a model's output limit when capping
    pub const SAFETY_RESERVE_TOKENS: usize = 100;

    /// Smallest output allowance after shrinking to fit the context window
    pub const MIN_OUTPUT_TOKENS: usize = 100;

    /// Prompt share of the context window above which a request is rejected
    pub const MAX_PROMPT_CONTEXT_RATIO: f64 = 0.9;

    /// Context window assumed for unrecognized models
    pub const UNKNOWN_MODEL_CONTEXT_TOKENS: usize = 8_192;

    /// Output limit assumed for unrecognized models
    pub const UNKNOWN_MODEL_OUTPUT_TOKENS: usize = 2_048;
}

/// Provider-call retry constants
pub mod retry {
    /// Minimum attempts when retries are enabled
    pub const MIN_ATTEMPTS: u32 = 3;

    /// Base delay for backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Backoff multiplier after a rate limit
    pub const RATE_LIMIT_FACTOR: f64 = 2.0;

    /// Backoff multiplier after an overload
    pub const OVERLOAD_FACTOR: f64 = 3.0;

    /// Jitter applied to each computed delay (fraction, symmetric)
    pub const JITTER_RATIO: f64 = 0.2;

    /// Maximum computed backoff delay (seconds)
    pub const MAX_DELAY_SECS: u64 = 60;

    /// Maximum honored provider retry-after (seconds)
    pub const MAX_RETRY_AFTER_SECS: u64 = 300;
}

/// Chunked generation constants
pub mod chunking {
    /// Maximum attempts per chunk before it is abandoned
    pub const MAX_CHUNK_ATTEMPTS: u32 = 3;

    /// High-throughput profile (long-context models)
    pub mod high_throughput {
        pub const SINGLE_CALL_THRESHOLD_TOKENS: usize = 100_000;
        pub const CHUNK_CHAR_LIMIT: usize = 120_000;
        pub const INTER_CHUNK_DELAY_MS: u64 = 1_000;
        pub const RATE_LIMIT_COOLDOWN_MS: u64 = 5_000;
    }

    /// Standard profile
    pub mod standard {
        pub const SINGLE_CALL_THRESHOLD_TOKENS: usize = 12_000;
        pub const CHUNK_CHAR_LIMIT: usize = 40_000;
        pub const INTER_CHUNK_DELAY_MS: u64 = 3_000;
        pub const RATE_LIMIT_COOLDOWN_MS: u64 = 15_000;
    }

    /// Context window at or above which a model uses the high-throughput profile
    pub const HIGH_THROUGHPUT_CONTEXT_TOKENS: usize = 1_000_000;

    /// Output allowance per chunk call
    pub const CHUNK_MAX_TOKENS: usize = 4_000;
}

/// Quiz generation allowances
pub mod quiz {
    /// Base output allowance regardless of item count
    pub const BASE_TOKENS: usize = 1_000;

    /// Additional output allowance per requested question
    pub const TOKENS_PER_ITEM: usize = 350;
}

/// Cache constants
pub mod cache {
    /// Default response time-to-live (seconds)
    pub const DEFAULT_TTL_SECS: u64 = 3_600;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
}
