// error.rs — Failure taxonomy for the ranking engine.
//
// Only `InputCorruption` ever reaches the caller of `rank_candidates`. The others are
// raised internally and recovered by a fallback (local provider, zero vectors, zero scores).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankError {
    /// Remote provider selected without a usable credential.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or parsing failure while talking to the remote embedding API.
    #[error("embedding provider error: {0}")]
    TransientProvider(String),

    /// Anything that breaks between provider acquisition and scoring.
    #[error("ranking computation failed: {0}")]
    Computation(String),

    /// A reference item carries an unparseable `added_at`.
    #[error("malformed added_at {value:?} on reference item {index}: {source}")]
    InputCorruption {
        index: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
