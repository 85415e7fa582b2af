//! Relevance ranking of newly announced arXiv papers against a reference library.
//!
//! Candidates and reference items are embedded (locally with candle, or through a remote
//! OpenAI-compatible API), compared by cosine similarity, and scored with recency weights
//! that favor recent library additions. See [`rank_candidates`].

pub mod config;
pub mod embeddings;
pub mod error;
pub mod logging;
pub mod paper;
pub mod rank;

pub use embeddings::ProviderConfig;
pub use error::RankError;
pub use paper::{Candidate, ReferenceItem};
pub use rank::orchestrator::{rank_candidates, rank_candidates_detailed, Ranking};
