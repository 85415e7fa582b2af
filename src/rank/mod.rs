// rank/ — Relevance ranking of new papers against the reference library.
//
// Provides:
// - Cosine similarity between embedding sets
// - Recency weights over the reference library
// - The ranking orchestrator (scores, ordering, degrade-to-zero on failure)
// - Star ratings for the digest

pub mod orchestrator;
pub mod recency;
pub mod similarity;
pub mod stars;
