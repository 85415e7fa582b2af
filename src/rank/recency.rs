// recency.rs — Rank-based decay weights for the reference library.
//
// Weight at rank r (0 = most recently added) is proportional to 1 / (1 + log10(r + 1)).
// The log decay keeps old items contributing while still favoring recent additions.
// Callers must pass the length of a most-recent-first sequence.

/// Normalized recency weights for `len` reference items. Sums to 1 for `len > 0`.
pub fn recency_weights(len: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..len).map(|r| 1.0 / (1.0 + ((r + 1) as f64).log10())).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}
