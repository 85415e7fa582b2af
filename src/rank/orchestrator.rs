// orchestrator.rs — Recency-weighted relevance ranking of candidate papers.
//
// score[i] = SCORE_SCALE * Σ_j sim(candidate_i, reference_j) * weight_j
//
// Failures after the reference is parsed never abort the digest: every candidate gets 0.0
// and keeps its input position. A corrupt reference timestamp is the only error returned.

use anyhow::Context;
use chrono::{DateTime, FixedOffset};

use crate::config;
use crate::embeddings::{self, EmbeddingProvider, ProviderConfig};
use crate::error::RankError;
use crate::paper::{Candidate, ReferenceItem};
use crate::rank::recency::recency_weights;

/// Outcome of a ranking run.
#[derive(Debug, Clone, PartialEq)]
pub enum Ranking {
    /// Scored and sorted by descending score.
    Ranked(Vec<Candidate>),
    /// Every score is 0.0 and the input order is kept.
    Degraded { candidates: Vec<Candidate>, reason: String },
}

impl Ranking {
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Ranking::Ranked(c) => c,
            Ranking::Degraded { candidates, .. } => candidates,
        }
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        match self {
            Ranking::Ranked(c) => c,
            Ranking::Degraded { candidates, .. } => candidates,
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Ranking::Ranked(_) => None,
            Ranking::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Rank `candidates` against `reference` with the provider described by `config`.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    reference: Vec<ReferenceItem>,
    config: &ProviderConfig,
) -> Result<Vec<Candidate>, RankError> {
    rank_candidates_detailed(candidates, reference, config).map(Ranking::into_candidates)
}

/// Like [`rank_candidates`], but reports whether the run degraded.
pub fn rank_candidates_detailed(
    candidates: Vec<Candidate>,
    reference: Vec<ReferenceItem>,
    config: &ProviderConfig,
) -> Result<Ranking, RankError> {
    rank_with_provider(candidates, reference, || embeddings::select_provider(config))
}

/// Ranking with an injected provider factory. The factory is only called when there is
/// something to compare.
pub fn rank_with_provider<F>(
    mut candidates: Vec<Candidate>,
    reference: Vec<ReferenceItem>,
    make_provider: F,
) -> Result<Ranking, RankError>
where
    F: FnOnce() -> anyhow::Result<Box<dyn EmbeddingProvider>>,
{
    log::info!(
        "Starting paper reranking with {} candidates and {} reference items",
        candidates.len(),
        reference.len()
    );

    let reference = sort_by_recency(reference)?;
    let weights = recency_weights(reference.len());

    if candidates.is_empty() {
        return Ok(Ranking::Ranked(candidates));
    }
    if reference.is_empty() {
        return Ok(degrade(candidates, "reference library is empty".to_string()));
    }

    match compute_scores(&candidates, &reference, &weights, make_provider) {
        Ok(scores) => {
            for (c, s) in candidates.iter_mut().zip(scores) {
                log::info!("Paper {} {:?} - Score: {:.6}", c.identifier, c.title, s);
                c.score = Some(s);
            }
            // Stable: equal scores keep their input order.
            candidates.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
            Ok(Ranking::Ranked(candidates))
        }
        Err(e) => {
            log::error!("Error during paper vectorization: {:#}", e);
            Ok(degrade(candidates, format!("{e:#}")))
        }
    }
}

/// Parse every `added_at` and order most-recent-first. Equal timestamps keep input order.
fn sort_by_recency(reference: Vec<ReferenceItem>) -> Result<Vec<ReferenceItem>, RankError> {
    let mut dated: Vec<(DateTime<FixedOffset>, ReferenceItem)> = reference
        .into_iter()
        .enumerate()
        .map(|(index, item)| match DateTime::parse_from_rfc3339(item.added_at.trim()) {
            Ok(t) => Ok((t, item)),
            Err(source) => Err(RankError::InputCorruption {
                index,
                value: item.added_at,
                source,
            }),
        })
        .collect::<Result<_, _>>()?;

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(dated.into_iter().map(|(_, item)| item).collect())
}

fn compute_scores<F>(
    candidates: &[Candidate],
    reference: &[ReferenceItem],
    weights: &[f64],
    make_provider: F,
) -> anyhow::Result<Vec<f64>>
where
    F: FnOnce() -> anyhow::Result<Box<dyn EmbeddingProvider>>,
{
    let provider = make_provider().context("initialize embedding provider")?;

    log::info!("Encoding {} reference items with {}", reference.len(), provider.model_name());
    let reference_texts: Vec<String> = reference.iter().map(|r| r.text.clone()).collect();
    let reference_matrix = provider.encode(&reference_texts).context("encode reference library")?;
    check_count("reference", reference_texts.len(), reference_matrix.len())?;

    log::info!("Encoding {} candidate papers with {}", candidates.len(), provider.model_name());
    let candidate_texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let candidate_matrix = provider.encode(&candidate_texts).context("encode candidates")?;
    check_count("candidate", candidate_texts.len(), candidate_matrix.len())?;

    let sim = provider
        .similarity(&candidate_matrix, &reference_matrix)
        .context("compute similarity matrix")?;

    if sim.len() != candidates.len() || sim.iter().any(|row| row.len() != weights.len()) {
        return Err(RankError::Computation(format!(
            "similarity matrix shape mismatch: expected [{}, {}]",
            candidates.len(),
            weights.len()
        ))
        .into());
    }

    let scores: Vec<f64> = sim
        .iter()
        .map(|row| {
            let weighted: f64 = row.iter().zip(weights).map(|(&s, &w)| s as f64 * w).sum();
            weighted * config::ranking::SCORE_SCALE
        })
        .collect();

    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(RankError::Computation(format!("non-finite score for candidate #{i}")).into());
    }

    Ok(scores)
}

fn check_count(what: &str, expected: usize, got: usize) -> Result<(), RankError> {
    if expected != got {
        return Err(RankError::Computation(format!(
            "provider returned {got} {what} embeddings for {expected} texts"
        )));
    }
    Ok(())
}

fn degrade(mut candidates: Vec<Candidate>, reason: String) -> Ranking {
    log::warn!("Ranking degraded, returning {} papers unranked: {}", candidates.len(), reason);
    for c in candidates.iter_mut() {
        c.score = Some(0.0);
    }
    Ranking::Degraded { candidates, reason }
}

fn score_of(c: &Candidate) -> f64 {
    c.score.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::remote::RemoteEmbeddingProvider;
    use crate::embeddings::EmbeddingVector;

    /// Bag-of-words over a fixed vocabulary: one dimension per word, unknown words dropped.
    struct VocabProvider {
        vocab: Vec<&'static str>,
    }

    impl VocabProvider {
        fn boxed(vocab: &[&'static str]) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            Ok(Box::new(Self { vocab: vocab.to_vec() }))
        }
    }

    impl EmbeddingProvider for VocabProvider {
        fn model_name(&self) -> &str {
            "vocab"
        }

        fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let words: Vec<String> = t.split_whitespace().map(str::to_lowercase).collect();
                    self.vocab
                        .iter()
                        .map(|v| words.iter().filter(|w| w.as_str() == *v).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct FailingEncoder;

    impl EmbeddingProvider for FailingEncoder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
            anyhow::bail!("model exploded")
        }
    }

    /// Drops the last vector of every call.
    struct ShortEncoder;

    impl EmbeddingProvider for ShortEncoder {
        fn model_name(&self) -> &str {
            "short"
        }

        fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    const VOCAB: &[&str] = &[
        "quantum", "computing", "error", "correction", "codes", "ancient", "roman", "pottery", "glazing",
    ];

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.identifier.as_str()).collect()
    }

    fn assert_all_zero_in_input_order(ranking: &Ranking, expected: &[&str]) {
        assert_eq!(ids(ranking.candidates()), expected);
        assert!(ranking.candidates().iter().all(|c| c.score == Some(0.0)));
    }

    #[test]
    fn test_topical_candidate_ranks_first() {
        let candidates = vec![
            Candidate::new("C2", "ancient roman pottery"),
            Candidate::new("C1", "quantum computing error correction"),
        ];
        let reference = vec![
            ReferenceItem::new("roman pottery glazing", "2023-01-10T08:00:00Z"),
            ReferenceItem::new("quantum error correction codes", "2024-06-01T08:00:00Z"),
        ];

        let ranking = rank_with_provider(candidates, reference, || VocabProvider::boxed(VOCAB)).unwrap();

        assert!(ranking.degraded_reason().is_none());
        let out = ranking.candidates();
        assert_eq!(ids(out), vec!["C1", "C2"]);
        let (s1, s2) = (out[0].score.unwrap(), out[1].score.unwrap());
        assert!(s1 > s2, "{s1} <= {s2}");

        // C1 only overlaps the most recent item: cos = 3/4 at weight w0.
        let w = recency_weights(2);
        assert!((s1 - 10.0 * 0.75 * w[0]).abs() < 1e-5);
    }

    #[test]
    fn test_recent_reference_outweighs_older() {
        // Both candidates match one reference item exactly; the newer item has more weight
        // even though the reference list is given oldest first.
        let candidates = vec![Candidate::new("old-topic", "pottery"), Candidate::new("new-topic", "quantum")];
        let reference = vec![
            ReferenceItem::new("pottery", "2020-01-01T00:00:00Z"),
            ReferenceItem::new("quantum", "2024-01-01T00:00:00+02:00"),
        ];

        let out = rank_with_provider(candidates, reference, || VocabProvider::boxed(VOCAB))
            .unwrap()
            .into_candidates();

        assert_eq!(ids(&out), vec!["new-topic", "old-topic"]);
        let w = recency_weights(2);
        assert!((out[0].score.unwrap() - 10.0 * w[0]).abs() < 1e-5);
        assert!((out[1].score.unwrap() - 10.0 * w[1]).abs() < 1e-5);
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let candidates = vec![
            Candidate::new("A", "roman pottery"),
            Candidate::new("B", "quantum codes"),
            Candidate::new("C", "roman pottery"),
            Candidate::new("D", "roman pottery"),
        ];
        let reference = vec![ReferenceItem::new("roman pottery glazing", "2024-01-01T00:00:00Z")];

        let out = rank_with_provider(candidates, reference, || VocabProvider::boxed(VOCAB))
            .unwrap()
            .into_candidates();

        assert_eq!(ids(&out), vec!["A", "C", "D", "B"]);
    }

    #[test]
    fn test_single_reference_score_is_scaled_cosine() {
        let candidates = vec![Candidate::new("X", "roman pottery glazing")];
        let reference = vec![ReferenceItem::new("roman pottery glazing", "2024-01-01T00:00:00Z")];

        let out = rank_with_provider(candidates, reference, || VocabProvider::boxed(VOCAB))
            .unwrap()
            .into_candidates();

        assert!((out[0].score.unwrap() - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_provider_init_failure_degrades() {
        let candidates = vec![Candidate::new("B", "quantum"), Candidate::new("A", "pottery")];
        let reference = vec![ReferenceItem::new("pottery", "2024-01-01T00:00:00Z")];

        let ranking = rank_with_provider(candidates, reference, || anyhow::bail!("no model available")).unwrap();

        assert_all_zero_in_input_order(&ranking, &["B", "A"]);
        let reason = ranking.degraded_reason().unwrap();
        assert!(reason.contains("initialize embedding provider"), "{reason}");
        assert!(reason.contains("no model available"), "{reason}");
    }

    #[test]
    fn test_encode_failure_degrades() {
        let candidates = vec![Candidate::new("B", "quantum"), Candidate::new("A", "pottery")];
        let reference = vec![ReferenceItem::new("pottery", "2024-01-01T00:00:00Z")];

        let ranking = rank_with_provider(candidates, reference, || Ok(Box::new(FailingEncoder))).unwrap();

        assert_all_zero_in_input_order(&ranking, &["B", "A"]);
        assert!(ranking.degraded_reason().unwrap().contains("encode reference library"));
    }

    #[test]
    fn test_vector_count_mismatch_degrades() {
        let candidates = vec![Candidate::new("B", "x"), Candidate::new("A", "y")];
        let reference = vec![
            ReferenceItem::new("r1", "2024-01-01T00:00:00Z"),
            ReferenceItem::new("r2", "2024-01-02T00:00:00Z"),
        ];

        let ranking = rank_with_provider(candidates, reference, || Ok(Box::new(ShortEncoder))).unwrap();

        assert_all_zero_in_input_order(&ranking, &["B", "A"]);
    }

    #[test]
    fn test_unreachable_remote_gives_zero_scores_in_input_order() {
        let candidates = vec![
            Candidate::new("P3", "quantum computing"),
            Candidate::new("P1", "roman pottery"),
            Candidate::new("P2", "error correction"),
        ];
        let reference = vec![
            ReferenceItem::new("quantum error correction codes", "2024-06-01T08:00:00Z"),
            ReferenceItem::new("roman pottery glazing", "2023-01-10T08:00:00Z"),
        ];

        let ranking = rank_with_provider(candidates, reference, || {
            Ok(Box::new(RemoteEmbeddingProvider::new("sk-test", "stub", "http://127.0.0.1:9")?))
        })
        .unwrap();

        // Zero vectors are a provider-level fallback: the run itself still counts as ranked.
        assert!(ranking.degraded_reason().is_none());
        assert_all_zero_in_input_order(&ranking, &["P3", "P1", "P2"]);
    }

    #[test]
    fn test_malformed_timestamp_is_input_corruption() {
        let candidates = vec![Candidate::new("A", "quantum")];
        let reference = vec![
            ReferenceItem::new("quantum", "2024-01-01T00:00:00Z"),
            ReferenceItem::new("pottery", "last tuesday"),
        ];

        let err = rank_with_provider(candidates, reference, || VocabProvider::boxed(VOCAB)).unwrap_err();

        match err {
            RankError::InputCorruption { index, value, .. } => {
                assert_eq!(index, 1);
                assert_eq!(value, "last tuesday");
            }
            other => panic!("expected InputCorruption, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_timestamp_checked_before_provider() {
        let candidates = vec![Candidate::new("A", "quantum")];
        let reference = vec![ReferenceItem::new("quantum", "")];

        let result = rank_with_provider(candidates, reference, || -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            panic!("provider must not be built for corrupt input")
        });

        assert!(matches!(result, Err(RankError::InputCorruption { index: 0, .. })));
    }

    #[test]
    fn test_no_candidates_skips_provider() {
        let reference = vec![ReferenceItem::new("quantum", "2024-01-01T00:00:00Z")];
        let ranking = rank_with_provider(vec![], reference, || -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            panic!("provider must not be built without candidates")
        })
        .unwrap();
        assert_eq!(ranking, Ranking::Ranked(vec![]));
    }

    #[test]
    fn test_empty_reference_degrades_without_provider() {
        let candidates = vec![Candidate::new("B", "quantum"), Candidate::new("A", "pottery")];
        let ranking = rank_with_provider(candidates, vec![], || -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            panic!("provider must not be built without reference items")
        })
        .unwrap();
        assert_all_zero_in_input_order(&ranking, &["B", "A"]);
        assert!(ranking.degraded_reason().is_some());
    }

    #[test]
    fn test_sort_by_recency_orders_newest_first() {
        let sorted = sort_by_recency(vec![
            ReferenceItem::new("mid", "2023-05-01T00:00:00Z"),
            ReferenceItem::new("new", "2024-05-01T00:00:00Z"),
            ReferenceItem::new("old", "2021-05-01T00:00:00Z"),
            ReferenceItem::new("mid-twin", "2023-05-01T00:00:00Z"),
        ])
        .unwrap();
        let texts: Vec<&str> = sorted.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "mid", "mid-twin", "old"]);
    }

    #[test]
    fn test_rank_candidates_remote_without_key_uses_local_model() {
        // No key anywhere: the remote request resolves to the local model, which here is an
        // empty directory and fails to load, so the run degrades instead of erroring.
        let dir = std::env::temp_dir().join(format!("paper-rank-no-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cfg = ProviderConfig {
            use_remote_provider: true,
            api_key: None,
            local_model_name: dir.to_string_lossy().to_string(),
            ..ProviderConfig::default()
        };

        let ranking = rank_candidates_detailed(
            vec![Candidate::new("A", "quantum"), Candidate::new("B", "pottery")],
            vec![ReferenceItem::new("quantum", "2024-01-01T00:00:00Z")],
            &cfg,
        )
        .unwrap();

        assert_all_zero_in_input_order(&ranking, &["A", "B"]);
        assert!(ranking.degraded_reason().unwrap().contains("config.json"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
