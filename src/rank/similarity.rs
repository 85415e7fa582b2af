// similarity.rs — Dense cosine similarity between two vector sets.

use crate::config;
use crate::error::RankError;

/// Cosine similarity of every row of `a` against every row of `b`, shape `[a.len(), b.len()]`.
///
/// Rows are normalized to unit L2 norm first; an all-zero row uses `ZERO_NORM_EPSILON` as its
/// norm, so it scores 0 against everything instead of NaN. Values are not clamped to
/// `[-1, 1]`, so rounding can leave them a hair outside.
pub fn cosine_similarity_matrix(a: &[Vec<f32>], b: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, RankError> {
    let dims = a.iter().chain(b.iter()).map(Vec::len).next();
    if let Some(d) = dims {
        if let Some(bad) = a.iter().chain(b.iter()).find(|row| row.len() != d) {
            return Err(RankError::Computation(format!(
                "embedding dimension mismatch: {} vs {}",
                d,
                bad.len()
            )));
        }
    }

    let a_n: Vec<Vec<f32>> = a.iter().map(|row| normalized(row)).collect();
    let b_n: Vec<Vec<f32>> = b.iter().map(|row| normalized(row)).collect();

    let matrix: Vec<Vec<f32>> = a_n
        .iter()
        .map(|ra| b_n.iter().map(|rb| dot(ra, rb)).collect())
        .collect();

    log::debug!("Similarity matrix shape: [{}, {}]", a.len(), b.len());
    if let Some((min, max)) = value_range(&matrix) {
        log::debug!("Similarity range: min={:.4}, max={:.4}", min, max);
    }

    Ok(matrix)
}

fn normalized(row: &[f32]) -> Vec<f32> {
    let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { config::ranking::ZERO_NORM_EPSILON } else { norm };
    row.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn value_range(matrix: &[Vec<f32>]) -> Option<(f32, f32)> {
    matrix.iter().flatten().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}
