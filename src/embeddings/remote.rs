// remote.rs — OpenAI-compatible embedding API client.
//
// Texts go out in batches of BATCH_SIZE, one POST per batch, sequentially. Results are
// concatenated in input order. A failed batch never aborts the run: the whole call is
// answered with zero vectors so ranking proceeds with zero similarity.

use std::time::Duration;

use serde::Deserialize;

use super::{EmbeddingProvider, EmbeddingVector};
use crate::config;
use crate::error::RankError;

pub struct RemoteEmbeddingProvider {
    agent: ureq::Agent,
    api_key: String,
    model_name: String,
    embedding_url: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(api_key: &str, model_name: &str, base_url: &str) -> Result<Self, RankError> {
        if api_key.trim().is_empty() {
            return Err(RankError::Configuration(
                "API key is required for the embedding API provider".to_string(),
            ));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config::remote::REQUEST_TIMEOUT_SECS))
            .build();

        Ok(Self {
            agent,
            api_key: api_key.trim().to_string(),
            model_name: model_name.to_string(),
            embedding_url: format!("{}/embeddings", base_url.trim_end_matches('/')),
        })
    }

    fn fetch_batch(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>, RankError> {
        let resp = self
            .agent
            .post(&self.embedding_url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(serde_json::json!({
                "model": self.model_name,
                "input": batch,
            }))
            .map_err(|e| RankError::TransientProvider(format!("POST {}: {}", self.embedding_url, e)))?;

        let body: EmbeddingResponse = resp
            .into_json()
            .map_err(|e| RankError::TransientProvider(format!("invalid response body: {e}")))?;

        order_embeddings(body.data, batch.len())
    }
}

/// Put items back in request order and check that every text got exactly one vector.
fn order_embeddings(mut items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<EmbeddingVector>, RankError> {
    if items.len() != expected {
        return Err(RankError::TransientProvider(format!(
            "expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }
    let indexed = items.iter().filter(|item| item.index.is_some()).count();
    if indexed == 0 {
        return Ok(items.into_iter().map(|item| item.embedding).collect());
    }
    if indexed != expected {
        return Err(RankError::TransientProvider(format!(
            "only {indexed} of {expected} embeddings carry an index"
        )));
    }

    items.sort_by_key(|item| item.index);
    // Sorted indices must be exactly 0..expected: no gaps, duplicates or strays.
    if let Some((pos, item)) = items.iter().enumerate().find(|(pos, item)| item.index != Some(*pos)) {
        return Err(RankError::TransientProvider(format!(
            "embedding index {:?} at position {} is outside 0..{} or repeated",
            item.index, pos, expected
        )));
    }
    Ok(items.into_iter().map(|item| item.embedding).collect())
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        let mut all = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(config::remote::BATCH_SIZE).enumerate() {
            log::debug!("Processing batch {} with {} texts", i + 1, batch.len());
            match self.fetch_batch(batch) {
                Ok(vectors) => all.extend(vectors),
                Err(e) => {
                    log::error!(
                        "Error getting embeddings from API (batch {}): {}. Substituting zero vectors for all {} texts",
                        i + 1,
                        e,
                        texts.len()
                    );
                    return Ok(vec![vec![0.0; config::remote::FALLBACK_DIMS]; texts.len()]);
                }
            }
        }

        Ok(all)
    }
}
