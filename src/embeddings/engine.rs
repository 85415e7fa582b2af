// engine.rs — Candle BERT embedding engine for sentence-transformers models.
//
// Loads config.json + tokenizer.json + model.safetensors and produces one L2-normalized
// sentence vector per text. Pooling follows the model's 1_Pooling/config.json (CLS token or
// attention-mask-aware mean); models without one get mean pooling.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use super::{download, text_prep, EmbeddingProvider, EmbeddingVector};
use crate::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    Cls,
    Mean,
}

#[derive(Debug, Default, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
    #[serde(default)]
    pooling_mode_mean_tokens: bool,
}

impl Pooling {
    fn from_config_str(s: &str) -> anyhow::Result<Self> {
        let cfg: PoolingConfig = serde_json::from_str(s).context("parse pooling config")?;
        Ok(if cfg.pooling_mode_cls_token && !cfg.pooling_mode_mean_tokens {
            Pooling::Cls
        } else {
            Pooling::Mean
        })
    }
}

/// The local provider holds the loaded model and tokenizer.
pub struct LocalEmbeddingProvider {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_name: String,
    dims: usize,
    max_tokens: usize,
    pooling: Pooling,
}

impl LocalEmbeddingProvider {
    /// Resolve `model_name` (directory or hub repository id) and load it.
    pub fn load(model_name: &str) -> anyhow::Result<Self> {
        log::info!("Initializing local embedding provider with model: {}", model_name);
        let model_dir = download::ensure_model_files(model_name)?;
        Self::load_dir(model_name, &model_dir)
    }

    fn load_dir(model_name: &str, model_dir: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let config_path = model_dir.join("config.json");
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        let pooling_path = model_dir.join(config::embedding::POOLING_CONFIG_FILE);
        let pooling = match std::fs::read_to_string(&pooling_path) {
            Ok(s) => Pooling::from_config_str(&s).with_context(|| format!("parse {}", pooling_path.display()))?,
            Err(_) => Pooling::Mean,
        };

        log::info!(
            "Loading embedding model: hidden_size={}, layers={}, heads={}, pooling={:?}",
            bert_config.hidden_size,
            bert_config.num_hidden_layers,
            bert_config.num_attention_heads,
            pooling,
        );

        let weights_path = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };

        let model = BertModel::load(vb, &bert_config).context("load BERT model")?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        let max_tokens = config::embedding::MAX_TOKENS.min(bert_config.max_position_embeddings);
        let tokenizer = with_max_tokens(tokenizer, max_tokens)?;
        log::info!("Embedding model loaded (dims={}, max_tokens={})", bert_config.hidden_size, max_tokens);

        Ok(Self {
            model,
            tokenizer,
            device,
            model_name: model_name.to_string(),
            dims: bert_config.hidden_size,
            max_tokens,
            pooling,
        })
    }

    /// Sentence embedding for one text. Blank text yields a zero vector.
    pub fn embed(&self, text: &str) -> anyhow::Result<EmbeddingVector> {
        let text = text_prep::prepare_paper_text(text);
        if text.is_empty() {
            return Ok(vec![0.0; self.dims]);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let token_ids = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();
        if token_ids.len() > self.max_tokens {
            bail!("tokenizer produced {} tokens, limit is {}", token_ids.len(), self.max_tokens);
        }

        // [1, seq_len]
        let token_ids_t = Tensor::new(
            token_ids.iter().map(|&id| id as i64).collect::<Vec<_>>().as_slice(),
            &self.device,
        )?
        .unsqueeze(0)?;

        let attention_mask_t = Tensor::new(
            attention_mask.iter().map(|&m| m as i64).collect::<Vec<_>>().as_slice(),
            &self.device,
        )?
        .unsqueeze(0)?;

        let token_type_ids = token_ids_t.zeros_like()?;

        // [1, seq_len, hidden_size]
        let output = self
            .model
            .forward(&token_ids_t, &token_type_ids, Some(&attention_mask_t))?;

        let embedding = match self.pooling {
            Pooling::Cls => output.narrow(1, 0, 1)?.squeeze(1)?,
            Pooling::Mean => mean_pooling(&output, &attention_mask_t)?,
        };
        let embedding = l2_normalize(&embedding)?;

        let emb_vec: Vec<f32> = embedding.squeeze(0)?.to_vec1()?;
        if emb_vec.len() != self.dims {
            bail!("unexpected embedding dims: got {}, expected {}", emb_vec.len(), self.dims);
        }

        Ok(emb_vec)
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        // One at a time: padding variable-length abstracts into a batch costs more than it saves on CPU.
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| self.embed(t).with_context(|| format!("embed text #{i}")))
            .collect()
    }

    fn similarity(&self, a: &[EmbeddingVector], b: &[EmbeddingVector]) -> anyhow::Result<Vec<Vec<f32>>> {
        tensor_cosine_similarity(a, b, &self.device)
    }
}

/// Truncate inside the tokenizer so the special tokens survive: long inputs still end in `[SEP]`.
fn with_max_tokens(mut tokenizer: Tokenizer, max_tokens: usize) -> anyhow::Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("configure truncation: {e}"))?;
    Ok(tokenizer)
}

/// Cosine similarity on tensors: row-normalize both sides and take `A · Bᵀ`.
pub fn tensor_cosine_similarity(
    a: &[EmbeddingVector],
    b: &[EmbeddingVector],
    device: &Device,
) -> anyhow::Result<Vec<Vec<f32>>> {
    if a.is_empty() || b.is_empty() {
        return Ok(crate::rank::similarity::cosine_similarity_matrix(a, b)?);
    }

    let a_t = to_matrix(a, device).context("candidate matrix")?;
    let b_t = to_matrix(b, device).context("reference matrix")?;
    let (_, da) = a_t.dims2()?;
    let (_, db) = b_t.dims2()?;
    if da != db {
        bail!("embedding dims differ: {da} vs {db}");
    }

    let a_n = normalize_rows(&a_t)?;
    let b_n = normalize_rows(&b_t)?;
    let sim = a_n.matmul(&b_n.t()?.contiguous()?)?;
    Ok(sim.to_vec2::<f32>()?)
}

fn to_matrix(rows: &[EmbeddingVector], device: &Device) -> anyhow::Result<Tensor> {
    let d = rows[0].len();
    if rows.iter().any(|r| r.len() != d) {
        bail!("rows have inconsistent dimensions");
    }
    Ok(Tensor::from_vec(rows.concat(), (rows.len(), d), device)?)
}

fn normalize_rows(t: &Tensor) -> anyhow::Result<Tensor> {
    let norm = t.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(config::ranking::ZERO_NORM_EPSILON as f64, f64::MAX)?;
    Ok(t.broadcast_div(&norm)?)
}

/// Attention-mask-aware mean pooling.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let mask_expanded = attention_mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(input_embeds.shape())?;

    let sum_embeddings = (input_embeds * &mask_expanded)?.sum(1)?;
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(1e-12, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}
