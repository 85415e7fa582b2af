// embeddings/ — Text embedding providers.
//
// Provides:
// - A local sentence embedding engine using candle (pure Rust)
// - A remote, batched OpenAI-compatible embedding client
// - Model download + cache verification
// - Text preparation for paper abstracts
// - Provider selection with logged fallback to the local engine

pub mod download;
pub mod engine;
pub mod remote;
pub mod text_prep;

use crate::config;
use crate::rank::similarity;

/// One vector per text, all of the provider's dimension.
pub type EmbeddingVector = Vec<f32>;

/// Something that turns text into fixed-dimension vectors.
pub trait EmbeddingProvider {
    fn model_name(&self) -> &str;

    /// Encode `texts`, returning exactly one vector per text in input order.
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>>;

    /// Cosine similarity matrix `[a.len(), b.len()]`. Backends with a faster native
    /// routine override this.
    fn similarity(&self, a: &[EmbeddingVector], b: &[EmbeddingVector]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(similarity::cosine_similarity_matrix(a, b)?)
    }
}

/// Caller-supplied provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub use_remote_provider: bool,
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub remote_model_name: String,
    pub local_model_name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            use_remote_provider: false,
            api_key: None,
            api_base_url: config::remote::DEFAULT_API_BASE.to_string(),
            remote_model_name: config::remote::DEFAULT_API_MODEL.to_string(),
            local_model_name: config::embedding::DEFAULT_LOCAL_MODEL.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Apply overrides from an environment-like lookup. Empty values count as unset.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(config::env::USE_EMBEDDING_API) {
            match parse_bool(&v) {
                Some(true) => {
                    self.use_remote_provider = true;
                    log::info!("Embedding API enabled via {}", config::env::USE_EMBEDDING_API);
                }
                Some(false) => {
                    self.use_remote_provider = false;
                    log::info!("Embedding API disabled via {}", config::env::USE_EMBEDDING_API);
                }
                None => log::warn!("Ignoring unrecognized {}={:?}", config::env::USE_EMBEDDING_API, v),
            }
        }

        if self.use_remote_provider && !has_key(&self.api_key) {
            if let Some(key) = get(config::env::EMBEDDING_API_KEY) {
                log::info!("Using embedding API key from {}", config::env::EMBEDDING_API_KEY);
                self.api_key = Some(key);
            }
        }

        if let Some(base) = get(config::env::EMBEDDING_API_BASE) {
            log::info!("Using embedding API base from environment: {}", base);
            self.api_base_url = base;
        }

        if let Some(model) = get(config::env::EMBEDDING_MODEL) {
            log::info!("Using embedding model from environment: {}", model);
            self.remote_model_name = model;
        }

        if let Some(model) = get(config::env::LOCAL_VECTORIZATION_MODEL) {
            log::info!("Using local vectorization model from environment: {}", model);
            self.local_model_name = model;
        }

        self
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn has_key(key: &Option<String>) -> bool {
    key.as_deref().map(|k| !k.trim().is_empty()).unwrap_or(false)
}

/// Which backend a config resolves to, before anything is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Local {
        model_name: String,
    },
    Remote {
        api_key: String,
        api_base_url: String,
        model_name: String,
    },
}

/// Decide the backend. A remote request without a usable key resolves to local.
pub fn resolve_backend(cfg: &ProviderConfig) -> Backend {
    let local = Backend::Local {
        model_name: cfg.local_model_name.clone(),
    };

    if !cfg.use_remote_provider {
        return local;
    }

    match cfg.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => Backend::Remote {
            api_key: key.to_string(),
            api_base_url: cfg.api_base_url.clone(),
            model_name: cfg.remote_model_name.clone(),
        },
        None => {
            log::warn!(
                "Embedding API selected but no API key provided, falling back to local model {}",
                cfg.local_model_name
            );
            local
        }
    }
}

/// Construct the configured provider. Remote construction failures fall back to the
/// local engine; a local failure is returned to the caller.
pub fn select_provider(cfg: &ProviderConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match resolve_backend(cfg) {
        Backend::Local { model_name } => load_local(&model_name),
        Backend::Remote {
            api_key,
            api_base_url,
            model_name,
        } => {
            log::info!("Initializing API embedding provider with model '{}' at '{}'", model_name, api_base_url);
            match remote::RemoteEmbeddingProvider::new(&api_key, &model_name, &api_base_url) {
                Ok(p) => Ok(Box::new(p)),
                Err(e) => {
                    log::error!(
                        "Failed to initialize API embedding provider: {}. Falling back to local model {}",
                        e,
                        cfg.local_model_name
                    );
                    load_local(&cfg.local_model_name)
                }
            }
        }
    }
}

fn load_local(model_name: &str) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    log::info!("Using local embedding provider with model: {}", model_name);
    Ok(Box::new(engine::LocalEmbeddingProvider::load(model_name)?))
}
