// IMPORTANT:
// Keep ALL numeric values and defaults centralized here (no hardcoded values scattered around).

// NOTE: VERSION must stay in sync with the `version` field in Cargo.toml.
pub const VERSION: &str = "0.1.0";

pub mod logging {
    pub const LOG_DIR_REL: &str = ".paper-rank/logs";
    pub const LOG_FILE_NAME: &str = "paper_rank.log";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod embedding {
    pub const DEFAULT_LOCAL_MODEL: &str = "avsolatorio/GIST-small-Embedding-v0";

    // Upper bound on word-piece tokens fed to the local model. The effective limit is
    // min(MAX_TOKENS, max_position_embeddings) from the model's config.json.
    pub const MAX_TOKENS: usize = 512;

    // Abstracts rarely exceed this; anything longer would be cut by MAX_TOKENS anyway.
    pub const MAX_INPUT_WORDS: usize = 400;

    // Model files are fetched from the Hugging Face hub on first use.
    pub const HUB_BASE_URL: &str = "https://huggingface.co";
    pub const HUB_REVISION: &str = "main";
    pub const MODEL_CACHE_DIR_REL: &str = ".cache/paper-rank/models";

    pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];
    pub const POOLING_CONFIG_FILE: &str = "1_Pooling/config.json";

    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 120;
}

pub mod remote {
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
    pub const DEFAULT_API_MODEL: &str = "text-embedding-3-small";

    // Texts per network call (request-size limits on hosted APIs).
    pub const BATCH_SIZE: usize = 20;

    // Dimension of the zero vectors substituted when the API is unreachable.
    pub const FALLBACK_DIMS: usize = 1024;

    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
}

pub mod ranking {
    // Display-range scale. Star bands in `stars` are keyed to it; do not change one without the other.
    pub const SCORE_SCALE: f64 = 10.0;

    // Norm substituted for all-zero rows so cosine similarity stays defined (0, not NaN).
    pub const ZERO_NORM_EPSILON: f32 = 1e-10;
}

pub mod stars {
    // Empirical score quantiles: 20th percentile and 90th percentile.
    pub const LOW: f64 = 4.4927;
    pub const HIGH: f64 = 5.0467;
    pub const MAX_STARS: u8 = 5;
}

pub mod digest {
    pub const DEFAULT_MAX_PAPERS: i64 = 100;
    // Passing this as max papers disables truncation.
    pub const UNLIMITED: i64 = -1;
}

pub mod env {
    pub const USE_EMBEDDING_API: &str = "USE_EMBEDDING_API";
    pub const EMBEDDING_API_KEY: &str = "EMBEDDING_API_KEY";
    pub const EMBEDDING_API_BASE: &str = "EMBEDDING_API_BASE";
    pub const EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
    pub const LOCAL_VECTORIZATION_MODEL: &str = "LOCAL_VECTORIZATION_MODEL";
    pub const MAX_PAPER_NUM: &str = "MAX_PAPER_NUM";
}
