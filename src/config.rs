use crate::chunking::ChunkSettings;
use crate::extraction::{ExtractionMode, ExtractionSettings, Rasterizer, RemoteOcrSettings};
use crate::gate::ValiditySettings;
use crate::ingest::IngestSettings;
use crate::quality::ScriptProfile;
use crate::retrieval::RetrievalSettings;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion and retrieval services.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for JSONL artifacts and the lexical index.
    pub data_dir: PathBuf,
    /// Base URL of the Qdrant instance; vector indexing is disabled when unset.
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection holding chunk vectors.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the stored vectors.
    pub embedding_dimension: usize,
    /// Base URL for OpenAI-compatible embedding APIs.
    pub embedding_api_base: Option<String>,
    /// Bearer token for OpenAI-compatible embedding APIs.
    pub embedding_api_key: Option<String>,
    /// Number of texts sent to the embedding provider per request.
    pub embed_batch: usize,
    /// Base URL of the Ollama runtime used for embeddings and generation.
    pub ollama_url: Option<String>,
    /// Provider used to generate answers from packed contexts.
    pub generation_provider: GenerationProvider,
    /// Model identifier used for answer generation.
    pub generation_model: String,
    /// Default OCR language code for the local engine.
    pub ocr_lang: String,
    /// Rasterization resolution for OCR.
    pub ocr_dpi: u32,
    /// Upper bound on a single OCR subprocess or remote call.
    pub ocr_timeout_secs: u64,
    /// Number of leading native characters inspected to pick the OCR language.
    pub ocr_preview_chars: usize,
    /// Latin ratio at which the OCR language hint is widened to a mixed-script mode.
    pub ocr_latin_threshold: f32,
    /// Similarity above which the remote OCR output is preferred.
    pub ocr_similarity_threshold: f32,
    /// Whole-document native quality below which one OCR pass re-verifies the text.
    pub ocr_reverify_below: f32,
    /// Path or name of the tesseract executable.
    pub tesseract_path: String,
    /// Path or name of the pdftoppm executable.
    pub pdftoppm_path: String,
    /// Whether the local OCR engine is available.
    pub local_ocr_enable: bool,
    /// Whether the remote OCR engine is enabled.
    pub remote_ocr_enable: bool,
    /// Base URL of the remote OCR service.
    pub remote_ocr_base: Option<String>,
    /// API key for the remote OCR service.
    pub remote_ocr_api_key: Option<String>,
    /// Model identifier requested from the remote OCR service.
    pub remote_ocr_model: String,
    /// Per-page or whole-document extraction.
    pub extraction_mode: ExtractionMode,
    /// Native text quality below which a page escalates to OCR.
    pub min_quality_score: f32,
    /// Native text length below which a page escalates to OCR.
    pub min_length: usize,
    /// Chunk token budget.
    pub chunk_max_tokens: usize,
    /// Fraction of a flushed chunk carried into the next one.
    pub chunk_overlap_ratio: f32,
    /// Characters per estimated token.
    pub chars_per_token: f32,
    /// Owner label stamped on every chunk.
    pub chunk_owner: String,
    /// Sensitivity label stamped on every chunk.
    pub chunk_sensitivity: String,
    /// Minimum chunk length accepted by the flagging gate.
    pub valid_min_length: usize,
    /// Minimum quality score accepted by the flagging gate.
    pub valid_min_score: f32,
    /// ISO 639-3 languages accepted by the flagging gate.
    pub valid_languages: Vec<String>,
    /// Index flagged chunks alongside accepted ones.
    pub index_flagged: bool,
    /// Page quality required to keep a reprocessed page.
    pub reprocess_min_quality: f32,
    /// Optional JSON file overriding the paragraph pattern sets.
    pub segment_patterns_file: Option<PathBuf>,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f64,
    /// Candidates requested from the vector index.
    pub k_vector: usize,
    /// Candidates requested from the lexical index.
    pub k_lexical: usize,
    /// Fused candidates kept after ranking.
    pub max_contexts: usize,
    /// Token budget of the packed answer context.
    pub token_budget: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic hashing embedder, no external service.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported answer generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationProvider {
    /// Generation disabled; queries return prompts only.
    None,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(load_env_optional)
    }

    /// Load configuration from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            qdrant_url: get("QDRANT_URL"),
            qdrant_collection_name: get("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "documents".into()),
            qdrant_api_key: get("QDRANT_API_KEY"),
            embedding_provider: parse_or(get("EMBEDDING_PROVIDER"), "EMBEDDING_PROVIDER", EmbeddingProvider::Hashing)?,
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_else(|| "bge-m3".into()),
            embedding_dimension: parse_or(get("EMBEDDING_DIMENSION"), "EMBEDDING_DIMENSION", 1024)?,
            embedding_api_base: get("EMBEDDING_API_BASE"),
            embedding_api_key: get("EMBEDDING_API_KEY"),
            embed_batch: parse_or(get("EMBED_BATCH"), "EMBED_BATCH", 32)?,
            ollama_url: get("OLLAMA_URL"),
            generation_provider: parse_or(get("GENERATION_PROVIDER"), "GENERATION_PROVIDER", GenerationProvider::None)?,
            generation_model: get("GENERATION_MODEL").unwrap_or_else(|| "llama3.1".into()),
            ocr_lang: get("OCR_LANG").unwrap_or_else(|| "tha".into()),
            ocr_dpi: parse_or(get("OCR_DPI"), "OCR_DPI", 450)?,
            ocr_timeout_secs: parse_or(get("OCR_TIMEOUT_SECS"), "OCR_TIMEOUT_SECS", 120)?,
            ocr_preview_chars: parse_or(get("OCR_PREVIEW_CHARS"), "OCR_PREVIEW_CHARS", 2000)?,
            ocr_latin_threshold: parse_or(get("OCR_LATIN_THRESHOLD"), "OCR_LATIN_THRESHOLD", 0.15)?,
            ocr_similarity_threshold: parse_or(get("OCR_SIMILARITY_THRESHOLD"), "OCR_SIMILARITY_THRESHOLD", 0.60)?,
            ocr_reverify_below: parse_or(get("OCR_REVERIFY_BELOW"), "OCR_REVERIFY_BELOW", 0.1)?,
            tesseract_path: get("TESSERACT_PATH").unwrap_or_else(|| "tesseract".into()),
            pdftoppm_path: get("PDFTOPPM_PATH").unwrap_or_else(|| "pdftoppm".into()),
            local_ocr_enable: parse_flag(get("LOCAL_OCR_ENABLE"), true),
            remote_ocr_enable: parse_flag(get("REMOTE_OCR_ENABLE"), false),
            remote_ocr_base: get("REMOTE_OCR_BASE"),
            remote_ocr_api_key: get("REMOTE_OCR_API_KEY"),
            remote_ocr_model: get("REMOTE_OCR_MODEL").unwrap_or_else(|| "typhoon-ocr".into()),
            extraction_mode: parse_or(get("EXTRACTION_MODE"), "EXTRACTION_MODE", ExtractionMode::Page)?,
            min_quality_score: parse_or(get("MIN_QUALITY_SCORE"), "MIN_QUALITY_SCORE", 0.2)?,
            min_length: parse_or(get("MIN_LENGTH"), "MIN_LENGTH", 50)?,
            chunk_max_tokens: parse_or(get("CHUNK_MAX_TOKENS"), "CHUNK_MAX_TOKENS", 800)?,
            chunk_overlap_ratio: parse_or(get("CHUNK_OVERLAP_RATIO"), "CHUNK_OVERLAP_RATIO", 0.12)?,
            chars_per_token: parse_or(get("CHAR_PER_TOKEN"), "CHAR_PER_TOKEN", 4.0)?,
            chunk_owner: get("CHUNK_OWNER").unwrap_or_else(|| "owner:unknown".into()),
            chunk_sensitivity: get("CHUNK_SENSITIVITY").unwrap_or_else(|| "internal".into()),
            valid_min_length: parse_or(get("VALID_MIN_LENGTH"), "VALID_MIN_LENGTH", 30)?,
            valid_min_score: parse_or(get("VALID_MIN_SCORE"), "VALID_MIN_SCORE", 0.7)?,
            valid_languages: get("VALID_LANGUAGES")
                .map(|value| parse_list(&value))
                .unwrap_or_else(|| vec!["tha".into(), "eng".into()]),
            index_flagged: parse_flag(get("INDEX_FLAGGED"), false),
            reprocess_min_quality: parse_or(get("REPROCESS_MIN_QUALITY"), "REPROCESS_MIN_QUALITY", 0.3)?,
            segment_patterns_file: get("SEGMENT_PATTERNS_FILE").map(PathBuf::from),
            rrf_k: parse_or(get("RRF_K"), "RRF_K", 60.0)?,
            k_vector: parse_or(get("K_VECTOR"), "K_VECTOR", 20)?,
            k_lexical: parse_or(get("K_LEXICAL"), "K_LEXICAL", 30)?,
            max_contexts: parse_or(get("MAX_CONTEXTS"), "MAX_CONTEXTS", 8)?,
            token_budget: parse_or(get("TOKEN_BUDGET"), "TOKEN_BUDGET", 1200)?,
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_max_tokens == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_MAX_TOKENS".into()));
        }
        if !(self.chars_per_token > 0.0) {
            return Err(ConfigError::InvalidValue("CHAR_PER_TOKEN".into()));
        }
        if !(0.0..1.0).contains(&self.chunk_overlap_ratio) {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP_RATIO".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embed_batch == 0 {
            return Err(ConfigError::InvalidValue("EMBED_BATCH".into()));
        }
        Ok(())
    }

    /// Script profile for the configured target writing system.
    pub fn script_profile(&self) -> ScriptProfile {
        ScriptProfile::thai(&self.ocr_lang)
    }

    /// Settings for the page extractor.
    pub fn extraction_settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            min_length: self.min_length,
            min_quality_score: self.min_quality_score,
            similarity_threshold: self.ocr_similarity_threshold,
            reverify_below: self.ocr_reverify_below,
            latin_threshold: self.ocr_latin_threshold,
            preview_chars: self.ocr_preview_chars,
            mode: self.extraction_mode,
            script: self.script_profile(),
        }
    }

    /// Page rasterizer shared by the OCR engines.
    pub fn rasterizer(&self) -> Rasterizer {
        Rasterizer::new(&self.pdftoppm_path, self.ocr_dpi, self.ocr_timeout())
    }

    /// Remote OCR settings, present only when the engine is enabled and addressable.
    pub fn remote_ocr_settings(&self) -> Option<RemoteOcrSettings> {
        if !self.remote_ocr_enable {
            return None;
        }
        let base_url = self.remote_ocr_base.clone()?;
        Some(RemoteOcrSettings {
            base_url,
            api_key: self.remote_ocr_api_key.clone(),
            model: self.remote_ocr_model.clone(),
            timeout: self.ocr_timeout(),
        })
    }

    /// Settings for the chunk assembler.
    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            max_tokens: self.chunk_max_tokens,
            overlap_ratio: self.chunk_overlap_ratio,
            chars_per_token: self.chars_per_token,
            owner: self.chunk_owner.clone(),
            sensitivity: self.chunk_sensitivity.clone(),
        }
    }

    /// Settings for the flagging gate.
    pub fn validity_settings(&self) -> ValiditySettings {
        ValiditySettings {
            min_length: self.valid_min_length,
            min_score: self.valid_min_score,
            accepted_languages: self.valid_languages.clone(),
        }
    }

    /// Settings for hybrid retrieval and context packing.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            k_vector: self.k_vector,
            k_lexical: self.k_lexical,
            rrf_k: self.rrf_k,
            max_contexts: self.max_contexts,
            token_budget: self.token_budget,
            chars_per_token: self.chars_per_token,
        }
    }

    /// Settings for ingestion runs.
    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            data_dir: self.data_dir.clone(),
            index_flagged: self.index_flagged,
            embedding_dimension: self.embedding_dimension,
            embed_batch: self.embed_batch,
            reprocess_min_quality: self.reprocess_min_quality,
        }
    }

    fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs.max(1))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|raw| raw.trim().to_lowercase()) {
        Some(raw) => matches!(raw.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "local" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> &'static Config {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        qdrant_url = ?config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        remote_ocr = config.remote_ocr_enable,
        "Loaded configuration"
    );
    CONFIG.get_or_init(|| config)
}
