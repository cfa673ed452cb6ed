//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`,
//! `config.<env>.toml` and `APP_*` env vars (`__` separates nested keys, so
//! `APP_STORE__PATH` overrides `store.path`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the scraped `*.html` entries.
    pub html_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self { Self { html_dir: "./data".to_string() } }
}

/// Character-based chunking bounds.
///
/// `overlap` characters are repeated at the start of every chunk after the
/// first; `lookback` bounds how far the splitter walks back from `max_size`
/// looking for a sentence terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub overlap: usize,
    pub lookback: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self { Self { min_size: 500, max_size: 1000, overlap: 200, lookback: 500 } }
}

impl ChunkingConfig {
    /// Upper bound for `max_size`; extracted text is capped at the same length.
    pub const MAX_CHUNK_SIZE: usize = crate::html::MAX_TEXT_CHARS;

    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(Error::InvalidConfig("chunking.min_size must be > 0".into()));
        }
        if self.max_size > Self::MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunking.max_size ({}) exceeds {}",
                self.max_size,
                Self::MAX_CHUNK_SIZE
            )));
        }
        if self.min_size > self.max_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.min_size ({}) exceeds chunking.max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.overlap >= self.min_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.min_size ({})",
                self.overlap, self.min_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Pretrained sentence-embedding model identifier, recorded with every row.
    pub model_id: String,
    /// Local directory with `config.json`, `tokenizer.json` and weights.
    pub model_dir: Option<String>,
    pub dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    /// Use the deterministic hashing embedder instead of loading the model.
    pub use_fake: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            model_dir: None,
            dim: 384,
            max_len: 256,
            batch_size: 32,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "./philosophy_vectordb".to_string(), table: "philosophy_entries".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self { Self { default_k: 5, max_k: 20 } }
}

impl Config {
    /// Load `config.toml` + `config.<RUST_ENV>.toml` + `APP_*` from the working directory.
    pub fn load() -> anyhow::Result<Self> { Self::load_from(None) }

    /// Like [`Config::load`], but reads an explicit file instead of `config.toml`.
    /// Relative paths inside an explicit file resolve against its directory.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let base = Figment::from(Serialized::defaults(Config::default()));
        let mut figment = match path {
            Some(p) => base.merge(Toml::file(p)),
            None => base.merge(Toml::file("config.toml")),
        };
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let mut config = Self::from_figment(figment)?;
        if let Some(dir) = path.and_then(Path::parent) {
            config.data.html_dir = resolve_with_base(dir, &config.data.html_dir).to_string_lossy().into_owned();
            config.store.path = resolve_with_base(dir, &config.store.path).to_string_lossy().into_owned();
            if let Some(model_dir) = config.embedding.model_dir.take() {
                config.embedding.model_dir = Some(resolve_with_base(dir, model_dir).to_string_lossy().into_owned());
            }
        }
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be > 0".into()));
        }
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return Err(Error::InvalidConfig(format!(
                "search.default_k ({}) must be within 1..={}",
                self.search.default_k, self.search.max_k
            )));
        }
        if self.store.table.trim().is_empty() {
            return Err(Error::InvalidConfig("store.table must not be empty".into()));
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf { expand_path(&self.store.path) }

    pub fn html_dir(&self) -> PathBuf { expand_path(&self.data.html_dir) }

    pub fn model_dir(&self) -> Option<PathBuf> { self.embedding.model_dir.as_deref().map(expand_path) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
