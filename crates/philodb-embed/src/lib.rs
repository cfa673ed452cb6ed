use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use philodb_core::config::EmbeddingConfig;
pub use philodb_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::{tokenize_batch, BatchInputs};

/// Model id recorded for vectors produced by [`FakeEmbedder`].
pub const FAKE_MODEL_ID: &str = "fake-hash-embedder";

/// BERT-family sentence encoder (all-MiniLM-L6-v2 by default): mean pooling
/// over the last hidden state, L2-normalized.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl BertEmbedder {
    /// Load `config.json`, `tokenizer.json` and `model.safetensors` (or
    /// `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, cfg: &EmbeddingConfig) -> Result<Self> {
        let started = Instant::now();
        let device = select_device();
        info!(model = %cfg.model_id, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
        if hidden_size != cfg.dim {
            bail!("model hidden size {} does not match embedding.dim {}", hidden_size, cfg.dim);
        }
        let config: BertConfig = serde_json::from_str(&raw_config)?;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            let weights = candle_core::pickle::read_all(&weights_path)
                .with_context(|| format!("reading {}", weights_path.display()))?;
            VarBuilder::from_tensors(weights.into_iter().collect(), DType::F32, &device)
        };
        let model = BertModel::load(vb, &config)?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");

        Ok(Self { model, tokenizer, device, model_id: cfg.model_id.clone(), dim: cfg.dim, max_len: cfg.max_len, pad_id })
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let inputs = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let hidden = self.model.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &inputs.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if rows.iter().any(|r| r.len() != self.dim) {
            bail!("model produced vectors of unexpected dimension (expected {})", self.dim);
        }
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(rows)
    }
}

/// Deterministic bag-of-words hashing embedder for tests and offline runs.
/// Each lowercase alphanumeric token adds a signed unit to one hashed bucket.
pub struct FakeEmbedder {
    dim: usize,
    max_len: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, max_len: 256 } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += if h >> 63 == 1 { 1.0 } else { -1.0 };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { FAKE_MODEL_ID }

    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `embedding.use_fake`) selects the hashing
/// embedder; otherwise the model is loaded from `model_dir`.
pub fn get_default_embedder(cfg: &EmbeddingConfig, model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings(cfg) {
        info!(dim = cfg.dim, "using fake embedder");
        return Ok(Box::new(FakeEmbedder::new(cfg.dim)));
    }
    let dir = resolve_model_dir(model_dir)?;
    Ok(Box::new(BertEmbedder::load(&dir, cfg)?))
}

pub fn use_fake_embeddings(cfg: &EmbeddingConfig) -> bool {
    let from_env = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    cfg.use_fake || from_env
}

fn resolve_model_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() { return Ok(p.to_path_buf()); }
        warn!(dir = %p.display(), "configured model dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                debug!(var, dir = %p.display(), "model dir from env");
                return Ok(p);
            }
        }
    }
    let local = Path::new("models/all-MiniLM-L6-v2");
    if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate the embedding model directory; set embedding.model_dir or APP_MODEL_DIR"))
}
