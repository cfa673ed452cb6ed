use crate::types::{EntryContent, EntrySummary, SearchResult, StoreStats};

/// Sentence-embedding model. Implementations must be deterministic and
/// return L2-normalized vectors of length `dim()`.
pub trait Embedder: Send + Sync {
    /// Identifier stored next to every vector (e.g. the model id).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Read-side contract served to tool-invocation hosts.
#[async_trait::async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, query: &str, k: usize, entry_filter: Option<&str>) -> crate::error::Result<Vec<SearchResult>>;
    async fn stats(&self) -> crate::error::Result<StoreStats>;
    async fn list(&self, limit: usize) -> crate::error::Result<Vec<EntrySummary>>;
    async fn get_entry(&self, entry_name: &str) -> crate::error::Result<Option<EntryContent>>;
    /// Default `k` when a caller omits it.
    fn default_k(&self) -> usize;
}
