use crate::error::LmeResult;

/// Dense embedding service. Vectors come back in input order; callers
/// normalize them before scoring.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> LmeResult<Vec<f32>>;
    fn embed_batch(&self, texts: &[&str]) -> LmeResult<Vec<Vec<f32>>>;
    fn model(&self) -> &str;
}
