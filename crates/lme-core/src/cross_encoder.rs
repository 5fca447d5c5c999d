use crate::error::LmeResult;

/// Joint (query, document) relevance scoring. Returns one score per pair, in
/// pair order.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>>;
    fn model(&self) -> &str;
}
