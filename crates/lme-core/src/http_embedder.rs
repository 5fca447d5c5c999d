use serde_json::{json, Value};

use crate::embedder::Embedder;
use crate::error::{LmeError, LmeResult};
use crate::http::{post_json, ServiceEndpoint};

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    endpoint: ServiceEndpoint,
    agent: ureq::Agent,
}

impl HttpEmbedder {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        let agent = endpoint.agent();
        Self { endpoint, agent }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> LmeResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| LmeError::Embedding("empty embedding result".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> LmeResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint.url("embeddings");
        let body = json!({
            "model": self.endpoint.model,
            "input": texts,
        });
        let resp = post_json(&self.agent, &self.endpoint, &url, &body).map_err(LmeError::Embedding)?;
        let vectors = parse_embedding_response(&resp)?;
        if vectors.len() != texts.len() {
            return Err(LmeError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }
}

/// Vectors from `data[]`, reordered by each item's `index`.
pub(crate) fn parse_embedding_response(json: &Value) -> LmeResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LmeError::Embedding("response is missing data array".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback);
        let values = item
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LmeError::Embedding("item missing embedding array".into()))?;
        let vector = values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|n| n as f32)
                    .ok_or_else(|| LmeError::Embedding("embedding value must be numeric".into()))
            })
            .collect::<LmeResult<Vec<f32>>>()?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
