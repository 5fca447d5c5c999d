use serde_json::{json, Value};

use crate::cross_encoder::CrossEncoder;
use crate::error::{LmeError, LmeResult};
use crate::http::{post_json, ServiceEndpoint};

/// Client for a `/rerank` endpoint taking `{model, query, documents}`.
pub struct HttpReranker {
    endpoint: ServiceEndpoint,
    agent: ureq::Agent,
}

impl HttpReranker {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        let agent = endpoint.agent();
        Self { endpoint, agent }
    }

    fn rerank(&self, query: &str, docs: &[&str]) -> LmeResult<Vec<f32>> {
        let url = self.endpoint.url("rerank");
        let body = json!({
            "model": self.endpoint.model,
            "query": query,
            "documents": docs,
        });
        let resp = post_json(&self.agent, &self.endpoint, &url, &body).map_err(LmeError::Rerank)?;
        parse_rerank_response(&resp, docs.len())
    }
}

impl CrossEncoder for HttpReranker {
    /// Consecutive pairs sharing a query go out as one request.
    fn score(&self, pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());
        let mut start = 0;
        while start < pairs.len() {
            let query = pairs[start].0;
            let end = pairs[start..]
                .iter()
                .position(|(q, _)| *q != query)
                .map_or(pairs.len(), |p| start + p);
            let docs: Vec<&str> = pairs[start..end].iter().map(|(_, d)| *d).collect();
            scores.extend(self.rerank(query, &docs)?);
            start = end;
        }
        Ok(scores)
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }
}

/// Scores aligned to document order. Documents missing from the response
/// score 0.
pub(crate) fn parse_rerank_response(json: &Value, doc_count: usize) -> LmeResult<Vec<f32>> {
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| LmeError::Rerank("response is missing results array".into()))?;

    let mut scores = vec![0.0f32; doc_count];
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| LmeError::Rerank("result missing index".into()))? as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| LmeError::Rerank("result missing score".into()))? as f32;
        if index < doc_count {
            scores[index] = score;
        }
    }
    Ok(scores)
}
