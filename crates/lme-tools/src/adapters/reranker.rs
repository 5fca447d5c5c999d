use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use lme_core::{CrossEncoder, Environment, LmeResult};
use lme_index::CorpusIndex;

use super::{into_output, ready, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings};
use crate::args::{positive_or_default, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{ranked, Hit};

/// BM25 recall of `first_stage_k` candidates, reordered by a cross-encoder.
pub struct RerankerAdapter {
    settings: RetrievalSettings,
    encoder: Arc<dyn CrossEncoder>,
    index: Option<CorpusIndex>,
}

impl RerankerAdapter {
    pub fn new(settings: RetrievalSettings, encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            settings,
            encoder,
            index: None,
        }
    }

    fn search_memory(&self, args: &Value) -> ToolResult {
        let index = ready(self.index.as_ref())?;
        let query = require_str(args, "query")?;
        let top_k = positive_or_default(args, "top_k", self.settings.default_top_k)?;

        let mut candidates = index.search_bm25(query);
        candidates.truncate(self.settings.first_stage_k);
        if candidates.is_empty() {
            return Ok(format!("No sessions found matching: {query}"));
        }

        let mut reranked = index.rerank_cross_encoder(query, &candidates, self.encoder.as_ref())?;
        reranked.truncate(top_k);
        debug!(
            "reranked {} candidates, top doc {:?}",
            candidates.len(),
            reranked.first().map(|h| h.doc)
        );

        let hits: Vec<Hit<'_>> = reranked
            .iter()
            .filter_map(|h| {
                index.record(h.doc).map(|r| Hit {
                    score_line: Some(format!(
                        "[BM25: {:.2} | Reranker: {:.3}]",
                        h.first_stage, h.score
                    )),
                    session: &r.session,
                })
            })
            .collect();
        Ok(ranked(
            format!(
                "Found {} BM25 candidates, reranked to top {}:",
                candidates.len(),
                hits.len()
            ),
            &hits,
        ))
    }
}

impl MemoryAdapter for RerankerAdapter {
    fn name(&self) -> &'static str {
        "reranker"
    }

    fn warm_up(&mut self) -> LmeResult<()> {
        self.encoder.score(&[("warm up", "warm up")])?;
        info!("cross-encoder {} ready", self.encoder.model());
        Ok(())
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.index = Some(CorpusIndex::build(env, self.settings.index_options()));
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let k = self.settings.default_top_k;
        vec![ToolDescriptor::new(
            "search_memory",
            "Search conversation history using two-stage retrieval (BM25 + neural reranking). Returns top matching sessions.",
        )
        .param(ParamSpec::string(
            "query",
            "Search query to find relevant conversations",
        ))
        .param(
            ParamSpec::integer(
                "top_k",
                &format!("Number of top sessions to return (default: {k})"),
            )
            .with_default(json!(k)),
        )]
    }

    fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String> {
        match name {
            "search_memory" => into_output(self.search_memory(args)),
            _ => Ok(unknown_function(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::{session, StubEncoder};
    use lme_core::LmeError;

    fn env() -> Arc<Environment> {
        Arc::new(Environment::from_sessions(
            vec![
                session("long", "d", &[("user", "garden garden garden garden garden tomatoes")]),
                session("short", "d", &[("user", "garden")]),
                session("unrelated", "d", &[("user", "x")]),
            ],
            vec![],
        ))
    }

    fn settings(first_stage_k: usize) -> RetrievalSettings {
        RetrievalSettings {
            first_stage_k,
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_two_order_wins() {
        let mut a = RerankerAdapter::new(settings(20), Arc::new(StubEncoder));
        a.set_environment(env()).unwrap();
        let out = a
            .execute_tool("search_memory", &json!({"query": "garden", "top_k": 3}))
            .unwrap();
        assert!(out.starts_with("Found 2 BM25 candidates, reranked to top 2:"));
        // StubEncoder prefers the short session even though BM25 prefers the long one
        let short = out.find("Session ID: short").unwrap();
        let long = out.find("Session ID: long").unwrap();
        assert!(short < long);
        assert!(!out.contains("Session ID: unrelated"));
        assert!(out.contains("| Reranker: "));
    }

    #[test]
    fn test_results_stay_within_first_stage() {
        let mut a = RerankerAdapter::new(settings(1), Arc::new(StubEncoder));
        a.set_environment(env()).unwrap();
        let out = a
            .execute_tool("search_memory", &json!({"query": "garden", "top_k": 3}))
            .unwrap();
        // BM25 keeps only its best candidate, so the encoder never sees "short"
        assert!(out.starts_with("Found 1 BM25 candidates, reranked to top 1:"));
        assert!(!out.contains("Session ID: short"));
    }

    #[test]
    fn test_no_lexical_match() {
        let mut a = RerankerAdapter::new(settings(20), Arc::new(StubEncoder));
        a.set_environment(env()).unwrap();
        assert_eq!(
            a.execute_tool("search_memory", &json!({"query": "zebra"})).unwrap(),
            "No sessions found matching: zebra"
        );
    }

    struct DownEncoder;

    impl CrossEncoder for DownEncoder {
        fn score(&self, _pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>> {
            Err(LmeError::Rerank("connection refused".into()))
        }
        fn model(&self) -> &str {
            "down"
        }
    }

    #[test]
    fn test_encoder_failure_propagates() {
        let mut a = RerankerAdapter::new(settings(20), Arc::new(DownEncoder));
        assert!(a.warm_up().is_err());
        a.set_environment(env()).unwrap();
        let err = a
            .execute_tool("search_memory", &json!({"query": "garden"}))
            .unwrap_err();
        assert!(matches!(err, LmeError::Rerank(_)));
    }
}
