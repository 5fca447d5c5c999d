use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use lme_core::{Embedder, Environment, LmeResult};
use lme_index::CorpusIndex;

use super::{into_output, ready, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings};
use crate::args::{positive_or_default, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{ranked, Hit};

/// Keyword recall, then dense reranking of the candidates when there are
/// more of them than requested.
pub struct HybridAdapter {
    settings: RetrievalSettings,
    embedder: Arc<dyn Embedder>,
    index: Option<CorpusIndex>,
}

impl HybridAdapter {
    pub fn new(settings: RetrievalSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            settings,
            embedder,
            index: None,
        }
    }

    fn search_memory(&self, args: &Value) -> ToolResult {
        let index = ready(self.index.as_ref())?;
        let query = require_str(args, "query")?;
        let top_k = positive_or_default(args, "top_k", self.settings.default_top_k)?;

        let matched = index.search_keywords(query);
        if matched.is_empty() {
            return Ok(format!("No sessions found matching: {query}"));
        }
        let candidates: Vec<usize> = matched
            .iter()
            .take(self.settings.hybrid_candidates)
            .map(|&(doc, _)| doc)
            .collect();

        let chosen: Vec<usize> = if candidates.len() > top_k {
            debug!("hybrid rerank of {} candidates", candidates.len());
            index
                .rerank_dense(query, &candidates, self.embedder.as_ref())?
                .into_iter()
                .take(top_k)
                .map(|(doc, _)| doc)
                .collect()
        } else {
            candidates
        };

        let hits: Vec<Hit<'_>> = chosen
            .iter()
            .filter_map(|&doc| index.record(doc))
            .map(|r| Hit {
                score_line: None,
                session: &r.session,
            })
            .collect();
        Ok(ranked(
            format!(
                "Found {} matching session(s). Showing top {} (hybrid ranked):",
                matched.len(),
                hits.len()
            ),
            &hits,
        ))
    }
}

impl MemoryAdapter for HybridAdapter {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn warm_up(&mut self) -> LmeResult<()> {
        self.embedder.embed("warm up")?;
        info!("hybrid embedder {} ready", self.embedder.model());
        Ok(())
    }

    /// Only the lexical index is built; candidates are embedded per query.
    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.index = Some(CorpusIndex::build(env, self.settings.index_options()));
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let k = self.settings.default_top_k;
        vec![ToolDescriptor::new(
            "search_memory",
            "Search conversation history using hybrid keyword + semantic reranking. Returns top matching sessions.",
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
