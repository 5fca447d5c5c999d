use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use lme_core::{Environment, LmeResult};
use lme_index::CorpusIndex;

use super::{into_output, ready, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings};
use crate::args::{positive_or_default, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{ranked, Hit};

pub struct Bm25Adapter {
    settings: RetrievalSettings,
    index: Option<CorpusIndex>,
}

impl Bm25Adapter {
    pub fn new(settings: RetrievalSettings) -> Self {
        Self {
            settings,
            index: None,
        }
    }

    fn search_memory(&self, args: &Value) -> ToolResult {
        let index = ready(self.index.as_ref())?;
        let query = require_str(args, "query")?;
        let top_k = positive_or_default(args, "top_k", self.settings.default_top_k)?;

        let scored = index.search_bm25(query);
        debug!("bm25 {query:?}: {} non-zero", scored.len());
        if scored.is_empty() {
            return Ok(format!("No sessions found matching: {query}"));
        }

        let hits: Vec<Hit<'_>> = scored
            .iter()
            .take(top_k)
            .filter_map(|&(doc, score)| {
                index.record(doc).map(|r| Hit {
                    score_line: Some(format!("[BM25 Score: {score:.2}]")),
                    session: &r.session,
                })
            })
            .collect();
        Ok(ranked(
            format!(
                "Found {} matching session(s). Showing top {}:",
                scored.len(),
                hits.len()
            ),
            &hits,
        ))
    }
}

impl MemoryAdapter for Bm25Adapter {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.index = Some(CorpusIndex::build(env, self.settings.index_options()));
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let k = self.settings.default_top_k;
        vec![ToolDescriptor::new(
            "search_memory",
            "Search conversation history using BM25 ranking. Returns top matching sessions.",
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
