use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use lme_core::{Embedder, Environment, LmeResult};
use lme_index::CorpusIndex;

use super::{into_output, ready, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings, BGE_QUERY_INSTRUCTION};
use crate::args::{positive_or_default, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{ranked, Hit};

/// Model-specific behaviour of a dense adapter.
#[derive(Debug, Clone)]
pub struct DensePreset {
    pub name: &'static str,
    /// Prepended to queries only; documents are embedded as-is.
    pub query_prefix: Option<String>,
}

impl DensePreset {
    pub fn stella() -> Self {
        Self {
            name: "stella",
            query_prefix: None,
        }
    }

    pub fn bge(instruction: Option<String>) -> Self {
        Self {
            name: "bge",
            query_prefix: Some(instruction.unwrap_or_else(|| BGE_QUERY_INSTRUCTION.into())),
        }
    }
}

pub struct DenseAdapter {
    preset: DensePreset,
    settings: RetrievalSettings,
    embedder: Arc<dyn Embedder>,
    index: Option<CorpusIndex>,
}

impl DenseAdapter {
    pub fn new(preset: DensePreset, settings: RetrievalSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            preset,
            settings,
            embedder,
            index: None,
        }
    }

    fn search_memory(&self, args: &Value) -> ToolResult {
        let index = ready(self.index.as_ref())?;
        let query = require_str(args, "query")?;
        let top_k = positive_or_default(args, "top_k", self.settings.default_top_k)?;

        let text = match &self.preset.query_prefix {
            Some(prefix) => format!("{prefix}{query}"),
            None => query.to_string(),
        };
        let scored = index.search_dense(self.embedder.embed(&text)?)?;
        debug!("{} {query:?}: best {:?}", self.preset.name, scored.first());

        let hits: Vec<Hit<'_>> = scored
            .iter()
            .take(top_k)
            .filter_map(|&(doc, sim)| {
                index.record(doc).map(|r| Hit {
                    score_line: Some(format!("[Similarity: {sim:.3}]")),
                    session: &r.session,
                })
            })
            .collect();
        Ok(ranked(
            format!("Found top {} semantically similar session(s):", hits.len()),
            &hits,
        ))
    }
}

impl MemoryAdapter for DenseAdapter {
    fn name(&self) -> &'static str {
        self.preset.name
    }

    fn warm_up(&mut self) -> LmeResult<()> {
        let sample = self.embedder.embed("warm up")?;
        info!(
            "{} embedder {} ready ({} dimensions)",
            self.preset.name,
            self.embedder.model(),
            sample.len()
        );
        Ok(())
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.index = None;
        self.index = Some(CorpusIndex::build_with_embeddings(
            env,
            self.settings.index_options(),
            self.embedder.as_ref(),
        )?);
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let k = self.settings.default_top_k;
        vec![ToolDescriptor::new(
            "search_memory",
            "Search conversation history using semantic similarity. Returns top matching sessions.",
        )
        .param(ParamSpec::string(
            "query",
            "Search query to find semantically relevant conversations",
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
