use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use lme_core::format::format_session;
use lme_core::{Environment, LmeResult};
use lme_index::CorpusIndex;

use super::{into_output, ready, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings};
use crate::args::{positive_or_default, require_i64, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{in_range, invalid_index, ranked, Hit};

/// Keyword occurrence counting, optionally with `read_session`.
pub struct KeywordAdapter {
    settings: RetrievalSettings,
    index: Option<CorpusIndex>,
}

impl KeywordAdapter {
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

        let scored = index.search_keywords(query);
        debug!("keyword search {query:?}: {} hits", scored.len());
        if scored.is_empty() {
            return Ok(format!("No sessions found matching: {query}"));
        }

        let hits: Vec<Hit<'_>> = scored
            .iter()
            .take(top_k)
            .filter_map(|&(doc, _)| index.record(doc))
            .map(|r| Hit {
                score_line: None,
                session: &r.session,
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

    fn read_session(&self, args: &Value) -> ToolResult {
        let index = ready(self.index.as_ref())?;
        let requested = require_i64(args, "session_index")?;
        match in_range(requested, index.len()).and_then(|i| index.record(i)) {
            Some(r) => Ok(format_session(&r.session)),
            None => Ok(invalid_index("session", requested, index.len())),
        }
    }
}

impl MemoryAdapter for KeywordAdapter {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.index = Some(CorpusIndex::build(env, self.settings.index_options()));
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = vec![ToolDescriptor::new(
            "search_memory",
            "Search conversation history using keywords. Returns top matching sessions.",
        )
        .param(ParamSpec::string(
            "query",
            "Search query with keywords to find relevant conversations",
        ))
        .param(
            ParamSpec::integer(
                "top_k",
                &format!(
                    "Number of top sessions to return (default: {})",
                    self.settings.default_top_k
                ),
            )
            .with_default(json!(self.settings.default_top_k)),
        )];

        if self.settings.filesystem_tools {
            tools.push(
                ToolDescriptor::new("read_session", "Read a specific session by index").param(
                    ParamSpec::integer(
                        "session_index",
                        "Index of the session (0 to num_sessions-1)",
                    ),
                ),
            );
        }
        tools
    }

    fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String> {
        let result = match name {
            "search_memory" => self.search_memory(args),
            "read_session" if self.settings.filesystem_tools => self.read_session(args),
            _ => return Ok(unknown_function(name)),
        };
        into_output(result)
    }
}
