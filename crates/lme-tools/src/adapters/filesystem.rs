use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use lme_core::format::format_session;
use lme_core::{Environment, LmeResult};

use super::{into_output, ready_env, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, NO_SESSIONS};
use crate::args::{require_i64, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{in_range, invalid_index, listing_line};

/// Direct browsing: list, read by index, and substring search over the raw
/// session files. No ranking.
#[derive(Default)]
pub struct FilesystemAdapter {
    env: Option<Arc<Environment>>,
}

impl FilesystemAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_sessions(&self) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        if env.is_empty() {
            return Ok(NO_SESSIONS.into());
        }
        let mut lines = vec!["Available sessions:".to_string(), String::new()];
        lines.extend(
            env.sessions()
                .iter()
                .enumerate()
                .map(|(i, r)| listing_line(i, &r.session)),
        );
        Ok(lines.join("\n"))
    }

    fn read_session(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let index = require_i64(args, "session_index")?;
        let Some(i) = in_range(index, env.len()) else {
            return Ok(invalid_index("session", index, env.len()));
        };
        Ok(format_session(&env.sessions()[i].session))
    }

    fn search_sessions(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let keywords = require_str(args, "keywords")?;
        let needle = keywords.to_lowercase();

        let matching: Vec<String> = env
            .sessions()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.raw.to_lowercase().contains(&needle))
            .map(|(i, r)| format!("[{i}] {} - {}", r.session.date, r.session.session_id))
            .collect();
        debug!("search_sessions {keywords:?}: {} hits", matching.len());

        if matching.is_empty() {
            return Ok(format!("No sessions found containing: {keywords}"));
        }
        let mut lines = vec![
            format!(
                "Found {} session(s) containing '{keywords}':",
                matching.len()
            ),
            String::new(),
        ];
        lines.extend(matching);
        lines.push(String::new());
        lines.push("Use read_session(index) to view full content.".into());
        Ok(lines.join("\n"))
    }
}

impl MemoryAdapter for FilesystemAdapter {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.env = Some(env);
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "list_sessions",
                "List all conversation sessions with metadata (date, session_id)",
            ),
            ToolDescriptor::new(
                "read_session",
                "Read the full content of a specific conversation session",
            )
            .param(ParamSpec::integer(
                "session_index",
                "Index of the session to read (from list_sessions)",
            )),
            ToolDescriptor::new(
                "search_sessions",
                "Search for sessions containing specific keywords",
            )
            .param(ParamSpec::string(
                "keywords",
                "Keywords to search for in session content",
            )),
        ]
    }

    fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String> {
        let result = match name {
            "list_sessions" => self.list_sessions(),
            "read_session" => self.read_session(args),
            "search_sessions" => self.search_sessions(args),
            _ => return Ok(unknown_function(name)),
        };
        into_output(result)
    }
}
