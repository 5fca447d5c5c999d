use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use lme_core::format::format_session;
use lme_core::{Environment, LmeResult};

use super::{into_output, ready_env, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter};
use crate::protocol::{ParamSpec, ToolDescriptor};

/// Upper bound: always returns the sessions known to hold the answer.
#[derive(Default)]
pub struct OracleAdapter {
    env: Option<Arc<Environment>>,
    evidence: Vec<usize>,
}

impl OracleAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn search_memory(&self) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        if self.evidence.is_empty() {
            return Ok("No relevant information found.".into());
        }
        let parts: Vec<String> = self
            .evidence
            .iter()
            .map(|&i| format_session(&env.sessions()[i].session))
            .collect();
        Ok(parts.join("\n\n---\n\n"))
    }
}

impl MemoryAdapter for OracleAdapter {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        let mut evidence = Vec::new();
        for id in env.answer_session_ids() {
            match env.find_session(id) {
                Some((idx, _)) => evidence.push(idx),
                None => warn!("answer session {id} not in environment {}", env.name()),
            }
        }
        debug!("oracle evidence: {evidence:?}");
        self.evidence = evidence;
        self.env = Some(env);
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "search_memory",
            "Search through conversation history to find relevant information",
        )
        .param(ParamSpec::string(
            "query",
            "Search query to find relevant conversations",
        ))]
    }

    fn execute_tool(&self, name: &str, _args: &Value) -> LmeResult<String> {
        match name {
            // The query is ignored.
            "search_memory" => into_output(self.search_memory()),
            _ => Ok(unknown_function(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::{fixture, session};
    use serde_json::json;

    #[test]
    fn test_returns_exactly_the_evidence() {
        let mut oracle = OracleAdapter::new();
        oracle.set_environment(fixture()).unwrap();
        for query in ["password", "completely unrelated", ""] {
            let out = oracle
                .execute_tool("search_memory", &json!({ "query": query }))
                .unwrap();
            assert!(out.starts_with("Session ID: answer_b2\n"));
            assert!(out.contains("User: I changed my wifi password"));
            assert!(!out.contains("answer_a1"));
            assert!(!out.contains("answer_c3"));
        }
    }

    #[test]
    fn test_multiple_evidence_sessions_in_metadata_order() {
        let env = Environment::from_sessions(
            vec![
                session("x", "d", &[("user", "one")]),
                session("y", "d", &[("user", "two")]),
            ],
            vec!["y".into(), "missing".into(), "x".into()],
        );
        let mut oracle = OracleAdapter::new();
        oracle.set_environment(Arc::new(env)).unwrap();
        let out = oracle.execute_tool("search_memory", &json!({})).unwrap();
        let parts: Vec<&str> = out.split("\n\n---\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("Session ID: y"));
        assert!(parts[1].starts_with("Session ID: x"));
    }

    #[test]
    fn test_no_evidence() {
        let env = Environment::from_sessions(vec![session("x", "d", &[])], vec![]);
        let mut oracle = OracleAdapter::new();
        oracle.set_environment(Arc::new(env)).unwrap();
        assert_eq!(
            oracle.execute_tool("search_memory", &json!({"query": "q"})).unwrap(),
            "No relevant information found."
        );
    }

    #[test]
    fn test_switching_environment_drops_old_evidence() {
        let mut oracle = OracleAdapter::new();
        oracle.set_environment(fixture()).unwrap();
        let other = Environment::from_sessions(vec![session("answer_b2", "d", &[])], vec![]);
        oracle.set_environment(Arc::new(other)).unwrap();
        assert_eq!(
            oracle.execute_tool("search_memory", &json!({})).unwrap(),
            "No relevant information found."
        );
    }
}
