//! Session browsing shaped like a filesystem server: directory listing, file
//! reads, glob search over names and grep over contents.

use std::sync::Arc;

use glob::Pattern;
use serde_json::{json, Value};
use tracing::debug;

use lme_core::format::{format_file, snippet_around, truncate_chars};
use lme_core::{Environment, LmeResult};

use super::{into_output, ready_env, ToolResult};
use crate::adapter::{unknown_function, MemoryAdapter, RetrievalSettings};
use crate::args::{positive_or_default, require_i64, require_i64_list, require_str};
use crate::protocol::{ParamSpec, ToolDescriptor};
use crate::render::{in_range, invalid_index, listing_line};

const MAX_TURNS_PER_FILE: usize = 3;

/// `*<pattern>*`, lowercased, with runs of `*` collapsed since `**` is only
/// legal as a whole path component.
fn contains_pattern(pattern: &str) -> String {
    let mut out = String::from("*");
    for c in pattern.to_lowercase().chars().chain(std::iter::once('*')) {
        if !(c == '*' && out.ends_with('*')) {
            out.push(c);
        }
    }
    out
}

pub struct FsProtocolAdapter {
    settings: RetrievalSettings,
    env: Option<Arc<Environment>>,
}

impl FsProtocolAdapter {
    pub fn new(settings: RetrievalSettings) -> Self {
        Self {
            settings,
            env: None,
        }
    }

    fn list_directory(&self) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        if env.is_empty() {
            return Ok("No conversation files found.".into());
        }
        let mut lines = vec![
            format!("Conversation history directory: {} files", env.len()),
            String::new(),
            "Index | Date       | Session ID                    | Turns".to_string(),
            "-".repeat(65),
        ];
        for (i, r) in env.sessions().iter().enumerate() {
            let s = &r.session;
            lines.push(format!(
                "{i:5} | {:10} | {:30} | {:5}",
                truncate_chars(&s.date, 10),
                truncate_chars(&s.session_id, 30),
                s.turns.len()
            ));
        }
        lines.push(String::new());
        lines.push(
            "Use read_file(index) to view a session, or grep_files(query) to search.".into(),
        );
        Ok(lines.join("\n"))
    }

    fn read_file(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let index = require_i64(args, "file_index")?;
        match in_range(index, env.len()) {
            Some(i) => Ok(format_file(&env.sessions()[i].session, i)),
            None => Ok(invalid_index("file", index, env.len())),
        }
    }

    fn search_files(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let pattern = require_str(args, "pattern")?;
        let glob = Pattern::new(&contains_pattern(pattern))
            .map_err(|e| format!("Error: Invalid pattern '{pattern}': {e}"))?;

        let matching: Vec<String> = env
            .sessions()
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                let searchable =
                    format!("{} {} {}", r.session.session_id, r.session.date, r.file_name);
                glob.matches(&searchable.to_lowercase())
            })
            .map(|(i, r)| listing_line(i, &r.session))
            .collect();

        if matching.is_empty() {
            return Ok(format!("No files matching pattern: {pattern}"));
        }
        let mut lines = vec![
            format!("Found {} file(s) matching '{pattern}':", matching.len()),
            String::new(),
        ];
        lines.extend(matching);
        lines.push(String::new());
        lines.push("Use read_file(index) to view a file.".into());
        Ok(lines.join("\n"))
    }

    fn grep_files(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let query = require_str(args, "query")?;
        let max_results = positive_or_default(args, "max_results", self.settings.grep_max_results)?;
        let needle = query.to_lowercase();

        let mut lines = Vec::new();
        let mut found = 0;
        for (i, r) in env.sessions().iter().enumerate() {
            if found >= max_results {
                break;
            }
            if !r.raw.to_lowercase().contains(&needle) {
                continue;
            }
            found += 1;
            lines.push(format!("[{i}] {} - {}", r.session.date, r.session.session_id));
            let turns = r
                .session
                .turns
                .iter()
                .enumerate()
                .filter(|(_, t)| t.content.to_lowercase().contains(&needle))
                .take(MAX_TURNS_PER_FILE);
            for (ti, turn) in turns {
                let snippet = snippet_around(&turn.content, query, self.settings.grep_snippet_chars);
                lines.push(format!("  Turn {ti} ({}): ...{snippet}...", turn.role));
            }
            lines.push(String::new());
        }
        debug!("grep_files {query:?}: {found} files");

        if found == 0 {
            return Ok(format!("No files contain: {query}"));
        }
        let mut out = vec![
            format!("Found {found} file(s) containing '{query}':"),
            String::new(),
        ];
        out.extend(lines);
        out.push("Use read_file(index) to view full content.".into());
        Ok(out.join("\n"))
    }

    fn read_multiple_files(&self, args: &Value) -> ToolResult {
        let env = ready_env(self.env.as_ref())?;
        let indices = require_i64_list(args, "file_indices")?;
        let parts: Vec<String> = indices
            .iter()
            .take(self.settings.max_multi_read)
            .map(|&index| match in_range(index, env.len()) {
                Some(i) => format_file(&env.sessions()[i].session, i),
                None => format!("[Error: Invalid index {index}]"),
            })
            .collect();
        Ok(parts.join("\n\n"))
    }
}

impl MemoryAdapter for FsProtocolAdapter {
    fn name(&self) -> &'static str {
        "fs-protocol"
    }

    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()> {
        self.env = Some(env);
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let max = self.settings.grep_max_results;
        vec![
            ToolDescriptor::new(
                "list_directory",
                "List all conversation session files with metadata (date, number of turns). Returns file indices that can be used with read_file.",
            ),
            ToolDescriptor::new(
                "read_file",
                "Read the complete contents of a conversation session file.",
            )
            .param(ParamSpec::integer(
                "file_index",
                "Index of the file to read (from list_directory output)",
            )),
            ToolDescriptor::new(
                "search_files",
                "Search for conversation files matching a date or session ID pattern.",
            )
            .param(ParamSpec::string(
                "pattern",
                "Pattern to match (e.g., '2024-01*' for January 2024, '*ultrachat*' for source)",
            )),
            ToolDescriptor::new(
                "grep_files",
                "Search for text content across all conversation files. Returns matching files with context.",
            )
            .param(ParamSpec::string(
                "query",
                "Text to search for in conversation content",
            ))
            .param(
                ParamSpec::integer(
                    "max_results",
                    &format!("Maximum number of matching files to return (default: {max})"),
                )
                .with_default(json!(max)),
            ),
            ToolDescriptor::new(
                "read_multiple_files",
                "Read multiple conversation files at once by their indices.",
            )
            .param(ParamSpec::integer_array(
                "file_indices",
                "List of file indices to read",
            )),
        ]
    }

    fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String> {
        let result = match name {
            "list_directory" => self.list_directory(),
            "read_file" => self.read_file(args),
            "search_files" => self.search_files(args),
            "grep_files" => self.grep_files(args),
            "read_multiple_files" => self.read_multiple_files(args),
            _ => return Ok(unknown_function(name)),
        };
        into_output(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::{empty, fixture, session, write_env};
    use tempfile::TempDir;

    fn adapter() -> FsProtocolAdapter {
        let mut a = FsProtocolAdapter::new(RetrievalSettings::default());
        a.set_environment(fixture()).unwrap();
        a
    }

    #[test]
    fn test_list_directory_table() {
        let out = adapter().execute_tool("list_directory", &json!({})).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Conversation history directory: 3 files");
        assert_eq!(lines[2], "Index | Date       | Session ID                    | Turns");
        assert_eq!(lines[3].len(), 65);
        assert_eq!(lines[4], format!("    0 | 2023/05/20 | {:30} |     2", "answer_a1"));
        assert_eq!(
            *lines.last().unwrap(),
            "Use read_file(index) to view a session, or grep_files(query) to search."
        );
    }

    #[test]
    fn test_read_file() {
        let a = adapter();
        let out = a.execute_tool("read_file", &json!({"file_index": 1})).unwrap();
        assert!(out.starts_with("=== File [1] ===\nSession ID: answer_b2\n"));
        assert!(out.contains("Turns: 2\n"));
        assert_eq!(
            a.execute_tool("read_file", &json!({"file_index": 7})).unwrap(),
            "Error: Invalid file index 7. Valid range: 0-2"
        );
    }

    #[test]
    fn test_search_files_glob() {
        let a = adapter();
        let out = a.execute_tool("search_files", &json!({"pattern": "2023/05/2?"})).unwrap();
        assert!(out.starts_with("Found 3 file(s) matching '2023/05/2?':"));

        let out = a.execute_tool("search_files", &json!({"pattern": "B2"})).unwrap();
        assert!(out.starts_with("Found 1 file(s)"));
        assert!(out.contains("[1] 2023/05/21 (Sun) 10:00 - answer_b2 (2 turns)"));

        // file names are searchable too
        let out = a.execute_tool("search_files", &json!({"pattern": "session_0002"})).unwrap();
        assert!(out.contains("answer_c3"));

        assert_eq!(
            a.execute_tool("search_files", &json!({"pattern": "2019*"})).unwrap(),
            "No files matching pattern: 2019*"
        );
        assert!(a
            .execute_tool("search_files", &json!({"pattern": "[unclosed"}))
            .unwrap()
            .starts_with("Error: Invalid pattern"));
    }

    #[test]
    fn test_grep_files_snippets() {
        let a = adapter();
        let out = a.execute_tool("grep_files", &json!({"query": "Password"})).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Found 1 file(s) containing 'Password':");
        assert_eq!(lines[2], "[1] 2023/05/21 (Sun) 10:00 - answer_b2");
        assert_eq!(
            lines[3],
            "  Turn 0 (user): ...I changed my wifi password to BlueFalcon42...."
        );
        assert!(lines[4].starts_with("  Turn 1 (assistant): ..."));
        assert_eq!(*lines.last().unwrap(), "Use read_file(index) to view full content.");
        assert_eq!(
            a.execute_tool("grep_files", &json!({"query": "zebra"})).unwrap(),
            "No files contain: zebra"
        );
    }

    #[test]
    fn test_contains_pattern() {
        assert_eq!(contains_pattern("B2"), "*b2*");
        assert_eq!(contains_pattern("*ultrachat*"), "*ultrachat*");
        assert_eq!(contains_pattern("2024-01**"), "*2024-01*");
        assert_eq!(contains_pattern(""), "*");
    }

    #[test]
    fn test_grep_respects_max_results() {
        let out = adapter()
            .execute_tool("grep_files", &json!({"query": "user", "max_results": 2}))
            .unwrap();
        assert!(out.starts_with("Found 2 file(s) containing 'user':"));
    }

    #[test]
    fn test_read_multiple_files() {
        let a = adapter();
        let out = a
            .execute_tool("read_multiple_files", &json!({"file_indices": [2, 9, 0]}))
            .unwrap();
        let parts: Vec<&str> = out.split("\n\n=== ").collect();
        assert!(out.starts_with("=== File [2] ==="));
        assert!(out.contains("[Error: Invalid index 9]"));
        assert!(parts.last().unwrap().starts_with("File [0] ==="));

        let many = a
            .execute_tool("read_multiple_files", &json!({"file_indices": [0, 0, 0, 0, 0, 0, 0]}))
            .unwrap();
        assert_eq!(many.matches("=== File [0] ===").count(), 5);
    }

    #[test]
    fn test_empty_and_on_disk() {
        let mut a = FsProtocolAdapter::new(RetrievalSettings::default());
        a.set_environment(empty()).unwrap();
        assert_eq!(
            a.execute_tool("list_directory", &json!({})).unwrap(),
            "No conversation files found."
        );

        let tmp = TempDir::new().unwrap();
        write_env(tmp.path(), &[session("ultrachat_1", "2024-01-05", &[("user", "hey")])], &[]);
        a.set_environment(Arc::new(Environment::load(tmp.path()).unwrap()))
            .unwrap();
        let out = a.execute_tool("search_files", &json!({"pattern": "*ultrachat*"})).unwrap();
        assert!(out.contains("[0] 2024-01-05 - ultrachat_1 (1 turns)"));
    }
}
