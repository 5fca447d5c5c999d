mod bm25;
mod dense;
mod filesystem;
mod fs_protocol;
mod hybrid;
mod keyword;
mod oracle;
mod reranker;

pub use bm25::Bm25Adapter;
pub use dense::{DenseAdapter, DensePreset};
pub use filesystem::FilesystemAdapter;
pub use fs_protocol::FsProtocolAdapter;
pub use hybrid::HybridAdapter;
pub use keyword::KeywordAdapter;
pub use oracle::OracleAdapter;
pub use reranker::RerankerAdapter;

use std::sync::Arc;

use lme_core::{Environment, LmeError, LmeResult};
use lme_index::CorpusIndex;

use crate::adapter::{ENV_NOT_SET, NO_SESSIONS};

/// Why a tool produced no normal result. A `Reply` is still shown to the model;
/// a `Service` failure aborts the question.
pub(crate) enum ToolError {
    Reply(String),
    Service(LmeError),
}

impl From<String> for ToolError {
    fn from(msg: String) -> Self {
        ToolError::Reply(msg)
    }
}

impl From<LmeError> for ToolError {
    fn from(e: LmeError) -> Self {
        ToolError::Service(e)
    }
}

pub(crate) type ToolResult = Result<String, ToolError>;

pub(crate) fn into_output(result: ToolResult) -> LmeResult<String> {
    match result {
        Ok(text) | Err(ToolError::Reply(text)) => Ok(text),
        Err(ToolError::Service(e)) => Err(e),
    }
}

/// The built index, unless the environment is unset or has no sessions.
pub(crate) fn ready(index: Option<&CorpusIndex>) -> Result<&CorpusIndex, ToolError> {
    let index = index.ok_or_else(|| ToolError::Reply(ENV_NOT_SET.into()))?;
    if index.is_empty() {
        return Err(ToolError::Reply(NO_SESSIONS.into()));
    }
    Ok(index)
}

pub(crate) fn ready_env(env: Option<&Arc<Environment>>) -> Result<&Environment, ToolError> {
    env.map(|e| e.as_ref())
        .ok_or_else(|| ToolError::Reply(ENV_NOT_SET.into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;
    use std::path::Path;

    use lme_core::scoring;
    use lme_core::{CrossEncoder, Embedder, Session, Turn};

    use super::*;

    /// Hashed bag-of-words vectors; identical texts embed identically.
    pub struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn embed(&self, text: &str) -> LmeResult<Vec<f32>> {
            let mut v = vec![0.0f32; 64];
            for tok in scoring::tokenize(text) {
                let h = tok
                    .bytes()
                    .fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
                v[(h % 64) as usize] += 1.0;
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[&str]) -> LmeResult<Vec<Vec<f32>>> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    pub struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> LmeResult<Vec<f32>> {
            Err(LmeError::Embedding("service unavailable".into()))
        }

        fn embed_batch(&self, _texts: &[&str]) -> LmeResult<Vec<Vec<f32>>> {
            Err(LmeError::Embedding("service unavailable".into()))
        }

        fn model(&self) -> &str {
            "failing"
        }
    }

    /// Scores a document by how short it is, ignoring the query.
    pub struct StubEncoder;

    impl CrossEncoder for StubEncoder {
        fn score(&self, pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>> {
            Ok(pairs.iter().map(|(_, d)| 100.0 / d.len() as f32).collect())
        }

        fn model(&self) -> &str {
            "stub-ce"
        }
    }

    pub fn session(id: &str, date: &str, turns: &[(&str, &str)]) -> Session {
        Session::new(
            id,
            date,
            turns.iter().map(|(r, c)| Turn::new(*r, *c)).collect(),
        )
    }

    /// Three sessions, one mentioning a password, plus oracle evidence.
    pub fn fixture() -> Arc<Environment> {
        Arc::new(Environment::from_sessions(
            vec![
                session(
                    "answer_a1",
                    "2023/05/20 (Sat) 02:21",
                    &[("user", "What's the weather like?"), ("assistant", "Sunny and warm.")],
                ),
                session(
                    "answer_b2",
                    "2023/05/21 (Sun) 10:00",
                    &[
                        ("user", "I changed my wifi password to BlueFalcon42."),
                        ("assistant", "Noted, your new password is saved."),
                    ],
                ),
                session(
                    "answer_c3",
                    "2023/05/22 (Mon) 18:30",
                    &[("user", "Let's plan dinner for Friday.")],
                ),
            ],
            vec!["answer_b2".into()],
        ))
    }

    pub fn empty() -> Arc<Environment> {
        Arc::new(Environment::from_sessions(vec![], vec![]))
    }

    /// Write `sessions` to `<dir>/chat_history/` with sortable file names.
    pub fn write_env(dir: &Path, sessions: &[Session], answer_ids: &[&str]) {
        let history = dir.join("chat_history");
        fs::create_dir_all(&history).unwrap();
        for (i, s) in sessions.iter().enumerate() {
            fs::write(
                history.join(format!("session_{i:04}_{}.json", s.session_id)),
                serde_json::to_string_pretty(s).unwrap(),
            )
            .unwrap();
        }
        let meta = serde_json::json!({ "question_id": "q1", "answer_session_ids": answer_ids });
        fs::write(dir.join("metadata.json"), meta.to_string()).unwrap();
    }
}
