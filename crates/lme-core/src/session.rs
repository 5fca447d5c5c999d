use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LmeError, LmeResult};

const CHAT_HISTORY_DIR: &str = "chat_history";
const METADATA_FILE: &str = "metadata.json";

fn unknown() -> String {
    "unknown".into()
}

/// One role-tagged message inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default = "unknown")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl Turn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A complete conversation, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "unknown")]
    pub session_id: String,
    #[serde(default = "unknown")]
    pub date: String,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, date: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.into(),
            date: date.into(),
            turns,
        }
    }

    /// `role: content` per turn, newline-joined. Embedding and cross-encoder
    /// calls see sessions through this representation.
    pub fn canonical_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Turn contents only, newline-joined.
    pub fn content_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A session as it was found on disk.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub file_name: String,
    /// Unparsed file text, kept for raw substring search.
    pub raw: String,
    pub session: Session,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentMetadata {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub question_date: Option<String>,
    #[serde(default)]
    pub answer_session_ids: Vec<String>,
}

/// The fixed set of sessions searchable for one question.
///
/// Immutable once loaded. Sessions are ordered by file name; the position of a
/// session in [`Environment::sessions`] is its document id.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    dir: Option<PathBuf>,
    sessions: Vec<SessionRecord>,
    metadata: EnvironmentMetadata,
}

impl Environment {
    /// Load `<dir>/chat_history/*.json` (sorted by file name) and the optional
    /// `<dir>/metadata.json`.
    pub fn load(dir: &Path) -> LmeResult<Self> {
        if !dir.is_dir() {
            return Err(LmeError::Environment(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let history = dir.join(CHAT_HISTORY_DIR);
        let mut files: Vec<PathBuf> = Vec::new();
        if history.is_dir() {
            for entry in fs::read_dir(&history)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    files.push(path);
                }
            }
        } else {
            warn!("no {CHAT_HISTORY_DIR}/ in {}", dir.display());
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut sessions = Vec::with_capacity(files.len());
        for path in &files {
            let raw = fs::read_to_string(path)?;
            let session: Session = serde_json::from_str(&raw).map_err(|e| {
                LmeError::Environment(format!("malformed session {}: {e}", path.display()))
            })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            sessions.push(SessionRecord {
                file_name,
                raw,
                session,
            });
        }

        let meta_path = dir.join(METADATA_FILE);
        let metadata = if meta_path.is_file() {
            let content = fs::read_to_string(&meta_path)?;
            serde_json::from_str(&content).map_err(|e| {
                LmeError::Environment(format!("malformed {}: {e}", meta_path.display()))
            })?
        } else {
            warn!("no {METADATA_FILE} in {}", dir.display());
            EnvironmentMetadata::default()
        };

        debug!(
            "loaded environment {} ({} sessions)",
            dir.display(),
            sessions.len()
        );

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            sessions,
            metadata,
        })
    }

    /// Build an environment in memory. File names follow the
    /// `session_NNNN_<id>.json` convention so ordering matches on-disk data.
    pub fn from_sessions(sessions: Vec<Session>, answer_session_ids: Vec<String>) -> Self {
        let sessions = sessions
            .into_iter()
            .enumerate()
            .map(|(i, session)| SessionRecord {
                file_name: format!("session_{i:04}_{}.json", session.session_id),
                raw: serde_json::to_string_pretty(&session).unwrap_or_default(),
                session,
            })
            .collect();
        Self {
            dir: None,
            sessions,
            metadata: EnvironmentMetadata {
                answer_session_ids,
                ..Default::default()
            },
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Directory name, or `"in-memory"` for environments built in memory.
    pub fn name(&self) -> String {
        self.dir
            .as_deref()
            .and_then(|d| d.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "in-memory".into())
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn metadata(&self) -> &EnvironmentMetadata {
        &self.metadata
    }

    pub fn answer_session_ids(&self) -> &[String] {
        &self.metadata.answer_session_ids
    }

    /// First session whose id matches. Session ids are only unique within one
    /// environment.
    pub fn find_session(&self, session_id: &str) -> Option<(usize, &SessionRecord)> {
        self.sessions
            .iter()
            .enumerate()
            .find(|(_, r)| r.session.session_id == session_id)
    }
}
