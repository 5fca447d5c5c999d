use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lme_core::{Bm25Params, CrossEncoder, Embedder, Environment, LmeError, LmeResult};
use lme_index::{IndexOptions, KeywordScope};

use crate::adapters::{
    Bm25Adapter, DenseAdapter, DensePreset, FilesystemAdapter, FsProtocolAdapter, HybridAdapter,
    KeywordAdapter, OracleAdapter, RerankerAdapter,
};
use crate::protocol::ToolDescriptor;

pub const ENV_NOT_SET: &str = "Error: Environment not set";
pub const NO_SESSIONS: &str = "No sessions found.";

/// Query prefix recommended for BGE retrieval models.
pub const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

pub fn unknown_function(name: &str) -> String {
    format!("Unknown function: {name}")
}

/// A retrieval strategy exposed to the agent as a set of tools.
///
/// `Err` is reserved for failures of an external service. An unset
/// environment, an empty corpus and malformed calls all come back as `Ok`
/// text, so the model sees them as ordinary tool output.
pub trait MemoryAdapter: Send {
    fn name(&self) -> &'static str;

    /// First contact with any external service. Optional; searching without
    /// it works the same, only later.
    fn warm_up(&mut self) -> LmeResult<()> {
        Ok(())
    }

    /// Point the adapter at a new environment, rebuilding everything derived
    /// from the previous one.
    fn set_environment(&mut self, env: Arc<Environment>) -> LmeResult<()>;

    fn tools(&self) -> Vec<ToolDescriptor>;

    fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String>;
}

// ---------------------------------------------------------------------------
// Settings and injected services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub bm25: Bm25Params,
    pub default_top_k: usize,
    pub hybrid_candidates: usize,
    pub first_stage_k: usize,
    pub keyword_scope: KeywordScope,
    /// Adds `read_session` to the keyword adapter.
    pub filesystem_tools: bool,
    pub grep_snippet_chars: usize,
    pub grep_max_results: usize,
    pub max_multi_read: usize,
    /// Overrides [`BGE_QUERY_INSTRUCTION`] for the `bge` adapter.
    pub query_instruction: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            default_top_k: 3,
            hybrid_candidates: 10,
            first_stage_k: 20,
            keyword_scope: KeywordScope::Content,
            filesystem_tools: false,
            grep_snippet_chars: 100,
            grep_max_results: 5,
            max_multi_read: 5,
            query_instruction: None,
        }
    }
}

impl RetrievalSettings {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            bm25: self.bm25,
            keyword_scope: self.keyword_scope,
        }
    }
}

/// External model handles. Adapters that need one fail to build without it.
#[derive(Clone, Default)]
pub struct Services {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub cross_encoder: Option<Arc<dyn CrossEncoder>>,
}

// ---------------------------------------------------------------------------
// Adapter kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    Oracle,
    Filesystem,
    Keyword,
    Bm25,
    Stella,
    Bge,
    Hybrid,
    Reranker,
    FsProtocol,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 9] = [
        AdapterKind::Oracle,
        AdapterKind::Filesystem,
        AdapterKind::Keyword,
        AdapterKind::Bm25,
        AdapterKind::Stella,
        AdapterKind::Bge,
        AdapterKind::Hybrid,
        AdapterKind::Reranker,
        AdapterKind::FsProtocol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Oracle => "oracle",
            AdapterKind::Filesystem => "filesystem",
            AdapterKind::Keyword => "keyword",
            AdapterKind::Bm25 => "bm25",
            AdapterKind::Stella => "stella",
            AdapterKind::Bge => "bge",
            AdapterKind::Hybrid => "hybrid",
            AdapterKind::Reranker => "reranker",
            AdapterKind::FsProtocol => "fs-protocol",
        }
    }

    pub fn needs_embedder(&self) -> bool {
        matches!(
            self,
            AdapterKind::Stella | AdapterKind::Bge | AdapterKind::Hybrid
        )
    }

    pub fn needs_cross_encoder(&self) -> bool {
        matches!(self, AdapterKind::Reranker)
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oracle" => Ok(AdapterKind::Oracle),
            "filesystem" => Ok(AdapterKind::Filesystem),
            "keyword" | "builtin_mcp" => Ok(AdapterKind::Keyword),
            "bm25" => Ok(AdapterKind::Bm25),
            "stella" | "stella_v5" => Ok(AdapterKind::Stella),
            "bge" => Ok(AdapterKind::Bge),
            "hybrid" => Ok(AdapterKind::Hybrid),
            "reranker" => Ok(AdapterKind::Reranker),
            "fs-protocol" | "mcp_filesystem" => Ok(AdapterKind::FsProtocol),
            _ => Err(format!(
                "unknown memory type: {s} (expected one of: {})",
                AdapterKind::ALL
                    .iter()
                    .map(AdapterKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

fn require<T: ?Sized>(handle: &Option<Arc<T>>, kind: AdapterKind, what: &str) -> LmeResult<Arc<T>> {
    handle
        .clone()
        .ok_or_else(|| LmeError::Config(format!("{kind} adapter requires {what}")))
}

/// Construct an adapter. No external service is contacted here.
pub fn build_adapter(
    kind: AdapterKind,
    settings: &RetrievalSettings,
    services: &Services,
) -> LmeResult<Box<dyn MemoryAdapter>> {
    let settings = settings.clone();
    Ok(match kind {
        AdapterKind::Oracle => Box::new(OracleAdapter::new()),
        AdapterKind::Filesystem => Box::new(FilesystemAdapter::new()),
        AdapterKind::Keyword => Box::new(KeywordAdapter::new(settings)),
        AdapterKind::Bm25 => Box::new(Bm25Adapter::new(settings)),
        AdapterKind::Stella => Box::new(DenseAdapter::new(
            DensePreset::stella(),
            settings,
            require(&services.embedder, kind, "an embedding service")?,
        )),
        AdapterKind::Bge => {
            let preset = DensePreset::bge(settings.query_instruction.clone());
            Box::new(DenseAdapter::new(
                preset,
                settings,
                require(&services.embedder, kind, "an embedding service")?,
            ))
        }
        AdapterKind::Hybrid => Box::new(HybridAdapter::new(
            settings,
            require(&services.embedder, kind, "an embedding service")?,
        )),
        AdapterKind::Reranker => Box::new(RerankerAdapter::new(
            settings,
            require(&services.cross_encoder, kind, "a cross-encoder service")?,
        )),
        AdapterKind::FsProtocol => Box::new(FsProtocolAdapter::new(settings)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in AdapterKind::ALL {
            assert_eq!(kind.as_str().parse::<AdapterKind>(), Ok(kind));
        }
        assert_eq!("builtin_mcp".parse(), Ok(AdapterKind::Keyword));
        assert_eq!("mcp_filesystem".parse(), Ok(AdapterKind::FsProtocol));
        assert!("vector".parse::<AdapterKind>().is_err());
    }

    #[test]
    fn test_build_requires_services() {
        let settings = RetrievalSettings::default();
        let none = Services::default();
        for kind in AdapterKind::ALL {
            let built = build_adapter(kind, &settings, &none);
            let needs = kind.needs_embedder() || kind.needs_cross_encoder();
            assert_eq!(built.is_err(), needs, "{kind}");
            if let Ok(adapter) = built {
                assert_eq!(adapter.name(), kind.as_str());
            }
        }
    }

    #[test]
    fn test_every_adapter_reports_unset_environment() {
        let services = Services {
            embedder: Some(Arc::new(crate::adapters::tests::StubEmbedder)),
            cross_encoder: Some(Arc::new(crate::adapters::tests::StubEncoder)),
        };
        for kind in AdapterKind::ALL {
            let adapter = build_adapter(kind, &RetrievalSettings::default(), &services).unwrap();
            for tool in adapter.tools() {
                let args = serde_json::json!({
                    "query": "x", "keywords": "x", "pattern": "x",
                    "session_index": 0, "file_index": 0, "file_indices": [0]
                });
                let out = adapter.execute_tool(&tool.name, &args).unwrap();
                assert_eq!(out, ENV_NOT_SET, "{kind}/{}", tool.name);
            }
            assert_eq!(
                adapter.execute_tool("nope", &Value::Null).unwrap(),
                "Unknown function: nope"
            );
        }
    }
}
