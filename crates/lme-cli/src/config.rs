//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$LME_CONFIG` environment variable
//! 2. `~/.config/lme/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use lme_agent::{ModelPrice, PriceTable};
use lme_core::{Bm25Params, ServiceEndpoint};
use lme_index::KeywordScope;
use lme_tools::RetrievalSettings;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub judge: JudgeConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub retrieval: RetrievalConfig,
    /// Per-model prices merged over the built-in table.
    pub pricing: BTreeMap<String, ModelPrice>,
}

/// Completion service used by the agent loop.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub max_iterations: usize,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Http,
    /// In-process models, requires the `embeddings` feature.
    Local,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    /// Retrieval prefix for the `bge` adapter's queries.
    pub query_instruction: Option<String>,
    pub timeout_secs: u64,
}

/// Cross-encoder service for the two-stage adapter.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub first_stage_k: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k1: f64,
    pub b: f64,
    pub default_top_k: usize,
    pub hybrid_candidates: usize,
    pub keyword_scope: KeywordScope,
    pub filesystem_tools: bool,
    pub grep_snippet_chars: usize,
    pub max_multi_read: usize,
}

// --- Defaults ---

/// Default cross-encoder for the HTTP rerank service.
pub const DEFAULT_RERANK_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

/// Substituted for [`DEFAULT_RERANK_MODEL`] when reranking in-process,
/// which cannot load that model.
pub const DEFAULT_LOCAL_RERANK_MODEL: &str = "BAAI/bge-reranker-base";

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            max_iterations: 5,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            base_url: "http://localhost:8080/v1".into(),
            model: "BAAI/bge-large-en-v1.5".into(),
            api_key_env: None,
            query_instruction: None,
            timeout_secs: 120,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            base_url: "http://localhost:8081/v1".into(),
            model: DEFAULT_RERANK_MODEL.into(),
            api_key_env: None,
            first_stage_k: 20,
            timeout_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let base = RetrievalSettings::default();
        Self {
            k1: base.bm25.k1,
            b: base.bm25.b,
            default_top_k: base.default_top_k,
            hybrid_candidates: base.hybrid_candidates,
            keyword_scope: base.keyword_scope,
            filesystem_tools: base.filesystem_tools,
            grep_snippet_chars: base.grep_snippet_chars,
            max_multi_read: base.max_multi_read,
        }
    }
}

// --- Conversions ---

fn api_key(var: Option<&str>) -> Option<String> {
    var.and_then(|v| std::env::var(v).ok())
        .filter(|k| !k.is_empty())
}

impl Config {
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        let r = &self.retrieval;
        RetrievalSettings {
            bm25: Bm25Params { k1: r.k1, b: r.b },
            default_top_k: r.default_top_k,
            hybrid_candidates: r.hybrid_candidates,
            first_stage_k: self.rerank.first_stage_k,
            keyword_scope: r.keyword_scope,
            filesystem_tools: r.filesystem_tools,
            grep_snippet_chars: r.grep_snippet_chars,
            max_multi_read: r.max_multi_read,
            query_instruction: self.embedding.query_instruction.clone(),
            ..RetrievalSettings::default()
        }
    }

    pub fn price_table(&self) -> PriceTable {
        let mut table = PriceTable::default();
        for (model, price) in &self.pricing {
            table.set(model.clone(), *price);
        }
        table
    }

    /// Endpoint for agent and judge completions. The model field is the
    /// agent model; requests carry their own model name.
    pub fn completion_endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new(&self.agent.base_url, &self.agent.model)
            .with_api_key(api_key(Some(self.agent.api_key_env.as_str())))
            .with_timeout(Duration::from_secs(self.agent.timeout_secs))
    }

    pub fn embedding_endpoint(&self) -> ServiceEndpoint {
        let e = &self.embedding;
        ServiceEndpoint::new(&e.base_url, &e.model)
            .with_api_key(api_key(e.api_key_env.as_deref()))
            .with_timeout(Duration::from_secs(e.timeout_secs))
    }

    /// Model name for the in-process cross-encoder. An untouched default
    /// maps to a model the local runtime ships.
    pub fn local_rerank_model(&self) -> &str {
        match self.rerank.model.as_str() {
            DEFAULT_RERANK_MODEL => DEFAULT_LOCAL_RERANK_MODEL,
            other => other,
        }
    }

    pub fn rerank_endpoint(&self) -> ServiceEndpoint {
        let r = &self.rerank;
        ServiceEndpoint::new(&r.base_url, &r.model)
            .with_api_key(api_key(r.api_key_env.as_deref()))
            .with_timeout(Duration::from_secs(r.timeout_secs))
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("LME_CONFIG") {
        return Some(PathBuf::from(p));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("lme").join("config.toml"))
}

/// Show the active config path (for `lme config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
