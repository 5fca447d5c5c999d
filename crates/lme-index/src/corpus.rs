//! Derived per-environment structures.
//!
//! A [`CorpusIndex`] is built in one pass from an [`Environment`] and never
//! mutated afterwards. Switching environments means building a new index and
//! replacing the old one whole.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lme_core::scoring::{self, Bm25Params};
use lme_core::{Embedder, Environment, LmeError, LmeResult, SessionRecord};

/// Which text keyword occurrence scoring counts over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordScope {
    /// Turn contents only.
    #[default]
    Content,
    /// The whole session file as stored, field names included.
    Raw,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub bm25: Bm25Params,
    pub keyword_scope: KeywordScope,
}

pub struct CorpusIndex {
    env: Arc<Environment>,
    options: IndexOptions,
    texts: Vec<String>,
    keyword_texts: Vec<String>,
    tokens: Vec<Vec<String>>,
    doc_freqs: HashMap<String, usize>,
    avgdl: f64,
    embeddings: Option<Vec<Vec<f32>>>,
}

impl CorpusIndex {
    /// Lexical structures only.
    pub fn build(env: Arc<Environment>, options: IndexOptions) -> Self {
        let records = env.sessions();
        let texts: Vec<String> = records.iter().map(|r| r.session.canonical_text()).collect();
        let keyword_texts = records
            .iter()
            .map(|r| match options.keyword_scope {
                KeywordScope::Content => r.session.content_text().to_lowercase(),
                KeywordScope::Raw => r.raw.to_lowercase(),
            })
            .collect();
        // role labels stay out of the lexical statistics
        let tokens: Vec<Vec<String>> = records
            .iter()
            .map(|r| scoring::tokenize(&r.session.content_text()))
            .collect();

        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        for doc in &tokens {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freqs.entry(term.to_string()).or_insert(0) += 1;
            }
        }

        let total: usize = tokens.iter().map(Vec::len).sum();
        let avgdl = if tokens.is_empty() {
            1.0
        } else {
            total as f64 / tokens.len() as f64
        };

        debug!(
            "indexed {} sessions ({} terms, avgdl {:.1})",
            tokens.len(),
            doc_freqs.len(),
            avgdl
        );

        Self {
            env,
            options,
            texts,
            keyword_texts,
            tokens,
            doc_freqs,
            avgdl,
            embeddings: None,
        }
    }

    /// Lexical structures plus one unit-length embedding per session, from a
    /// single batch call.
    pub fn build_with_embeddings(
        env: Arc<Environment>,
        options: IndexOptions,
        embedder: &dyn Embedder,
    ) -> LmeResult<Self> {
        let mut index = Self::build(env, options);
        if index.is_empty() {
            index.embeddings = Some(Vec::new());
            return Ok(index);
        }

        let inputs: Vec<&str> = index.texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&inputs)?;
        if vectors.len() != inputs.len() {
            return Err(LmeError::Embedding(format!(
                "embedded {} of {} sessions",
                vectors.len(),
                inputs.len()
            )));
        }
        index.embeddings = Some(vectors.into_iter().map(scoring::normalize).collect());
        info!(
            "embedded {} sessions of {} with {}",
            inputs.len(),
            index.env.name(),
            embedder.model()
        );
        Ok(index)
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn options(&self) -> IndexOptions {
        self.options
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn record(&self, doc: usize) -> Option<&SessionRecord> {
        self.env.sessions().get(doc)
    }

    /// Canonical `role: content` text of a document.
    pub fn text(&self, doc: usize) -> Option<&str> {
        self.texts.get(doc).map(String::as_str)
    }

    pub fn keyword_text(&self, doc: usize) -> Option<&str> {
        self.keyword_texts.get(doc).map(String::as_str)
    }

    pub fn tokens(&self, doc: usize) -> Option<&[String]> {
        self.tokens.get(doc).map(Vec::as_slice)
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    pub fn embeddings(&self) -> Option<&[Vec<f32>]> {
        self.embeddings.as_deref()
    }

    pub fn idf(&self, term: &str) -> f64 {
        scoring::idf(self.doc_freq(term), self.len())
    }
}
