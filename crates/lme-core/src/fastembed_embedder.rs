use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};
use tracing::info;

use crate::cross_encoder::CrossEncoder;
use crate::embedder::Embedder;
use crate::error::{LmeError, LmeResult};

fn cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lme").map(|d| d.cache_dir().join("models"))
}

fn embedding_model(name: &str) -> LmeResult<EmbeddingModel> {
    match name {
        "BAAI/bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "sentence-transformers/all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(LmeError::Config(format!(
            "no local embedding model named {other}"
        ))),
    }
}

const RERANKER_MODELS: [(&str, RerankerModel); 2] = [
    ("BAAI/bge-reranker-base", RerankerModel::BGERerankerBase),
    (
        "jinaai/jina-reranker-v1-turbo-en",
        RerankerModel::JINARerankerV1TurboEn,
    ),
];

fn reranker_model(name: &str) -> LmeResult<RerankerModel> {
    RERANKER_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, m)| m.clone())
        .ok_or_else(|| {
            let known: Vec<&str> = RERANKER_MODELS.iter().map(|(n, _)| *n).collect();
            LmeError::Config(format!(
                "no local reranker named {name} (supported: {})",
                known.join(", ")
            ))
        })
}

/// In-process embedding model, loaded on first use.
pub struct FastEmbedder {
    name: String,
    model_id: EmbeddingModel,
    model: OnceLock<TextEmbedding>,
    init_lock: Mutex<()>,
}

impl FastEmbedder {
    pub fn new(name: &str) -> LmeResult<Self> {
        Ok(Self {
            name: name.to_string(),
            model_id: embedding_model(name)?,
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        })
    }

    fn get_model(&self) -> LmeResult<&TextEmbedding> {
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| LmeError::Embedding("model init lock poisoned".into()))?;
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        info!("loading local embedding model {}", self.name);
        let mut opts = InitOptions::new(self.model_id.clone()).with_show_download_progress(true);
        if let Some(dir) = cache_dir() {
            opts = opts.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(opts)
            .map_err(|e| LmeError::Embedding(format!("failed to init model: {e}")))?;
        Ok(self.model.get_or_init(|| model))
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> LmeResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| LmeError::Embedding("empty embedding result".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> LmeResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.get_model()?
            .embed(texts.to_vec(), None)
            .map_err(|e| LmeError::Embedding(e.to_string()))
    }

    fn model(&self) -> &str {
        &self.name
    }
}

/// In-process cross-encoder, loaded on first use.
pub struct FastReranker {
    name: String,
    model_id: RerankerModel,
    model: OnceLock<TextRerank>,
    init_lock: Mutex<()>,
}

impl FastReranker {
    pub fn new(name: &str) -> LmeResult<Self> {
        Ok(Self {
            name: name.to_string(),
            model_id: reranker_model(name)?,
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        })
    }

    fn get_model(&self) -> LmeResult<&TextRerank> {
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| LmeError::Rerank("model init lock poisoned".into()))?;
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        info!("loading local reranker {}", self.name);
        let mut opts =
            RerankInitOptions::new(self.model_id.clone()).with_show_download_progress(true);
        if let Some(dir) = cache_dir() {
            opts = opts.with_cache_dir(dir);
        }
        let model = TextRerank::try_new(opts)
            .map_err(|e| LmeError::Rerank(format!("failed to init model: {e}")))?;
        Ok(self.model.get_or_init(|| model))
    }
}

impl CrossEncoder for FastReranker {
    fn score(&self, pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>> {
        let mut scores = vec![0.0f32; pairs.len()];
        let mut start = 0;
        while start < pairs.len() {
            let query = pairs[start].0;
            let end = pairs[start..]
                .iter()
                .position(|(q, _)| *q != query)
                .map_or(pairs.len(), |p| start + p);
            let docs: Vec<&str> = pairs[start..end].iter().map(|(_, d)| *d).collect();
            let results = self
                .get_model()?
                .rerank(query, docs, false, None)
                .map_err(|e| LmeError::Rerank(e.to_string()))?;
            for r in results {
                if let Some(slot) = scores.get_mut(start + r.index) {
                    *slot = r.score;
                }
            }
            start = end;
        }
        Ok(scores)
    }

    fn model(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_models_rejected() {
        assert!(FastEmbedder::new("nope/model").is_err());
        assert!(FastReranker::new("nope/reranker").is_err());
        assert!(FastEmbedder::new("BAAI/bge-large-en-v1.5").is_ok());
    }

    #[test]
    fn test_unknown_reranker_lists_supported() {
        let err = FastReranker::new("cross-encoder/ms-marco-MiniLM-L-6-v2")
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("cross-encoder/ms-marco-MiniLM-L-6-v2"));
        assert!(err.contains("BAAI/bge-reranker-base"));
        assert!(err.contains("jinaai/jina-reranker-v1-turbo-en"));
        assert!(FastReranker::new("BAAI/bge-reranker-base").is_ok());
    }
}
