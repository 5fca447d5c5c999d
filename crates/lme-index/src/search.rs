//! Ranking operations over a built [`CorpusIndex`].
//!
//! Every function returns `(doc_id, score)` pairs in descending score order;
//! ties keep document order.

use std::cmp::Ordering;

use tracing::debug;

use lme_core::scoring::{self, rank_descending};
use lme_core::{CrossEncoder, Embedder, LmeError, LmeResult};

use crate::corpus::CorpusIndex;

/// A candidate after second-stage scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankedHit {
    pub doc: usize,
    pub first_stage: f64,
    pub score: f32,
}

impl CorpusIndex {
    /// Sessions with a non-zero keyword occurrence count.
    pub fn search_keywords(&self, query: &str) -> Vec<(usize, usize)> {
        let keywords = scoring::query_keywords(query);
        let mut scored: Vec<(usize, usize)> = (0..self.len())
            .filter_map(|doc| {
                let text = self.keyword_text(doc)?;
                let score = scoring::keyword_occurrences(&keywords, text);
                (score > 0).then_some((doc, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
    }

    /// Sessions with a positive BM25 score.
    pub fn search_bm25(&self, query: &str) -> Vec<(usize, f64)> {
        let query_tokens = scoring::tokenize(query);
        let params = self.options().bm25;
        let mut scored: Vec<(usize, f64)> = (0..self.len())
            .filter_map(|doc| {
                let tokens = self.tokens(doc)?;
                let score =
                    scoring::bm25_score(&query_tokens, tokens, params, self.avgdl(), |t| self.idf(t));
                (score > 0.0).then_some((doc, score))
            })
            .collect();
        rank_descending(&mut scored);
        scored
    }

    /// Every session scored by dot product against the normalized query
    /// vector.
    pub fn search_dense(&self, query_vector: Vec<f32>) -> LmeResult<Vec<(usize, f32)>> {
        let embeddings = self
            .embeddings()
            .ok_or_else(|| LmeError::Embedding("index was built without embeddings".into()))?;
        let query = scoring::normalize(query_vector);
        let mut scored = Vec::with_capacity(embeddings.len());
        for (doc, v) in embeddings.iter().enumerate() {
            if v.len() != query.len() {
                return Err(LmeError::Embedding(format!(
                    "query has {} dimensions, session {doc} has {}",
                    query.len(),
                    v.len()
                )));
            }
            scored.push((doc, scoring::dot(v, &query)));
        }
        rank_descending(&mut scored);
        Ok(scored)
    }

    /// Embed `candidates` on demand and order them by cosine similarity to
    /// `query`.
    pub fn rerank_dense(
        &self,
        query: &str,
        candidates: &[usize],
        embedder: &dyn Embedder,
    ) -> LmeResult<Vec<(usize, f32)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = scoring::normalize(embedder.embed(query)?);
        let texts: Vec<&str> = candidates.iter().filter_map(|&d| self.text(d)).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != candidates.len() {
            return Err(LmeError::Embedding(format!(
                "embedded {} of {} candidates",
                vectors.len(),
                candidates.len()
            )));
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .zip(vectors)
            .map(|(&doc, v)| (doc, scoring::dot(&scoring::normalize(v), &query_vec)))
            .collect();
        rank_descending(&mut scored);
        debug!("dense rerank over {} candidates", scored.len());
        Ok(scored)
    }

    /// Score each `(query, session text)` pair with the cross-encoder and
    /// reorder by that score alone.
    pub fn rerank_cross_encoder(
        &self,
        query: &str,
        candidates: &[(usize, f64)],
        encoder: &dyn CrossEncoder,
    ) -> LmeResult<Vec<RerankedHit>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let pairs: Vec<(&str, &str)> = candidates
            .iter()
            .filter_map(|&(d, _)| self.text(d).map(|t| (query, t)))
            .collect();
        let scores = encoder.score(&pairs)?;
        if scores.len() != candidates.len() {
            return Err(LmeError::Rerank(format!(
                "scored {} of {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let mut hits: Vec<RerankedHit> = candidates
            .iter()
            .zip(scores)
            .map(|(&(doc, first_stage), score)| RerankedHit {
                doc,
                first_stage,
                score,
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        debug!("cross-encoder rerank over {} candidates", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::{env, HashEmbedder};
    use crate::corpus::IndexOptions;

    fn index(docs: &[&str]) -> CorpusIndex {
        CorpusIndex::build(env(docs), IndexOptions::default())
    }

    #[test]
    fn test_bm25_password_example() {
        let idx = index(&[
            "we talked about the weather",
            "my password is hunter2",
            "dinner plans for friday",
        ]);
        let hits = idx.search_bm25("password");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_bm25_role_labels_do_not_match() {
        let idx = index(&["we talked about the weather", "my password is hunter2"]);
        assert!(idx.search_bm25("user").is_empty());
        assert!(idx.search_bm25("assistant").is_empty());
        let hits = idx.search_bm25("user password");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn test_bm25_is_deterministic() {
        let idx = index(&["apple banana", "banana cherry", "apple apple cherry"]);
        assert_eq!(idx.search_bm25("apple cherry"), idx.search_bm25("apple cherry"));
    }

    #[test]
    fn test_bm25_empty_index() {
        assert!(index(&[]).search_bm25("anything").is_empty());
    }

    #[test]
    fn test_keywords_rank_and_ties() {
        let idx = index(&["cat", "dog", "cat cat", "cat"]);
        let hits = idx.search_keywords("CAT");
        assert_eq!(hits, vec![(2, 2), (0, 1), (3, 1)]);
        assert!(idx.search_keywords("zebra").is_empty());
    }

    #[test]
    fn test_keywords_ignore_role_prefix_in_content_scope() {
        let idx = index(&["nothing here"]);
        assert!(idx.search_keywords("user").is_empty());
    }

    #[test]
    fn test_dense_self_similarity_is_max() {
        let docs = ["red apples and green pears", "rust borrow checker", "ocean tides at night"];
        let idx = CorpusIndex::build_with_embeddings(env(&docs), IndexOptions::default(), &HashEmbedder)
            .unwrap();
        for doc in 0..docs.len() {
            let q = HashEmbedder.embed(idx.text(doc).unwrap()).unwrap();
            let ranked = idx.search_dense(q).unwrap();
            assert_eq!(ranked[0].0, doc);
            assert!((ranked[0].1 - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_dense_without_embeddings_errors() {
        assert!(index(&["a"]).search_dense(vec![1.0]).is_err());
    }

    #[test]
    fn test_rerank_dense_orders_candidates() {
        let idx = index(&["alpha beta", "gamma delta", "alpha gamma"]);
        let ranked = idx
            .rerank_dense("user: gamma delta", &[0, 1, 2], &HashEmbedder)
            .unwrap();
        assert_eq!(ranked[0].0, 1);
        assert_eq!(ranked.len(), 3);
    }

    /// Prefers shorter documents, the opposite of what BM25 tends to do here.
    struct LengthEncoder;

    impl CrossEncoder for LengthEncoder {
        fn score(&self, pairs: &[(&str, &str)]) -> LmeResult<Vec<f32>> {
            Ok(pairs.iter().map(|(_, d)| 1.0 / d.len() as f32).collect())
        }
        fn model(&self) -> &str {
            "length"
        }
    }

    #[test]
    fn test_cross_encoder_reorders_by_stage_two() {
        let idx = index(&[
            "tea tea tea and a very long conversation about many other things",
            "tea",
            "coffee",
        ]);
        let candidates = vec![(0, 2.0), (1, 1.0)];
        let hits = idx.rerank_cross_encoder("tea", &candidates, &LengthEncoder).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc).collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(hits[0].first_stage, 1.0);
        assert!(hits.iter().all(|h| candidates.iter().any(|c| c.0 == h.doc)));
    }
}
