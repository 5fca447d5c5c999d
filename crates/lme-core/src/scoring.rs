//! Ranking mathematics shared by every lexical and dense adapter.
//!
//! BM25(D, Q) = sum over q in Q of IDF(q) * tf(q, D) * (k1 + 1)
//!              / (tf(q, D) + k1 * (1 - b + b * |D| / avgdl))

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("static regex"));

/// Term-frequency saturation and length normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Lowercase, then keep maximal runs of word characters (letters, digits, `_`).
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn term_frequencies(tokens: &[String]) -> HashMap<&str, usize> {
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    tf
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`. The `+ 1` keeps the value positive
/// when a term occurs in every document.
pub fn idf(df: usize, n: usize) -> f64 {
    let df = df as f64;
    let n = n as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Score one document. Query terms absent from the document contribute zero;
/// repeated query terms are counted once per occurrence.
pub fn bm25_score(
    query_tokens: &[String],
    doc_tokens: &[String],
    params: Bm25Params,
    avgdl: f64,
    idf_fn: impl Fn(&str) -> f64,
) -> f64 {
    let tf = term_frequencies(doc_tokens);
    bm25_score_with_tf(query_tokens, &tf, doc_tokens.len(), params, avgdl, idf_fn)
}

/// [`bm25_score`] over precomputed term frequencies.
pub fn bm25_score_with_tf(
    query_tokens: &[String],
    tf: &HashMap<&str, usize>,
    doc_len: usize,
    params: Bm25Params,
    avgdl: f64,
    idf_fn: impl Fn(&str) -> f64,
) -> f64 {
    let Bm25Params { k1, b } = params;
    let norm = k1 * (1.0 - b + b * doc_len as f64 / avgdl);

    let mut score = 0.0;
    for term in query_tokens {
        let Some(&freq) = tf.get(term.as_str()) else {
            continue;
        };
        let freq = freq as f64;
        score += idf_fn(term) * (freq * (k1 + 1.0)) / (freq + norm);
    }
    score
}

/// Unique whitespace-separated lowercase words of a keyword query.
pub fn query_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| seen.insert(w.to_string()))
        .map(String::from)
        .collect()
}

/// Sum of non-overlapping substring occurrences of each keyword in `haystack`.
/// `haystack` must already be lowercase.
pub fn keyword_occurrences(keywords: &[String], haystack: &str) -> usize {
    keywords
        .iter()
        .map(|kw| haystack.matches(kw.as_str()).count())
        .sum()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; `None` for empty, mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let na = dot(a, a);
    let nb = dot(b, b);
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return None;
    }
    Some((dot(a, b) / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

/// Sort `(doc_id, score)` pairs by descending score. The sort is stable, so
/// equal scores keep their original document order.
pub fn rank_descending<T: Copy + Into<f64>>(scored: &mut [(usize, T)]) {
    scored.sort_by(|a, b| {
        let (x, y): (f64, f64) = (a.1.into(), b.1.into());
        y.partial_cmp(&x).unwrap_or(Ordering::Equal)
    });
}
