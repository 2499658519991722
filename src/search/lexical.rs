//! TF-IDF lexical ranking.
//!
//! The vectorizer is fit on the query together with every chunk: lowercase
//! text, tokens of two or more word characters, raw term counts weighted by the
//! smoothed idf `ln((1 + n) / (1 + df)) + 1`, rows L2-normalized. Chunks are
//! ranked by cosine similarity to the query and identified by position, so
//! chunks with identical text stay distinct.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub position: usize,
    pub score: f32,
}

fn term_counts(text: &str) -> HashMap<String, u32> {
    let lowered = text.to_lowercase();
    let mut counts = HashMap::new();
    for token in TOKEN_PATTERN.find_iter(&lowered) {
        *counts.entry(token.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Up to `top_k` chunks with non-zero similarity, best first; ties go to the lower position.
pub fn rank(query: &str, chunks: &[String], top_k: usize) -> Vec<LexicalHit> {
    let query_terms = term_counts(query);
    if query_terms.is_empty() || chunks.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let chunk_terms: Vec<HashMap<String, u32>> = chunks.iter().map(|c| term_counts(c)).collect();

    let mut df: HashMap<&str, usize> = HashMap::new();
    for terms in std::iter::once(&query_terms).chain(chunk_terms.iter()) {
        for term in terms.keys() {
            *df.entry(term.as_str()).or_insert(0) += 1;
        }
    }
    let n = (chunks.len() + 1) as f64;
    let idf = |term: &str| -> f64 {
        let df = df.get(term).copied().unwrap_or(0) as f64;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    };

    let query_weights: Vec<(&str, f64)> = query_terms
        .iter()
        .map(|(term, &count)| (term.as_str(), count as f64 * idf(term)))
        .collect();
    let query_norm = query_weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();

    let mut hits: Vec<LexicalHit> = chunk_terms
        .iter()
        .enumerate()
        .filter_map(|(position, terms)| {
            let dot: f64 = query_weights
                .iter()
                .filter_map(|(term, qw)| terms.get(*term).map(|&c| qw * c as f64 * idf(term)))
                .sum();
            if dot <= 0.0 {
                return None;
            }
            let norm = terms
                .iter()
                .map(|(term, &c)| {
                    let w = c as f64 * idf(term);
                    w * w
                })
                .sum::<f64>()
                .sqrt();
            Some(LexicalHit {
                position,
                score: (dot / (query_norm * norm)) as f32,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
    hits.truncate(top_k);
    hits
}
