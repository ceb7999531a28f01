//! Spelling-corrected alternatives for a query.
//!
//! Each alternative replaces exactly one query token with a correction and
//! is only returned if it matches at least one document. That costs one
//! index query per candidate, so up to `MAX_CANDIDATES_PER_TOKEN` queries
//! per token: fine for a personal document collection, not for a large one.

use std::{cmp::Reverse, collections::HashMap};

use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder};
use tantivy::{Searcher, schema::Field};

use crate::{
    doc_table::DocumentTable,
    error::Result,
    index_store::IndexStore,
    query,
};

/// Corrections requested per query token.
pub const MAX_CANDIDATES_PER_TOKEN: usize = 5;

/// Largest edit distance (transpositions count as one edit).
pub const MAX_EDIT_DISTANCE: u8 = 2;

pub trait SpellingCorrector {
    /// Up to `limit` corrections for `word`, best first.
    fn suggest(&self, word: &str, limit: usize) -> Result<Vec<String>>;
}

/// Corrector over the terms of one indexed field.
///
/// Candidates are ranked by edit distance, then by how many documents
/// contain them.
pub struct TermCorrector {
    searcher: Searcher,
    field: Field,
    automata: LevenshteinAutomatonBuilder,
}

impl TermCorrector {
    pub fn new(searcher: Searcher, field: Field) -> Self {
        Self {
            searcher,
            field,
            automata: LevenshteinAutomatonBuilder::new(MAX_EDIT_DISTANCE, true),
        }
    }
}

impl SpellingCorrector for TermCorrector {
    fn suggest(&self, word: &str, limit: usize) -> Result<Vec<String>> {
        let word = word.to_lowercase();
        if word.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let dfa = self.automata.build_dfa(&word);
        // Edit distance counts characters, not bytes.
        let word_len = word.chars().count();
        let max_len = word_len + usize::from(MAX_EDIT_DISTANCE);
        let min_len = word_len.saturating_sub(usize::from(MAX_EDIT_DISTANCE));

        // term -> (distance, document frequency summed over segments)
        let mut candidates: HashMap<String, (u8, u64)> = HashMap::new();
        for segment in self.searcher.segment_readers() {
            let inverted = segment.inverted_index(self.field)?;
            let mut terms = inverted.terms().stream()?;
            while terms.advance() {
                let key = terms.key();
                // A term has at least a quarter as many chars as bytes.
                if key.len() < min_len || key.len() > max_len * 4 {
                    continue;
                }
                let Ok(term) = std::str::from_utf8(key) else {
                    continue;
                };
                let term_len = term.chars().count();
                if term_len < min_len || term_len > max_len {
                    continue;
                }
                let Distance::Exact(distance) = dfa.eval(key) else {
                    continue;
                };
                if term == word {
                    continue;
                }
                let entry = candidates
                    .entry(term.to_string())
                    .or_insert((distance, 0));
                entry.1 += u64::from(terms.value().doc_freq);
            }
        }

        let mut ranked: Vec<(String, u8, u64)> = candidates
            .into_iter()
            .map(|(term, (distance, freq))| (term, distance, freq))
            .collect();
        ranked.sort_by(|a, b| {
            (a.1, Reverse(a.2), &a.0).cmp(&(b.1, Reverse(b.2), &b.0))
        });
        ranked.truncate(limit);

        Ok(ranked.into_iter().map(|(term, _, _)| term).collect())
    }
}

/// Alternative queries for `query_text`, each matching at least one document.
///
/// Results are grouped by token position, then follow the corrector's
/// ranking. Duplicates are kept.
pub fn suggest(
    store: &IndexStore,
    table: &DocumentTable,
    corrector: &dyn SpellingCorrector,
    query_text: &str,
) -> Result<Vec<String>> {
    let tokens: Vec<&str> = query_text.split_whitespace().collect();
    let mut suggestions = Vec::new();

    for (position, token) in tokens.iter().enumerate() {
        for candidate in corrector.suggest(token, MAX_CANDIDATES_PER_TOKEN)? {
            let mut alternative = tokens.clone();
            alternative[position] = &candidate;
            let alternative = alternative.join(" ");

            if !query::find(store, table, &alternative)?.is_empty() {
                suggestions.push(alternative);
            }
        }
    }

    Ok(suggestions)
}
