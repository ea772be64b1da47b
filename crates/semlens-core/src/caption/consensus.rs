//! Consensus caption: keep the words most sampled captions agree on.

use std::collections::{HashMap, HashSet};

/// Lowercased word set of a caption, in first-seen order.
fn words(caption: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    caption
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .collect()
}

/// Words that appear in at least `min_votes` of `captions`, joined by spaces.
///
/// Each caption votes once per distinct word. Survivors are emitted in the
/// order they are first seen, scanning captions in input order.
pub fn consensus_caption(captions: &[String], min_votes: usize) -> String {
    let word_sets: Vec<Vec<String>> = captions.iter().map(|c| words(c)).collect();

    let mut votes: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for set in &word_sets {
        for word in set {
            let count = votes.entry(word.as_str()).or_insert(0);
            if *count == 0 {
                order.push(word.as_str());
            }
            *count += 1;
        }
    }

    order
        .into_iter()
        .filter(|w| votes.get(w).copied().unwrap_or(0) >= min_votes)
        .collect::<Vec<_>>()
        .join(" ")
}
