//! Heuristic entity and topic extraction.
//!
//! Entities are capitalized tokens, topics are keyword hits against the
//! lexicon's topic table. Both are deliberately simple: the thresholds here
//! (length > 2, the stoplist) are relied on by callers and tests.

use crate::lexicon::Lexicon;
use std::collections::BTreeSet;

const TOKEN_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Capitalized tokens longer than two characters, minus the stoplist.
///
/// Tokens are split on whitespace and trimmed of `.,!?;:`. Matching is case
/// sensitive and the exact token is the entity key.
pub fn extract_entities(text: &str, lexicon: &Lexicon) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(TOKEN_PUNCTUATION))
        .filter(|token| {
            token.chars().next().is_some_and(char::is_uppercase)
                && token.chars().count() > 2
                && !lexicon.is_stopword(token)
        })
        .map(str::to_string)
        .collect()
}

/// Topics with at least one keyword appearing in the lowercased text
pub fn extract_topics(text: &str, lexicon: &Lexicon) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    lexicon
        .topics
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k.as_str())))
        .map(|(topic, _)| topic.clone())
        .collect()
}
