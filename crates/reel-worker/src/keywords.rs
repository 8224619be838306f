//! Search keyword extraction for stock media queries.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for"];

/// Function words dropped when tagging content words for alternative queries.
const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "nor", "so", "yet", "if", "then", "than", "in", "on",
    "at", "to", "for", "of", "by", "with", "from", "into", "onto", "over", "under", "about",
    "after", "before", "between", "through", "during", "without", "within", "upon", "as", "i",
    "me", "my", "we", "us", "our", "you", "your", "he", "him", "his", "she", "her", "it", "its",
    "they", "them", "their", "this", "that", "these", "those", "who", "whom", "whose", "which",
    "what", "is", "am", "are", "was", "were", "be", "been", "being", "do", "does", "did", "have",
    "has", "had", "will", "would", "shall", "should", "can", "could", "may", "might", "must",
    "not", "no", "all", "any", "some", "each", "every", "there", "here", "when", "where", "how",
    "why", "just", "also", "very", "too", "more", "most", "such", "own", "same", "other",
];

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn unique(words: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words.into_iter().filter(|w| seen.insert(w.clone())).collect()
}

/// Up to `limit` unique keywords from `text`, in order of appearance.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let words = tokens(text)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()) && w.chars().count() > 3);
    let mut keywords = unique(words);
    keywords.truncate(limit);
    keywords
}

/// The first stock query for a scene. Empty when the text has no keywords.
pub fn primary_query(text: &str, limit: usize) -> String {
    extract_keywords(text, limit).join(" ")
}

fn content_words(text: &str) -> Vec<String> {
    let words = tokens(text).into_iter().filter(|w| {
        w.chars().count() >= 3 && !w.ends_with("ly") && !FUNCTION_WORDS.contains(&w.as_str())
    });
    unique(words)
}

/// Fallback queries tried after the primary one: adjacent content-word
/// pairs, then single content words, then the whole lowercased text.
pub fn alternative_queries(text: &str) -> Vec<String> {
    let words = content_words(text);
    let mut queries: Vec<String> = words.windows(2).map(|pair| pair.join(" ")).collect();
    queries.extend(words.iter().cloned());

    let whole = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    if !whole.is_empty() {
        queries.push(whole);
    }
    unique(queries)
}

/// Primary query followed by the alternatives, without repeats or blanks.
pub fn search_queries(text: &str, limit: usize) -> Vec<String> {
    let primary = primary_query(text, limit);
    unique(std::iter::once(primary).chain(alternative_queries(text)))
        .into_iter()
        .filter(|q| !q.is_empty())
        .collect()
}
