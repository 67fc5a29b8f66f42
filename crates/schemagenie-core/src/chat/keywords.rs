//! Keyword extraction for catalog lookups

use std::collections::HashSet;

/// Minimum keyword length in characters
const MIN_KEYWORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "and", "any", "are", "attribute",
    "attributes", "because", "been", "before", "being", "between", "both", "but", "can",
    "contain", "contains", "could", "describe", "did", "does", "doing", "down", "each", "explain",
    "few", "field", "fields", "find", "for", "from", "further", "give", "had", "has", "have",
    "having", "her", "here", "hers", "him", "his", "how", "into", "its", "itself", "just", "list",
    "many", "more", "most", "much", "must", "not", "now", "off", "once", "only", "other", "our",
    "ours", "out", "over", "own", "please", "same", "schema", "schemas", "she", "should", "show",
    "some", "such", "tell", "than", "that", "the", "their", "theirs", "them", "then", "there",
    "these", "they", "this", "those", "through", "too", "under", "until", "use", "used", "uses",
    "using", "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your", "yours",
];

/// Lowercase search keywords from a question, in order of first appearance
///
/// Words keep underscores and hyphens (`sample_id`, `co2-level`). Short
/// words and stopwords are dropped.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    question
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map(|word| word.trim_matches('-'))
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|word| !STOPWORDS.contains(word))
        .filter(|word| seen.insert(word.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords() {
        assert_eq!(
            extract_keywords("Which schemas contain a pH or soil texture attribute?"),
            vec!["soil", "texture"]
        );
    }

    #[test]
    fn test_identifiers_kept_whole() {
        assert_eq!(
            extract_keywords("What is sample_id in co2-level data?"),
            vec!["sample_id", "co2-level", "data"]
        );
    }

    #[test]
    fn test_deduplicated_and_lowercased() {
        assert_eq!(extract_keywords("Depth DEPTH depth units"), vec!["depth", "units"]);
    }

    #[test]
    fn test_short_and_stop_words_dropped() {
        assert!(extract_keywords("is it on the?").is_empty());
        assert!(extract_keywords("").is_empty());
        assert_eq!(extract_keywords("--- turbidity ---"), vec!["turbidity"]);
    }

    #[test]
    fn test_unicode_words() {
        assert_eq!(extract_keywords("Échantillon de sol"), vec!["échantillon", "sol"]);
    }
}
