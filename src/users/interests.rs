//! Interest extraction: naive keyword tags from event text.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::model::InterestProfile;

/// Upper bound on tags returned per event.
pub const MAX_TAGS: usize = 5;

/// Shortest token considered a tag.
const MIN_TAG_LEN: usize = 3;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9+#\-]*").expect("static regex"));

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "back", "been", "before",
    "being", "both", "but", "can", "come", "could", "day", "did", "does", "don", "during", "each",
    "event", "events", "every", "for", "from", "get", "had", "has", "have", "her", "here", "his",
    "how", "into", "its", "join", "just", "like", "more", "most", "much", "must", "new", "not",
    "now", "off", "one", "only", "other", "our", "out", "over", "own", "same", "see", "session",
    "she", "should", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "time", "too", "under", "until", "upon", "very",
    "was", "way", "webinar", "well", "were", "what", "when", "where", "which", "while", "who",
    "why", "will", "with", "would", "year", "you", "your",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Derive up to [`MAX_TAGS`] lower-cased keyword tags from free text.
///
/// Tokens are ranked by frequency; ties break alphabetically so the same text
/// always yields the same tags.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for m in WORD_RE.find_iter(text) {
        let word = m.as_str().trim_matches('-').to_lowercase();
        if word.chars().count() < MIN_TAG_LEN || is_stopword(&word) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_TAGS).map(|(w, _)| w).collect()
}

/// Fold freshly extracted tags into a profile.
pub fn merge(profile: &mut InterestProfile, tags: &BTreeSet<String>) {
    profile.merge(tags);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_are_sorted_for_binary_search() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn extracts_frequent_keywords_lowercased() {
        let tags = extract_tags(
            "Rust for Cloud Engineers: Rust ownership, async Rust, and cloud deployment.",
        );
        assert!(tags.contains("rust"));
        assert!(tags.contains("cloud"));
        assert!(!tags.contains("for"));
        assert!(!tags.contains("and"));
    }

    #[test]
    fn result_is_bounded() {
        let tags = extract_tags(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima",
        );
        assert_eq!(tags.len(), MAX_TAGS);
    }

    #[test]
    fn ties_break_alphabetically() {
        let tags = extract_tags("zebra yak xenon walrus vulture umbrella tiger");
        let expected: BTreeSet<String> = ["tiger", "umbrella", "vulture", "walrus", "xenon"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn numbers_and_short_tokens_are_dropped() {
        let tags = extract_tags("AI in 2025: ML at scale");
        assert!(!tags.contains("ai"));
        assert!(!tags.contains("2025"));
        assert!(tags.contains("scale"));
    }

    #[test]
    fn empty_text_yields_no_tags() {
        assert!(extract_tags("").is_empty());
        assert!(extract_tags("the and for with").is_empty());
    }

    #[test]
    fn merge_accumulates_across_events() {
        let mut profile = InterestProfile::new();
        let tags = extract_tags("Kubernetes security deep dive: kubernetes operators");
        merge(&mut profile, &tags);
        merge(&mut profile, &tags);
        assert_eq!(profile.count("kubernetes"), 2);
        assert_eq!(profile.count("security"), 2);
    }
}
