//! Language policy and compliance check
//!
//! Generated content must follow the requested content language. The check
//! here is a cheap stopword heuristic over the serialized content: it only
//! has to catch a generator that ignored the directive outright, not grade
//! fluency.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

const DEFAULT_LANGUAGE: &str = "English";

/// English stopwords used by the compliance heuristic.
const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "is", "are", "to", "of", "in", "for", "with", "that", "this", "you", "your",
    "from", "what", "when", "where", "which", "how", "why", "can", "could", "should", "will",
    "would", "about", "into", "through", "between", "because", "more", "most", "than", "then",
    "very", "also", "only", "not", "true", "false",
];

/// Share of English stopword tokens above which non-English content is
/// judged non-compliant.
const ENGLISH_RATIO_THRESHOLD: f64 = 0.2;

/// Maximum text fragments sampled from a content tree.
const MAX_FRAGMENTS: usize = 500;

/// Language requirements a build was requested with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePolicy {
    pub content_language: String,
    pub instruction_language: String,
    pub strict_target_language: bool,
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self {
            content_language: DEFAULT_LANGUAGE.to_string(),
            instruction_language: DEFAULT_LANGUAGE.to_string(),
            strict_target_language: true,
        }
    }
}

impl LanguagePolicy {
    /// Normalize free-form language names, falling back to English for
    /// blank input.
    pub fn resolve(
        content_language: &str,
        instruction_language: &str,
        strict_target_language: bool,
    ) -> Self {
        Self {
            content_language: normalize_language(content_language),
            instruction_language: normalize_language(instruction_language),
            strict_target_language,
        }
    }

    /// Whether the content language is English (no compliance check needed).
    pub fn is_english(&self) -> bool {
        let lower = self.content_language.to_lowercase();
        lower == "english" || lower == "en"
    }

    /// Prefix used by deterministic fallback artifacts so non-English
    /// placeholders are at least flagged with the expected language.
    pub fn wrap(&self, text: &str) -> String {
        if self.is_english() {
            text.to_string()
        } else {
            format!("[{}] {}", self.content_language, text)
        }
    }

    /// Judge whether a generated content tree violates the target language.
    ///
    /// Collects string fragments from the JSON tree and measures the share
    /// of English stopword tokens; above the threshold the content is judged
    /// non-compliant. Never fires for English targets or lenient policies.
    pub fn violates(&self, content: &JsonValue) -> bool {
        if !self.strict_target_language || self.is_english() {
            return false;
        }

        let mut fragments = Vec::new();
        collect_fragments(content, &mut fragments, MAX_FRAGMENTS);
        if fragments.is_empty() {
            return false;
        }

        english_token_ratio(&fragments) > ENGLISH_RATIO_THRESHOLD
    }
}

fn normalize_language(value: &str) -> String {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        DEFAULT_LANGUAGE.to_string()
    } else {
        cleaned.to_string()
    }
}

fn collect_fragments(value: &JsonValue, bucket: &mut Vec<String>, limit: usize) {
    if bucket.len() >= limit {
        return;
    }

    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.len() > 1 {
                bucket.push(trimmed.to_string());
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_fragments(item, bucket, limit);
                if bucket.len() >= limit {
                    return;
                }
            }
        }
        JsonValue::Object(map) => {
            for item in map.values() {
                collect_fragments(item, bucket, limit);
                if bucket.len() >= limit {
                    return;
                }
            }
        }
        _ => {}
    }
}

fn english_token_ratio(fragments: &[String]) -> f64 {
    let mut token_count = 0usize;
    let mut english_hits = 0usize;

    for fragment in fragments {
        for token in fragment
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphabetic() && c != '\'' && c != '-')
        {
            if token.is_empty() || !token.starts_with(|c: char| c.is_ascii_alphabetic()) {
                continue;
            }
            token_count += 1;
            if ENGLISH_STOPWORDS.contains(&token) {
                english_hits += 1;
            }
        }
    }

    if token_count == 0 {
        0.0
    } else {
        english_hits as f64 / token_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_defaults_blank_names() {
        let policy = LanguagePolicy::resolve("  ", "German", true);
        assert_eq!(policy.content_language, "English");
        assert_eq!(policy.instruction_language, "German");
    }

    #[test]
    fn test_english_target_never_violates() {
        let policy = LanguagePolicy::default();
        let content = json!({"summary": "the quick brown fox and the lazy dog"});
        assert!(!policy.violates(&content));
    }

    #[test]
    fn test_lenient_policy_never_violates() {
        let policy = LanguagePolicy::resolve("German", "German", false);
        let content = json!("this is clearly english text with the and of in it");
        assert!(!policy.violates(&content));
    }

    #[test]
    fn test_strict_non_english_flags_english_content() {
        let policy = LanguagePolicy::resolve("German", "English", true);
        let content = json!({
            "summary": "This is the summary and it is written in English for you",
            "points": ["because of this", "more of that"]
        });
        assert!(policy.violates(&content));
    }

    #[test]
    fn test_strict_non_english_accepts_target_content() {
        let policy = LanguagePolicy::resolve("German", "English", true);
        let content = json!({
            "summary": "Dieser Abschnitt behandelt Eigentum und Ausleihen",
            "points": ["Besitz verstehen", "Referenzen nutzen"]
        });
        assert!(!policy.violates(&content));
    }

    #[test]
    fn test_wrap_prefixes_non_english() {
        let policy = LanguagePolicy::resolve("Spanish", "English", true);
        assert_eq!(policy.wrap("practice set"), "[Spanish] practice set");

        let english = LanguagePolicy::default();
        assert_eq!(english.wrap("practice set"), "practice set");
    }
}
