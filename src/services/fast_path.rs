//! Greeting shortcut
//! Trivial salutations get a fixed reply without touching retrieval or
//! generation.

use once_cell::sync::Lazy;

const GREETING_REPLY: &str = "Hello! I'm Nura, your healthcare assistant. \
How can I help you with your health questions today?";

static GREETING_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "hi",
        "hii",
        "hiii",
        "hello",
        "helo",
        "hey",
        "heya",
        "yo",
        "greetings",
        "good morning",
        "good afternoon",
        "good evening",
        "good day",
    ]
});

pub struct FastPathClassifier;

impl FastPathClassifier {
    /// Pure greeting check. Matching is case- and punctuation-insensitive:
    /// a phrase matches the whole input or a prefix of it followed by
    /// whitespace. Unmatched input always falls through to the full
    /// pipeline.
    pub fn classify(text: &str) -> Option<&'static str> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return None;
        }

        for phrase in GREETING_PHRASES.iter() {
            if normalized == *phrase {
                return Some(GREETING_REPLY);
            }
            if let Some(rest) = normalized.strip_prefix(phrase) {
                if rest.starts_with(' ') {
                    return Some(GREETING_REPLY);
                }
            }
        }

        None
    }
}

/// Lowercase, drop punctuation, collapse whitespace runs.
fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch.is_whitespace() {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_greeting_matches() {
        assert!(FastPathClassifier::classify("Hii").is_some());
        assert!(FastPathClassifier::classify("hello").is_some());
        assert!(FastPathClassifier::classify("Good Morning").is_some());
    }

    #[test]
    fn test_punctuation_and_case_ignored() {
        assert!(FastPathClassifier::classify("Hi!").is_some());
        assert!(FastPathClassifier::classify("HELLO...").is_some());
        assert!(FastPathClassifier::classify("  hey,  ").is_some());
    }

    #[test]
    fn test_greeting_prefix_matches() {
        assert!(FastPathClassifier::classify("Hello there").is_some());
        assert!(FastPathClassifier::classify("good morning doctor").is_some());
    }

    #[test]
    fn test_non_greetings_fall_through() {
        assert!(FastPathClassifier::classify("What is uric acid?").is_none());
        assert!(FastPathClassifier::classify("high fever since yesterday").is_none());
        assert!(FastPathClassifier::classify("history of diabetes").is_none());
        assert!(FastPathClassifier::classify("").is_none());
        assert!(FastPathClassifier::classify("  !!  ").is_none());
    }

    #[test]
    fn test_reply_is_canonical() {
        let first = FastPathClassifier::classify("hi").unwrap();
        let second = FastPathClassifier::classify("HELLO!!").unwrap();
        assert_eq!(first, second);
    }
}
