//! Lightweight per-conversation features.
//!
//! Topics come from keyword frequency and sentiment from a word lexicon. Both
//! sit behind small traits so a statistical implementation can replace them
//! without touching the normalizer.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::types::{ProcessedMessage, Role, Sentiment};
use crate::utils::{top_by_frequency, truncate_chars};

pub const EMPTY_SUMMARY: &str = "Empty conversation";
pub const SUMMARY_UNAVAILABLE: &str = "Conversation summary unavailable";

/// English function words never reported as topics. The list goes past the
/// usual pronouns and auxiliaries to cover question and filler words of four
/// or more letters, which would otherwise pass the length filter.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "can", "this", "that", "these",
        "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
        "what", "when", "where", "which", "while", "there", "their", "your", "yours", "about",
        "from", "into", "than", "then", "just", "also", "some", "such", "very", "more", "most",
        "other", "only", "over", "here", "how", "why",
    ]
    .into_iter()
    .collect()
});

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "wonderful", "fantastic", "love", "like", "enjoy",
    "happy", "pleased", "satisfied",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "hate", "dislike", "angry", "frustrated",
    "disappointed", "sad", "upset",
];

fn lexicon_pattern(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternation)).expect("lexicon pattern is valid")
}

static POSITIVE_PATTERN: Lazy<Regex> = Lazy::new(|| lexicon_pattern(POSITIVE_WORDS));
static NEGATIVE_PATTERN: Lazy<Regex> = Lazy::new(|| lexicon_pattern(NEGATIVE_WORDS));

fn combined_lowercase_text(messages: &[ProcessedMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub trait TopicExtractor: Send + Sync {
    fn extract(&self, messages: &[ProcessedMessage]) -> Vec<String>;
}

pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, messages: &[ProcessedMessage]) -> Sentiment;
}

/// Most frequent non-stopword words of a minimum length.
#[derive(Debug, Clone)]
pub struct KeywordTopicExtractor {
    max_topics: usize,
    word_pattern: Regex,
}

impl KeywordTopicExtractor {
    pub fn new(max_topics: usize, min_word_len: usize) -> Self {
        let word_pattern = Regex::new(&format!(r"\b\w{{{},}}\b", min_word_len.max(1)))
            .expect("word pattern is valid");
        Self {
            max_topics,
            word_pattern,
        }
    }
}

impl Default for KeywordTopicExtractor {
    fn default() -> Self {
        Self::new(5, 4)
    }
}

impl TopicExtractor for KeywordTopicExtractor {
    fn extract(&self, messages: &[ProcessedMessage]) -> Vec<String> {
        let text = combined_lowercase_text(messages);
        let words = self
            .word_pattern
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|word| !STOPWORDS.contains(word));

        top_by_frequency(words, self.max_topics)
            .into_iter()
            .map(|(word, _)| word.to_string())
            .collect()
    }
}

/// Compares whole-word hits against fixed positive and negative word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentimentAnalyzer;

impl LexiconSentimentAnalyzer {
    pub fn scores(&self, messages: &[ProcessedMessage]) -> (usize, usize) {
        let text = combined_lowercase_text(messages);
        (
            POSITIVE_PATTERN.find_iter(&text).count(),
            NEGATIVE_PATTERN.find_iter(&text).count(),
        )
    }
}

impl SentimentAnalyzer for LexiconSentimentAnalyzer {
    fn analyze(&self, messages: &[ProcessedMessage]) -> Sentiment {
        let (positive, negative) = self.scores(messages);
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }
}

/// First user message, cut to `max_chars` with a trailing ellipsis.
pub fn summarize(messages: &[ProcessedMessage], max_chars: usize) -> String {
    if messages.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }

    match messages.iter().find(|m| m.role == Role::User) {
        Some(first) => {
            let summary = truncate_chars(&first.content, max_chars);
            if summary.len() < first.content.len() {
                format!("{}...", summary)
            } else {
                summary.to_string()
            }
        }
        None => SUMMARY_UNAVAILABLE.to_string(),
    }
}
