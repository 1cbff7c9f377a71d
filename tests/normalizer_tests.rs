mod common;

use chatgraph::config::ChatGraphConfig;
use chatgraph::normalizer::{ConversationNormalizer, SkipReason, UNTITLED_CONVERSATION};
use chatgraph::parser::parse_export_str;
use chatgraph::text_analysis::{SentimentAnalyzer, TopicExtractor};
use chatgraph::types::{ProcessedMessage, Role, Sentiment};
use common::*;

struct FixedTopics(&'static [&'static str]);

impl TopicExtractor for FixedTopics {
    fn extract(&self, _messages: &[ProcessedMessage]) -> Vec<String> {
        self.0.iter().map(|t| t.to_string()).collect()
    }
}

struct AlwaysNegative;

impl SentimentAnalyzer for AlwaysNegative {
    fn analyze(&self, _messages: &[ProcessedMessage]) -> Sentiment {
        Sentiment::Negative
    }
}

#[test]
fn test_analyzers_are_pluggable() {
    let normalizer = ConversationNormalizer::default()
        .with_topic_extractor(Box::new(FixedTopics(&["alpha", "beta"])))
        .with_sentiment_analyzer(Box::new(AlwaysNegative));

    let conversation = normalizer
        .normalize_one(&valid_conversation("c1"))
        .unwrap();

    assert_eq!(conversation.metadata.topics, vec!["alpha", "beta"]);
    assert_eq!(conversation.metadata.sentiment, Sentiment::Negative);
}

#[test]
fn test_thresholds_come_from_config() {
    let strict = ConversationNormalizer::new(&ChatGraphConfig {
        min_messages: 3,
        ..ChatGraphConfig::offline()
    });

    let err = strict.normalize_one(&valid_conversation("c1")).unwrap_err();
    assert_eq!(err, SkipReason::TooFewMessages { found: 2, required: 3 });
    assert!(!err.is_malformed());
}

#[test]
fn test_parsed_export_normalizes() {
    let json = r#"{
        "conversations": [{
            "id": "from-json",
            "title": "   ",
            "create_time": 1700000000.5,
            "mapping": {
                "root": { "id": "root", "message": null, "parent": null, "children": ["u"] },
                "u": {
                    "id": "u",
                    "message": {
                        "author": { "role": "user" },
                        "content": { "content_type": "text", "parts": ["Could you recommend a good book about the history of mathematics for beginners?"] },
                        "create_time": 1700000001.0
                    },
                    "parent": "root",
                    "children": ["a"]
                },
                "a": {
                    "id": "a",
                    "message": {
                        "author": { "role": "assistant" },
                        "content": { "content_type": "text", "parts": ["Journey through Genius by William Dunham is a wonderful and approachable choice."] },
                        "create_time": 1700000002.0
                    },
                    "parent": "u",
                    "children": []
                }
            },
            "current_node": "a"
        }]
    }"#;

    let raw = parse_export_str(json).unwrap();
    let conversations = ConversationNormalizer::default().normalize(&raw);
    assert_eq!(conversations.len(), 1);

    let conversation = &conversations[0];
    assert_eq!(conversation.title, UNTITLED_CONVERSATION);
    assert_eq!(conversation.messages[0].role, Role::User);
    assert_eq!(conversation.messages[1].role, Role::Assistant);
    assert_eq!(conversation.metadata.created_at.timestamp_millis(), 1_700_000_000_500);
    assert_eq!(conversation.metadata.updated_at, conversation.metadata.created_at);
    assert_eq!(conversation.metadata.sentiment, Sentiment::Positive);
    assert!(conversation.summary.starts_with("Could you recommend"));
}

#[test]
fn test_word_and_message_counts_are_consistent() {
    let conversations = ConversationNormalizer::default()
        .normalize(&[valid_conversation("a"), valid_conversation("b")]);

    for conversation in conversations {
        let words: usize = conversation.messages.iter().map(|m| m.word_count).sum();
        assert_eq!(conversation.metadata.word_count, words);
        assert_eq!(conversation.metadata.message_count, conversation.messages.len());
        assert!(conversation
            .messages
            .iter()
            .all(|m| !m.content.is_empty()));
    }
}
