//! Conversation normalizer: raw export trees to filtered, annotated conversations.
//!
//! The export stores each conversation as a map of nodes linked both ways
//! (`parent` and `children`). Nodes are loaded into an arena indexed by id and
//! walked with explicit stacks, so arbitrarily deep trees never touch the call
//! stack and malformed cycles terminate.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ChatGraphConfig;
use crate::text_analysis::{
    summarize, KeywordTopicExtractor, LexiconSentimentAnalyzer, SentimentAnalyzer,
    TopicExtractor,
};
use crate::types::{
    Conversation, ConversationMetadata, ProcessedMessage, RawConversation, RawMessage, RawNode,
    Role,
};
use crate::utils::count_words;

pub const UNTITLED_CONVERSATION: &str = "Untitled Conversation";

/// Why a conversation did not survive normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("conversation has no current node")]
    MissingCurrentNode,

    #[error("current node {0} is not in the mapping")]
    UnknownCurrentNode(String),

    #[error("only {found} usable messages (need {required})")]
    TooFewMessages { found: usize, required: usize },

    #[error("only {found} words (need {required})")]
    TooFewWords { found: usize, required: usize },
}

impl SkipReason {
    /// Structural problems in the export, as opposed to conversations that
    /// are simply too short to be interesting.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            SkipReason::MissingCurrentNode | SkipReason::UnknownCurrentNode(_)
        )
    }
}

// ============================================================================
// Chain reconstruction
// ============================================================================

struct NodeArena<'a> {
    nodes: Vec<&'a RawNode>,
    index: HashMap<&'a str, usize>,
}

impl<'a> NodeArena<'a> {
    fn new(mapping: &'a HashMap<String, RawNode>) -> Self {
        let mut nodes = Vec::with_capacity(mapping.len());
        let mut index = HashMap::with_capacity(mapping.len());
        for (id, node) in mapping {
            index.insert(id.as_str(), nodes.len());
            nodes.push(node);
        }
        Self { nodes, index }
    }

    fn slot(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Follows parent links up from `start`. A parent that is missing from the
    /// mapping, or one already seen on the way up, ends the walk.
    fn find_root(&self, start: usize) -> usize {
        let mut visited = HashSet::new();
        let mut current = start;
        visited.insert(current);

        while let Some(parent) = self.nodes[current]
            .parent
            .as_deref()
            .and_then(|id| self.slot(id))
        {
            if !visited.insert(parent) {
                debug!("Parent cycle detected; treating last reached node as root");
                break;
            }
            current = parent;
        }

        current
    }

    /// Pre-order walk from `root`, children in array order.
    fn messages_from(&self, root: usize) -> Vec<&'a RawMessage> {
        let mut messages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(slot) = stack.pop() {
            if !visited.insert(slot) {
                continue;
            }

            let node = self.nodes[slot];
            if let Some(message) = &node.message {
                messages.push(message);
            }

            // Reversed so the first child is popped first
            for child in node.children.iter().rev() {
                if let Some(child_slot) = self.slot(child) {
                    if !visited.contains(&child_slot) {
                        stack.push(child_slot);
                    }
                }
            }
        }

        messages
    }
}

/// Every message under the root of `current_node`'s tree, in depth-first order.
pub fn reconstruct_chain(raw: &RawConversation) -> Result<Vec<&RawMessage>, SkipReason> {
    let current = raw
        .current_node
        .as_deref()
        .ok_or(SkipReason::MissingCurrentNode)?;

    let arena = NodeArena::new(&raw.mapping);
    let start = arena
        .slot(current)
        .ok_or_else(|| SkipReason::UnknownCurrentNode(current.to_string()))?;

    let root = arena.find_root(start);
    Ok(arena.messages_from(root))
}

// ============================================================================
// Normalizer
// ============================================================================

pub struct ConversationNormalizer {
    min_messages: usize,
    min_word_count: usize,
    summary_max_chars: usize,
    topic_extractor: Box<dyn TopicExtractor>,
    sentiment_analyzer: Box<dyn SentimentAnalyzer>,
}

impl ConversationNormalizer {
    pub fn new(config: &ChatGraphConfig) -> Self {
        Self {
            min_messages: config.min_messages,
            min_word_count: config.min_word_count,
            summary_max_chars: config.summary_max_chars,
            topic_extractor: Box::new(KeywordTopicExtractor::new(
                config.topic_count,
                config.min_topic_word_len,
            )),
            sentiment_analyzer: Box::new(LexiconSentimentAnalyzer),
        }
    }

    pub fn with_topic_extractor(mut self, extractor: Box<dyn TopicExtractor>) -> Self {
        self.topic_extractor = extractor;
        self
    }

    pub fn with_sentiment_analyzer(mut self, analyzer: Box<dyn SentimentAnalyzer>) -> Self {
        self.sentiment_analyzer = analyzer;
        self
    }

    /// Normalizes every record, skipping (and logging) the ones that fail.
    /// Ids are unique in the output: the first usable record with a given id
    /// wins and later ones are dropped.
    pub fn normalize(&self, raw: &[RawConversation]) -> Vec<Conversation> {
        let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
        let conversations: Vec<Conversation> = raw
            .iter()
            .filter_map(|record| match self.normalize_one(record) {
                Ok(conversation) => Some(conversation),
                Err(reason) if reason.is_malformed() => {
                    warn!("Skipping conversation {}: {}", record.id, reason);
                    None
                }
                Err(reason) => {
                    debug!("Filtered conversation {}: {}", record.id, reason);
                    None
                }
            })
            .filter(|conversation| {
                let first = seen.insert(conversation.id.clone());
                if !first {
                    warn!("Skipping duplicate conversation id {}", conversation.id);
                }
                first
            })
            .collect();

        info!(
            "Normalized {} of {} conversations",
            conversations.len(),
            raw.len()
        );
        conversations
    }

    pub fn normalize_one(&self, raw: &RawConversation) -> Result<Conversation, SkipReason> {
        let chain = reconstruct_chain(raw)?;
        let fallback_time = raw.create_time.and_then(timestamp_from_secs);

        let messages: Vec<ProcessedMessage> = chain
            .into_iter()
            .filter_map(|message| process_message(message, fallback_time))
            .collect();

        if messages.len() < self.min_messages {
            return Err(SkipReason::TooFewMessages {
                found: messages.len(),
                required: self.min_messages,
            });
        }

        let word_count: usize = messages.iter().map(|m| m.word_count).sum();
        if word_count < self.min_word_count {
            return Err(SkipReason::TooFewWords {
                found: word_count,
                required: self.min_word_count,
            });
        }

        let created_at = fallback_time
            .or_else(|| messages.first().map(|m| m.timestamp))
            .unwrap_or_default();
        let updated_at = raw
            .update_time
            .and_then(timestamp_from_secs)
            .unwrap_or(created_at);

        let title = raw
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNTITLED_CONVERSATION)
            .to_string();

        let metadata = ConversationMetadata {
            created_at,
            updated_at,
            message_count: messages.len(),
            word_count,
            topics: self.topic_extractor.extract(&messages),
            sentiment: self.sentiment_analyzer.analyze(&messages),
        };

        Ok(Conversation {
            id: raw.id.clone(),
            title,
            summary: summarize(&messages, self.summary_max_chars),
            messages,
            metadata,
        })
    }
}

impl Default for ConversationNormalizer {
    fn default() -> Self {
        Self::new(&ChatGraphConfig::default())
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        // system prompts and tool output are not part of the dialogue
        _ => None,
    }
}

fn process_message(
    message: &RawMessage,
    fallback_time: Option<DateTime<Utc>>,
) -> Option<ProcessedMessage> {
    let role = parse_role(&message.author.role)?;
    let content = message.joined_text();
    if content.is_empty() {
        return None;
    }

    let timestamp = message
        .create_time
        .and_then(timestamp_from_secs)
        .or(fallback_time)
        .unwrap_or_default();

    Some(ProcessedMessage {
        role,
        word_count: count_words(&content),
        content,
        timestamp,
    })
}

/// Export timestamps are fractional Unix seconds.
pub fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()
}
