//! Common test utilities and fixtures

#![allow(dead_code)]

use chatgraph::config::ChatGraphConfig;
use chatgraph::demo::demo_export;
use chatgraph::processing::ProcessingService;
use chatgraph::types::{RawAuthor, RawContent, RawConversation, RawMessage, RawNode};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// The fixed "now" used for chronological colors in tests.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Offline service with a pinned reference time
pub fn offline_service() -> ProcessingService {
    ProcessingService::new(ChatGraphConfig::offline())
        .expect("offline config is always valid")
        .with_reference_time(reference_time())
}

pub fn demo_bytes() -> Vec<u8> {
    serde_json::to_vec(&demo_export()).expect("demo export serializes")
}

fn message(role: &str, text: &str, create_time: Option<f64>) -> RawMessage {
    RawMessage {
        id: None,
        author: RawAuthor {
            role: role.to_string(),
        },
        content: Some(RawContent {
            content_type: Some("text".to_string()),
            parts: vec![Value::String(text.to_string())],
        }),
        create_time,
    }
}

/// A linear conversation `root -> n0 -> n1 -> ...` with `current_node` at the end.
pub fn linear_conversation(id: &str, turns: &[(&str, &str)]) -> RawConversation {
    let mut mapping = HashMap::new();
    mapping.insert(
        "root".to_string(),
        RawNode {
            id: Some("root".to_string()),
            message: None,
            parent: None,
            children: if turns.is_empty() { vec![] } else { vec!["n0".to_string()] },
        },
    );

    for (i, (role, text)) in turns.iter().enumerate() {
        let node_id = format!("n{}", i);
        let parent = if i == 0 { "root".to_string() } else { format!("n{}", i - 1) };
        let children = if i + 1 < turns.len() {
            vec![format!("n{}", i + 1)]
        } else {
            vec![]
        };
        mapping.insert(
            node_id.clone(),
            RawNode {
                id: Some(node_id),
                message: Some(message(role, text, Some(1_700_000_000.0 + i as f64 * 30.0))),
                parent: Some(parent),
                children,
            },
        );
    }

    let current_node = if turns.is_empty() {
        "root".to_string()
    } else {
        format!("n{}", turns.len() - 1)
    };

    RawConversation {
        id: id.to_string(),
        title: Some(format!("Conversation {}", id)),
        create_time: Some(1_700_000_000.0),
        update_time: Some(1_700_000_600.0),
        mapping,
        current_node: Some(current_node),
    }
}

/// Two substantial turns, enough to pass the default filters.
pub fn valid_conversation(id: &str) -> RawConversation {
    linear_conversation(
        id,
        &[
            ("user", "How should I structure error handling in a medium sized Rust service?"),
            ("assistant", "Define one error enum per crate with thiserror, convert foreign errors with From, and use anyhow only at the binary edge where you just report failures."),
        ],
    )
}

/// Only a system prompt; dropped by the normalizer.
pub fn system_only_conversation(id: &str) -> RawConversation {
    linear_conversation(
        id,
        &[("system", "You are a helpful assistant that answers questions about gardening and plants.")],
    )
}
