//! Visual encoding rules: node sizes, seed positions and colors.

use chrono::{DateTime, Utc};
use std::f64::consts::PI;

use crate::types::{Conversation, NodeSizeMode, Position};

pub const BASE_NODE_SIZE: f64 = 4.0;
pub const MAX_NODE_SIZE: f64 = 20.0;
pub const LAYOUT_RADIUS: f64 = 100.0;

pub const BLUE: &str = "#3B82F6";
pub const RED: &str = "#EF4444";
pub const GREEN: &str = "#10B981";
pub const YELLOW: &str = "#F59E0B";
pub const PURPLE: &str = "#8B5CF6";
pub const ORANGE: &str = "#F97316";
pub const CYAN: &str = "#06B6D4";
pub const LIME: &str = "#84CC16";
pub const PINK: &str = "#EC4899";
pub const GRAY: &str = "#6B7280";

/// Unclustered nodes under the cluster scheme, and unknown topics.
pub const DEFAULT_NODE_COLOR: &str = GRAY;

pub const CLUSTER_PALETTE: [&str; 10] = [
    BLUE, RED, GREEN, YELLOW, PURPLE, ORANGE, CYAN, LIME, PINK, GRAY,
];

const TOPIC_COLORS: &[(&str, &str)] = &[
    ("code", BLUE),
    ("programming", BLUE),
    ("tech", BLUE),
    ("help", GREEN),
    ("question", GREEN),
    ("learn", PURPLE),
    ("study", PURPLE),
    ("work", YELLOW),
    ("project", YELLOW),
    ("general", GRAY),
];

pub fn node_size(conversation: &Conversation, mode: NodeSizeMode) -> f64 {
    let metadata = &conversation.metadata;
    match mode {
        NodeSizeMode::MessageCount => {
            (BASE_NODE_SIZE + metadata.message_count as f64 * 0.5).min(MAX_NODE_SIZE)
        }
        NodeSizeMode::WordCount => {
            (BASE_NODE_SIZE + metadata.word_count as f64 * 0.01).min(MAX_NODE_SIZE)
        }
        NodeSizeMode::Uniform => BASE_NODE_SIZE,
    }
}

/// Golden-angle spiral over a sphere. Only a starting point for the layout.
pub fn initial_position(index: usize, total: usize) -> Position {
    let total = total.max(1) as f64;
    let offset = index as f64 + 0.5;
    let phi = (1.0 - 2.0 * offset / total).clamp(-1.0, 1.0).acos();
    let theta = PI * (1.0 + 5f64.sqrt()) * offset;

    Position {
        x: LAYOUT_RADIUS * phi.sin() * theta.cos(),
        y: LAYOUT_RADIUS * phi.sin() * theta.sin(),
        z: LAYOUT_RADIUS * phi.cos(),
    }
}

/// Age bands: under 30 days, 90 days, 180 days, and older.
pub fn chronological_color(created_at: DateTime<Utc>, now: DateTime<Utc>) -> &'static str {
    let days = (now - created_at).num_milliseconds() as f64 / 86_400_000.0;
    if days < 30.0 {
        GREEN
    } else if days < 90.0 {
        YELLOW
    } else if days < 180.0 {
        ORANGE
    } else {
        RED
    }
}

pub fn topic_color(topic: &str) -> &'static str {
    let topic = topic.to_lowercase();
    TOPIC_COLORS
        .iter()
        .find(|(keyword, _)| topic.contains(keyword))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_NODE_COLOR)
}

/// Stable color for a cluster id.
pub fn cluster_color(cluster_id: &str) -> &'static str {
    let hash: u64 = cluster_id.chars().map(|c| c as u64).sum();
    CLUSTER_PALETTE[(hash % CLUSTER_PALETTE.len() as u64) as usize]
}
