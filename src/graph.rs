//! Graph builder: conversations plus similarity scores to nodes, edges and clusters.
//!
//! The builder is a pure function of its inputs and its reference time. Edges
//! are undirected: each unordered pair that meets the threshold yields one
//! edge, with `source` being whichever conversation comes first in the
//! similarity matrix.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::similarity::SimilarityMatrix;
use crate::types::{
    ColorScheme, Conversation, ConversationCluster, ConversationEmbedding, ConversationGraph,
    GraphEdge, GraphNode, VisualizationControls,
};
use crate::utils::top_by_frequency;
use crate::visualization::encoding::{
    chronological_color, cluster_color, initial_position, node_size, topic_color,
    DEFAULT_NODE_COLOR,
};

#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    reference_time: DateTime<Utc>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_reference_time(Utc::now())
    }

    /// Fixes "now" for the chronological color bands.
    pub fn with_reference_time(reference_time: DateTime<Utc>) -> Self {
        Self { reference_time }
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    pub fn build(
        &self,
        conversations: &[Conversation],
        embeddings: &[ConversationEmbedding],
        similarity_matrix: &SimilarityMatrix,
        controls: &VisualizationControls,
    ) -> ConversationGraph {
        let mut nodes = self.create_nodes(conversations, controls);
        let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges = create_edges(similarity_matrix, controls.similarity_threshold, &known);
        let clusters = identify_clusters(&mut nodes, &edges, embeddings);

        if controls.color_scheme == ColorScheme::Cluster {
            apply_cluster_colors(&mut nodes, &clusters);
        }

        info!(
            "Built graph with {} nodes, {} edges, {} clusters (threshold {})",
            nodes.len(),
            edges.len(),
            clusters.len(),
            controls.similarity_threshold
        );

        ConversationGraph {
            nodes,
            edges,
            clusters,
        }
    }

    fn create_nodes(
        &self,
        conversations: &[Conversation],
        controls: &VisualizationControls,
    ) -> Vec<GraphNode> {
        let mut seen = HashSet::with_capacity(conversations.len());
        let unique: Vec<&Conversation> = conversations
            .iter()
            .filter(|c| {
                let first = seen.insert(c.id.as_str());
                if !first {
                    warn!("Dropping duplicate node {}", c.id);
                }
                first
            })
            .collect();

        let total = unique.len();
        unique
            .into_iter()
            .enumerate()
            .map(|(index, conversation)| GraphNode {
                id: conversation.id.clone(),
                conversation: conversation.clone(),
                position: initial_position(index, total),
                size: node_size(conversation, controls.node_size),
                color: self.initial_color(conversation, controls.color_scheme),
                cluster: None,
            })
            .collect()
    }

    fn initial_color(&self, conversation: &Conversation, scheme: ColorScheme) -> String {
        let color = match scheme {
            ColorScheme::Chronological => {
                chronological_color(conversation.metadata.created_at, self.reference_time)
            }
            ColorScheme::Topic => topic_color(
                conversation
                    .metadata
                    .topics
                    .first()
                    .map(String::as_str)
                    .unwrap_or("general"),
            ),
            ColorScheme::Cluster => DEFAULT_NODE_COLOR,
        };
        color.to_string()
    }
}

fn create_edges(
    matrix: &SimilarityMatrix,
    threshold: f32,
    known: &HashSet<&str>,
) -> Vec<GraphEdge> {
    matrix
        .pairs()
        .filter(|(source, target, _, _)| {
            source != target && known.contains(source) && known.contains(target)
        })
        .filter(|(_, _, forward, backward)| *forward >= threshold && *backward >= threshold)
        .map(|(source, target, forward, backward)| {
            let similarity = forward.min(backward);
            GraphEdge {
                source: source.to_string(),
                target: target.to_string(),
                weight: similarity,
                similarity,
            }
        })
        .collect()
}

/// Connected components of the edge set with two or more members.
fn identify_clusters(
    nodes: &mut [GraphNode],
    edges: &[GraphEdge],
    embeddings: &[ConversationEmbedding],
) -> Vec<ConversationCluster> {
    let adjacency = build_adjacency(edges);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut components: Vec<Vec<String>> = Vec::new();

    for node in nodes.iter() {
        if visited.contains(node.id.as_str()) {
            continue;
        }

        let component = connected_component(&node.id, &adjacency, &mut visited);
        if component.len() >= 2 {
            components.push(component.into_iter().map(str::to_string).collect());
        }
    }

    let node_index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.clone(), i))
        .collect();
    let embedding_index: HashMap<&str, &ConversationEmbedding> = embeddings
        .iter()
        .map(|e| (e.conversation_id.as_str(), e))
        .collect();

    let mut clusters = Vec::with_capacity(components.len());
    for (n, members) in components.into_iter().enumerate() {
        let id = format!("cluster-{}", n);
        let member_conversations: Vec<&Conversation> = members
            .iter()
            .filter_map(|m| node_index.get(m).map(|&i| &nodes[i].conversation))
            .collect();
        let member_embeddings: Vec<&ConversationEmbedding> = members
            .iter()
            .filter_map(|m| embedding_index.get(m.as_str()).copied())
            .collect();

        let cluster = ConversationCluster {
            name: cluster_name(&member_conversations),
            description: cluster_description(&member_conversations),
            centroid: centroid(&member_embeddings),
            color: cluster_color(&id).to_string(),
            size: members.len(),
            conversations: members,
            id,
        };
        debug!("{} '{}' has {} members", cluster.id, cluster.name, cluster.size);

        for member in &cluster.conversations {
            if let Some(&i) = node_index.get(member) {
                nodes[i].cluster = Some(cluster.id.clone());
            }
        }
        clusters.push(cluster);
    }

    clusters
}

fn build_adjacency(edges: &[GraphEdge]) -> HashMap<&str, Vec<&str>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        adjacency
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }
    adjacency
}

/// Iterative depth-first search from `start`.
fn connected_component<'a>(
    start: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
) -> Vec<&'a str> {
    let mut component = Vec::new();
    let mut stack = vec![start];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        component.push(id);

        if let Some(neighbors) = adjacency.get(id) {
            for &neighbor in neighbors {
                if !visited.contains(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
    }

    component
}

fn centroid(embeddings: &[&ConversationEmbedding]) -> Vec<f32> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };

    let dimension = first.embedding.len();
    let mut sums = vec![0.0f64; dimension];
    for embedding in embeddings {
        for (sum, &value) in sums.iter_mut().zip(embedding.embedding.iter()) {
            *sum += value as f64;
        }
    }

    let count = embeddings.len() as f64;
    sums.into_iter().map(|sum| (sum / count) as f32).collect()
}

fn cluster_name(members: &[&Conversation]) -> String {
    let topics = members
        .iter()
        .flat_map(|c| c.metadata.topics.iter().map(String::as_str));
    let top: Vec<&str> = top_by_frequency(topics, 2)
        .into_iter()
        .map(|(topic, _)| topic)
        .collect();

    if top.is_empty() {
        format!("Cluster ({} conversations)", members.len())
    } else {
        top.join(" & ")
    }
}

fn cluster_description(members: &[&Conversation]) -> String {
    let total_messages: usize = members.iter().map(|c| c.metadata.message_count).sum();
    let average = if members.is_empty() {
        0
    } else {
        (total_messages as f64 / members.len() as f64).round() as usize
    };
    format!(
        "{} conversations with an average of {} messages each",
        members.len(),
        average
    )
}

fn apply_cluster_colors(nodes: &mut [GraphNode], clusters: &[ConversationCluster]) {
    let colors: HashMap<&str, &str> = clusters
        .iter()
        .map(|c| (c.id.as_str(), c.color.as_str()))
        .collect();

    for node in nodes.iter_mut() {
        if let Some(color) = node.cluster.as_deref().and_then(|id| colors.get(id)) {
            node.color = color.to_string();
        }
    }
}
