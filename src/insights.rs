//! Aggregate figures over a built graph.

use serde::{Deserialize, Serialize};

use crate::types::{ConversationGraph, ProcessingStats, Sentiment};
use crate::utils::top_by_frequency;

pub const TOP_TOPIC_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphInsights {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub total_words: usize,
    pub avg_messages_per_conversation: usize,
    pub avg_words_per_conversation: usize,
    pub top_topics: Vec<TopicCount>,
    pub sentiment: SentimentDistribution,
    pub avg_cluster_size: usize,
    pub total_clusters: usize,
}

impl GraphInsights {
    /// `None` for a graph without nodes.
    pub fn from_graph(graph: &ConversationGraph) -> Option<Self> {
        if graph.nodes.is_empty() {
            return None;
        }

        let conversations: Vec<_> = graph.nodes.iter().map(|n| &n.conversation).collect();
        let total_messages: usize = conversations.iter().map(|c| c.metadata.message_count).sum();
        let total_words: usize = conversations.iter().map(|c| c.metadata.word_count).sum();

        let top_topics = top_by_frequency(
            conversations
                .iter()
                .flat_map(|c| c.metadata.topics.iter().map(String::as_str)),
            TOP_TOPIC_LIMIT,
        )
        .into_iter()
        .map(|(topic, count)| TopicCount {
            topic: topic.to_string(),
            count,
        })
        .collect();

        let mut sentiment = SentimentDistribution::default();
        for conversation in &conversations {
            match conversation.metadata.sentiment {
                Sentiment::Positive => sentiment.positive += 1,
                Sentiment::Neutral => sentiment.neutral += 1,
                Sentiment::Negative => sentiment.negative += 1,
            }
        }

        let cluster_sizes: Vec<usize> = graph.clusters.iter().map(|c| c.size).collect();

        Some(Self {
            total_conversations: conversations.len(),
            total_messages,
            total_words,
            avg_messages_per_conversation: rounded_mean(total_messages, conversations.len()),
            avg_words_per_conversation: rounded_mean(total_words, conversations.len()),
            top_topics,
            sentiment,
            avg_cluster_size: rounded_mean(cluster_sizes.iter().sum(), cluster_sizes.len()),
            total_clusters: graph.clusters.len(),
        })
    }
}

impl ProcessingStats {
    pub fn from_graph(graph: &ConversationGraph) -> Self {
        let total_clusters = graph.clusters.len();
        let cluster_total: usize = graph.clusters.iter().map(|c| c.size).sum();

        Self {
            total_conversations: graph.nodes.len(),
            total_clusters,
            total_connections: graph.edges.len(),
            average_cluster_size: rounded_mean(cluster_total, total_clusters),
            largest_cluster: graph.clusters.iter().map(|c| c.size).max().unwrap_or(0),
        }
    }
}

fn rounded_mean(total: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Conversation, ConversationCluster, ConversationMetadata, GraphEdge, GraphNode, Position,
    };
    use chrono::Utc;

    fn node(id: &str, messages: usize, words: usize, topics: &[&str], sentiment: Sentiment) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            conversation: Conversation {
                id: id.to_string(),
                title: id.to_string(),
                summary: String::new(),
                messages: vec![],
                metadata: ConversationMetadata {
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    message_count: messages,
                    word_count: words,
                    topics: topics.iter().map(|t| t.to_string()).collect(),
                    sentiment,
                },
            },
            position: Position { x: 0.0, y: 0.0, z: 0.0 },
            size: 4.0,
            color: "#6B7280".to_string(),
            cluster: None,
        }
    }

    fn cluster(id: &str, members: &[&str]) -> ConversationCluster {
        ConversationCluster {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            conversations: members.iter().map(|m| m.to_string()).collect(),
            centroid: vec![],
            color: "#3B82F6".to_string(),
            size: members.len(),
        }
    }

    fn graph() -> ConversationGraph {
        ConversationGraph {
            nodes: vec![
                node("a", 4, 100, &["rust", "async"], Sentiment::Positive),
                node("b", 3, 50, &["rust"], Sentiment::Neutral),
                node("c", 2, 30, &["bread"], Sentiment::Negative),
                node("d", 2, 31, &["bread", "rust"], Sentiment::Positive),
                node("e", 2, 40, &[], Sentiment::Neutral),
            ],
            edges: vec![
                GraphEdge { source: "a".into(), target: "b".into(), weight: 0.9, similarity: 0.9 },
                GraphEdge { source: "b".into(), target: "d".into(), weight: 0.8, similarity: 0.8 },
                GraphEdge { source: "c".into(), target: "e".into(), weight: 0.75, similarity: 0.75 },
            ],
            clusters: vec![cluster("cluster-0", &["a", "b", "d"]), cluster("cluster-1", &["c", "e"])],
        }
    }

    #[test]
    fn test_insights() {
        let insights = GraphInsights::from_graph(&graph()).unwrap();
        assert_eq!(insights.total_conversations, 5);
        assert_eq!(insights.total_messages, 13);
        assert_eq!(insights.total_words, 251);
        assert_eq!(insights.avg_messages_per_conversation, 3);
        assert_eq!(insights.avg_words_per_conversation, 50);
        assert_eq!(insights.top_topics[0], TopicCount { topic: "rust".to_string(), count: 3 });
        assert_eq!(insights.top_topics[1].topic, "bread");
        assert_eq!(insights.top_topics.len(), 3);
        assert_eq!(
            insights.sentiment,
            SentimentDistribution { positive: 2, neutral: 2, negative: 1 }
        );
        assert_eq!(insights.avg_cluster_size, 3);
        assert_eq!(insights.total_clusters, 2);
    }

    #[test]
    fn test_insights_empty_graph() {
        assert!(GraphInsights::from_graph(&ConversationGraph::default()).is_none());
    }

    #[test]
    fn test_processing_stats() {
        let stats = ProcessingStats::from_graph(&graph());
        assert_eq!(stats.total_conversations, 5);
        assert_eq!(stats.total_clusters, 2);
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.average_cluster_size, 3);
        assert_eq!(stats.largest_cluster, 3);

        let empty = ProcessingStats::from_graph(&ConversationGraph::default());
        assert_eq!(empty.average_cluster_size, 0);
        assert_eq!(empty.largest_cluster, 0);
    }
}
