use chatgraph::{
    graph::GraphBuilder,
    normalizer::ConversationNormalizer,
    similarity::{cosine_similarity, SimilarityMatrix, SimilarityScale},
    types::{
        Conversation, ConversationEmbedding, ConversationMetadata, EmbeddingMetadata,
        RawAuthor, RawContent, RawConversation, RawMessage, RawNode, Sentiment,
        VisualizationControls,
    },
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

fn conversation(id: String) -> Conversation {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    Conversation {
        title: id.clone(),
        id,
        summary: String::new(),
        messages: vec![],
        metadata: ConversationMetadata {
            created_at: now,
            updated_at: now,
            message_count: 2,
            word_count: 40,
            topics: vec!["topic".to_string()],
            sentiment: Sentiment::Neutral,
        },
    }
}

fn embedding(id: String, values: Vec<f32>) -> ConversationEmbedding {
    ConversationEmbedding {
        conversation_id: id,
        embedding: values,
        metadata: EmbeddingMetadata {
            word_count: 40,
            topic_keywords: vec![],
            generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        },
    }
}

/// Between 1 and 12 vectors of a shared dimension, with bounded components.
fn vector_set() -> impl Strategy<Value = Vec<Vec<f32>>> {
    (2usize..=16).prop_flat_map(|dim| {
        prop::collection::vec(prop::collection::vec(-1.0f32..1.0, dim), 1..=12)
    })
}

fn inputs(vectors: Vec<Vec<f32>>) -> (Vec<Conversation>, Vec<ConversationEmbedding>) {
    let conversations = (0..vectors.len())
        .map(|i| conversation(format!("c{}", i)))
        .collect();
    let embeddings = vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| embedding(format!("c{}", i), v))
        .collect();
    (conversations, embeddings)
}

fn build_graph(
    vectors: Vec<Vec<f32>>,
    threshold: f32,
) -> chatgraph::types::ConversationGraph {
    let (conversations, embeddings) = inputs(vectors);
    let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();
    GraphBuilder::with_reference_time(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()).build(
        &conversations,
        &embeddings,
        &matrix,
        &VisualizationControls {
            similarity_threshold: threshold,
            ..Default::default()
        },
    )
}

// Similarity properties
proptest! {
    #[test]
    fn test_cosine_is_symmetric(
        (a, b) in (1usize..=64).prop_flat_map(|dim| (
            prop::collection::vec(-10.0f32..10.0, dim),
            prop::collection::vec(-10.0f32..10.0, dim),
        ))
    ) {
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        prop_assert_eq!(ab, ba);
        prop_assert!((-1.0001..=1.0001).contains(&ab));
    }

    #[test]
    fn test_self_similarity_is_one(v in prop::collection::vec(0.01f32..10.0, 1..=64)) {
        let s = cosine_similarity(&v, &v).unwrap();
        prop_assert!((s - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error(
        a in prop::collection::vec(-1.0f32..1.0, 1..=8),
        extra in 1usize..=4,
    ) {
        let b = vec![0.5f32; a.len() + extra];
        prop_assert!(cosine_similarity(&a, &b).is_err());
    }

    #[test]
    fn test_matrix_symmetric_with_unit_diagonal(vectors in vector_set()) {
        let (_, embeddings) = inputs(vectors);
        let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Rescaled).unwrap();

        for a in matrix.ids() {
            prop_assert_eq!(matrix.get(a, a), Some(1.0));
            for b in matrix.ids() {
                prop_assert_eq!(matrix.get(a, b), matrix.get(b, a));
                let score = matrix.get(a, b).unwrap();
                prop_assert!((0.0..=1.0).contains(&score));
            }
        }
    }
}

// Graph builder properties
proptest! {
    #[test]
    fn test_raising_threshold_never_adds_edges(
        vectors in vector_set(),
        low in 0.1f32..0.9,
        delta in 0.0f32..0.5,
    ) {
        let high = (low + delta).min(1.0);
        let loose = build_graph(vectors.clone(), low);
        let strict = build_graph(vectors, high);

        let loose_edges: HashSet<(String, String)> = loose
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        prop_assert!(strict.edges.len() <= loose.edges.len());
        for edge in &strict.edges {
            prop_assert!(loose_edges.contains(&(edge.source.clone(), edge.target.clone())));
        }
    }

    #[test]
    fn test_builder_is_pure(vectors in vector_set(), threshold in 0.1f32..1.0) {
        prop_assert_eq!(
            build_graph(vectors.clone(), threshold),
            build_graph(vectors, threshold)
        );
    }

    #[test]
    fn test_cluster_invariants(vectors in vector_set(), threshold in 0.1f32..1.0) {
        let graph = build_graph(vectors, threshold);

        let mut seen = HashSet::new();
        for cluster in &graph.clusters {
            prop_assert!(cluster.size >= 2);
            prop_assert_eq!(cluster.size, cluster.conversations.len());
            for member in &cluster.conversations {
                // Clusters are disjoint
                prop_assert!(seen.insert(member.clone()));
                let node = graph.node(member).unwrap();
                prop_assert_eq!(node.cluster.as_deref(), Some(cluster.id.as_str()));
            }
        }

        // Every edge joins two members of the same cluster
        for edge in &graph.edges {
            prop_assert!(edge.similarity >= threshold);
            prop_assert_ne!(&edge.source, &edge.target);
            let source = graph.node(&edge.source).unwrap();
            let target = graph.node(&edge.target).unwrap();
            prop_assert!(source.cluster.is_some());
            prop_assert_eq!(&source.cluster, &target.cluster);
        }

        // Unclustered nodes have no edges
        for node in graph.nodes.iter().filter(|n| n.cluster.is_none()) {
            prop_assert!(!graph
                .edges
                .iter()
                .any(|e| e.source == node.id || e.target == node.id));
        }
    }
}

fn raw_conversation(id: usize, turns: &[(bool, String)]) -> RawConversation {
    let mut mapping = HashMap::new();
    let ids: Vec<String> = (0..turns.len()).map(|i| format!("n{}", i)).collect();
    for (i, (from_user, text)) in turns.iter().enumerate() {
        mapping.insert(
            ids[i].clone(),
            RawNode {
                id: Some(ids[i].clone()),
                message: Some(RawMessage {
                    id: None,
                    author: RawAuthor {
                        role: if *from_user { "user" } else { "assistant" }.to_string(),
                    },
                    content: Some(RawContent {
                        content_type: Some("text".to_string()),
                        parts: vec![serde_json::Value::String(text.clone())],
                    }),
                    create_time: Some(1_700_000_000.0 + i as f64),
                }),
                parent: if i == 0 { None } else { Some(ids[i - 1].clone()) },
                children: ids.get(i + 1).cloned().into_iter().collect(),
            },
        );
    }

    RawConversation {
        id: format!("conv-{}", id),
        title: None,
        create_time: None,
        update_time: None,
        mapping,
        current_node: ids.last().cloned(),
    }
}

// Normalizer properties
proptest! {
    #[test]
    fn test_normalizer_output_meets_filters(
        exports in prop::collection::vec(
            prop::collection::vec((any::<bool>(), "[a-z ]{0,60}"), 0..6),
            1..8
        )
    ) {
        let raw: Vec<RawConversation> = exports
            .iter()
            .enumerate()
            .map(|(i, turns)| raw_conversation(i, turns))
            .collect();

        let conversations = ConversationNormalizer::default().normalize(&raw);
        prop_assert!(conversations.len() <= raw.len());
        for conversation in &conversations {
            prop_assert!(conversation.messages.len() >= 2);
            prop_assert!(conversation.metadata.word_count >= 20);
            prop_assert!(conversation.metadata.topics.len() <= 5);
            prop_assert!(conversation.messages.iter().all(|m| !m.content.is_empty()));
        }
    }
}
