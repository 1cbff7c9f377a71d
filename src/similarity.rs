//! Cosine similarity and the pairwise similarity matrix.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::error::{ChatGraphError, Result};
use crate::types::ConversationEmbedding;

/// How raw cosine scores are stored in a matrix.
///
/// Provider vectors are compared as-is. The synthetic offline vectors are not
/// bounded the way real embeddings are, so their scores are mapped from
/// `[-1, 1]` onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityScale {
    Raw,
    Rescaled,
}

impl SimilarityScale {
    pub fn apply(&self, cosine: f32) -> f32 {
        match self {
            SimilarityScale::Raw => cosine,
            SimilarityScale::Rescaled => ((cosine + 1.0) / 2.0).clamp(0.0, 1.0),
        }
    }
}

/// Standard cosine similarity. Zero-magnitude input scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ChatGraphError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / magnitude) as f32)
}

/// Symmetric table of similarity scores, rows and columns in embedding order.
///
/// Serializes as a nested map `{ id: { id: score } }` with keys in matrix
/// order. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityMatrix {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    scores: Vec<Vec<f32>>,
}

impl SimilarityMatrix {
    /// Scores every pair. Self-pairs are exactly 1.0 and each unordered pair
    /// is computed once, so the table is symmetric bit for bit.
    /// An embedding whose id was already seen is left out of the table.
    pub fn build(embeddings: &[ConversationEmbedding], scale: SimilarityScale) -> Result<Self> {
        let mut seen = HashSet::with_capacity(embeddings.len());
        let embeddings: Vec<&ConversationEmbedding> = embeddings
            .iter()
            .filter(|e| {
                let first = seen.insert(e.conversation_id.as_str());
                if !first {
                    warn!("Ignoring duplicate embedding for {}", e.conversation_id);
                }
                first
            })
            .collect();

        let n = embeddings.len();
        let mut scores = vec![vec![0.0f32; n]; n];

        for i in 0..n {
            scores[i][i] = 1.0;
            for j in (i + 1)..n {
                let cosine = cosine_similarity(&embeddings[i].embedding, &embeddings[j].embedding)?;
                let score = scale.apply(cosine);
                scores[i][j] = score;
                scores[j][i] = score;
            }
        }

        let ids: Vec<String> = embeddings
            .iter()
            .map(|e| e.conversation_id.clone())
            .collect();
        debug!("Built {}x{} similarity matrix ({:?})", n, n, scale);

        Ok(Self::from_parts(ids, scores))
    }

    fn from_parts(ids: Vec<String>, scores: Vec<Vec<f32>>) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { ids, index, scores }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f32> {
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        Some(self.scores[i][j])
    }

    /// One row of the table as `(other id, score)` pairs in matrix order.
    pub fn row(&self, id: &str) -> Option<impl Iterator<Item = (&str, f32)> + '_> {
        let i = *self.index.get(id)?;
        Some(
            self.ids
                .iter()
                .zip(self.scores[i].iter())
                .map(|(other, &score)| (other.as_str(), score)),
        )
    }

    /// Every unordered pair of distinct ids, in row-major order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f32, f32)> + '_ {
        let n = self.ids.len();
        (0..n).flat_map(move |i| {
            ((i + 1)..n).map(move |j| {
                (
                    self.ids[i].as_str(),
                    self.ids[j].as_str(),
                    self.scores[i][j],
                    self.scores[j][i],
                )
            })
        })
    }
}

// ============================================================================
// Serialization
// ============================================================================

impl Serialize for SimilarityMatrix {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.ids.len()))?;
        for (id, scores) in self.ids.iter().zip(self.scores.iter()) {
            map.serialize_entry(
                id,
                &Row {
                    ids: &self.ids,
                    scores,
                },
            )?;
        }
        map.end()
    }
}

struct Row<'a> {
    ids: &'a [String],
    scores: &'a [f32],
}

impl Serialize for Row<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.ids.len()))?;
        for (id, score) in self.ids.iter().zip(self.scores.iter()) {
            map.serialize_entry(id, score)?;
        }
        map.end()
    }
}

/// Map entries in document order.
struct OrderedEntries<V>(Vec<(String, V)>);

struct OrderedEntriesVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedEntriesVisitor<V> {
    type Value = OrderedEntries<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map keyed by conversation id")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry::<String, V>()? {
            entries.push(entry);
        }
        Ok(OrderedEntries(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedEntries<V> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(OrderedEntriesVisitor(PhantomData))
    }
}

impl<'de> Deserialize<'de> for SimilarityMatrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let OrderedEntries(rows) =
            OrderedEntries::<OrderedEntries<f32>>::deserialize(deserializer)?;

        let ids: Vec<String> = rows.iter().map(|(id, _)| id.clone()).collect();
        let scores = {
            let position: HashMap<&str, usize> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            if position.len() != ids.len() {
                return Err(<D::Error as de::Error>::custom(
                    "duplicate conversation id in similarity matrix",
                ));
            }

            let mut scores = Vec::with_capacity(rows.len());
            for (id, OrderedEntries(row)) in &rows {
                let mut values: Vec<Option<f32>> = vec![None; ids.len()];
                for (other, score) in row {
                    let j = position.get(other.as_str()).copied().ok_or_else(|| {
                        <D::Error as de::Error>::custom(format!(
                            "row {} scores unknown id {}",
                            id, other
                        ))
                    })?;
                    values[j] = Some(*score);
                }
                let values = values
                    .into_iter()
                    .collect::<Option<Vec<f32>>>()
                    .ok_or_else(|| {
                        <D::Error as de::Error>::custom(format!("row {} is incomplete", id))
                    })?;
                scores.push(values);
            }
            scores
        };

        Ok(Self::from_parts(ids, scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmbeddingMetadata;
    use chrono::Utc;

    fn embedding(id: &str, values: Vec<f32>) -> ConversationEmbedding {
        ConversationEmbedding {
            conversation_id: id.to_string(),
            embedding: values,
            metadata: EmbeddingMetadata {
                word_count: 0,
                topic_keywords: vec![],
                generated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ChatGraphError::DimensionMismatch { left: 3, right: 2 }));
    }

    #[test]
    fn test_rescale() {
        assert_eq!(SimilarityScale::Rescaled.apply(-1.0), 0.0);
        assert_eq!(SimilarityScale::Rescaled.apply(0.0), 0.5);
        assert_eq!(SimilarityScale::Rescaled.apply(1.0), 1.0);
        assert_eq!(SimilarityScale::Raw.apply(-0.25), -0.25);
    }

    #[test]
    fn test_matrix_symmetry_and_diagonal() {
        let embeddings = vec![
            embedding("a", vec![1.0, 0.2, 0.0]),
            embedding("b", vec![0.3, 1.0, 0.1]),
            embedding("c", vec![-0.5, 0.1, 0.9]),
        ];

        let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();
        assert_eq!(matrix.len(), 3);
        for a in matrix.ids() {
            assert_eq!(matrix.get(a, a), Some(1.0));
            for b in matrix.ids() {
                assert_eq!(matrix.get(a, b), matrix.get(b, a));
            }
        }
        assert!(matrix.get("a", "zzz").is_none());
    }

    #[test]
    fn test_matrix_scales() {
        let embeddings = vec![
            embedding("a", vec![1.0, 0.0]),
            embedding("b", vec![-1.0, 0.0]),
        ];

        let raw = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();
        let rescaled = SimilarityMatrix::build(&embeddings, SimilarityScale::Rescaled).unwrap();
        assert!((raw.get("a", "b").unwrap() + 1.0).abs() < 1e-6);
        assert!(rescaled.get("a", "b").unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_matrix_mismatch_is_fatal() {
        let embeddings = vec![embedding("a", vec![1.0, 0.0]), embedding("b", vec![1.0])];
        assert!(SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).is_err());
    }

    #[test]
    fn test_pairs_visit_each_unordered_pair_once() {
        let embeddings = vec![
            embedding("a", vec![1.0, 0.0]),
            embedding("b", vec![0.0, 1.0]),
            embedding("c", vec![1.0, 1.0]),
        ];
        let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();
        let pairs: Vec<(&str, &str)> = matrix.pairs().map(|(a, b, _, _)| (a, b)).collect();
        assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    }

    #[test]
    fn test_duplicate_embeddings_keep_first() {
        let embeddings = vec![
            embedding("a", vec![1.0, 0.0]),
            embedding("b", vec![0.0, 1.0]),
            embedding("a", vec![0.0, 1.0]),
        ];
        let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();

        assert_eq!(matrix.ids().to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert!(matrix.get("a", "b").unwrap().abs() < 1e-6);
        assert!(matrix.pairs().all(|(a, b, _, _)| a != b));
    }

    #[test]
    fn test_serializes_as_nested_map() {
        let embeddings = vec![embedding("b", vec![1.0, 0.0]), embedding("a", vec![0.5, 0.5])];
        let matrix = SimilarityMatrix::build(&embeddings, SimilarityScale::Raw).unwrap();

        let value = serde_json::to_value(&matrix).unwrap();
        assert_eq!(value["b"]["b"], 1.0);
        assert_eq!(value["a"]["a"], 1.0);
        assert!(value["a"]["b"].is_number());
        assert!(value.get("ids").is_none());

        // Matrix order survives a text round trip and lookups work straight away
        let json = serde_json::to_string(&matrix).unwrap();
        assert!(json.find("\"b\"").unwrap() < json.find("\"a\"").unwrap());
        let restored: SimilarityMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, matrix);
        assert!(restored.contains("a"));
        assert_eq!(restored.get("a", "b"), matrix.get("a", "b"));
    }

    #[test]
    fn test_deserialize_rejects_ragged_rows() {
        let incomplete = r#"{"a": {"a": 1.0, "b": 0.5}, "b": {"b": 1.0}}"#;
        assert!(serde_json::from_str::<SimilarityMatrix>(incomplete).is_err());

        let unknown = r#"{"a": {"a": 1.0, "z": 0.5}}"#;
        assert!(serde_json::from_str::<SimilarityMatrix>(unknown).is_err());
    }
}
