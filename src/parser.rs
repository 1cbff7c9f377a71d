//! Export parser: raw file bytes to an ordered list of raw conversations.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{ChatGraphError, Result};
use crate::types::RawConversation;

pub const INVALID_JSON_MESSAGE: &str =
    "Invalid JSON file. Please ensure you uploaded a valid chat export.";
pub const INVALID_SHAPE_MESSAGE: &str =
    "Invalid export format. Expected conversations array.";

/// Reads and parses an export file.
pub async fn parse_export_file(path: impl AsRef<Path>) -> Result<Vec<RawConversation>> {
    let path = path.as_ref();
    info!("Reading export file {:?}", path);
    let bytes = tokio::fs::read(path).await?;
    parse_export(&bytes)
}

/// Parses an export held in memory.
///
/// Accepts a bare array of conversations or an object with a `conversations`
/// array. Individual records that do not deserialize are skipped with a
/// warning so that one damaged conversation never sinks the file.
pub fn parse_export(bytes: &[u8]) -> Result<Vec<RawConversation>> {
    let data: Value = serde_json::from_slice(bytes).map_err(|e| {
        debug!("Export JSON rejected: {}", e);
        ChatGraphError::Format(INVALID_JSON_MESSAGE.to_string())
    })?;

    let records = match data {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("conversations") {
            Some(Value::Array(records)) => records,
            _ => return Err(ChatGraphError::Format(INVALID_SHAPE_MESSAGE.to_string())),
        },
        _ => return Err(ChatGraphError::Format(INVALID_SHAPE_MESSAGE.to_string())),
    };

    let total = records.len();
    let conversations: Vec<RawConversation> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            match serde_json::from_value::<RawConversation>(record) {
                Ok(conversation) => Some(conversation),
                Err(e) => {
                    warn!("Skipping unreadable conversation record {}: {}", index, e);
                    None
                }
            }
        })
        .collect();

    info!(
        "Parsed {} of {} conversation records",
        conversations.len(),
        total
    );
    Ok(conversations)
}

pub fn parse_export_str(text: &str) -> Result<Vec<RawConversation>> {
    parse_export(text.as_bytes())
}
