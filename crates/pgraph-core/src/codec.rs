//! Identity & property codec
//!
//! Derives node identifiers, normalizes property maps read back from storage,
//! and converts embeddings to and from the pgvector text form (`[1,2,3]`).

use serde_json::Value;

use crate::{GraphError, Properties, Result};

/// Deterministic id for an entity node
pub fn entity_id(label: &str, name: &str) -> String {
    format!("{label}/{name}")
}

/// Truthiness of a stored property value
///
/// `0` and `false` count as empty. Callers storing zero or false flags will
/// not see them on read.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Copy of `properties` without empty values
pub fn strip_empty(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(_, v)| is_truthy(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Decode a stored JSON column into stripped properties
///
/// Anything other than a JSON object decodes as an empty map.
pub fn properties_from_json(value: Value) -> Properties {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| is_truthy(v)).collect(),
        _ => Properties::new(),
    }
}

/// Encode properties for a JSON column
pub fn properties_to_json(properties: &Properties) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// True when every filter pair equals the stored value
pub fn properties_match(stored: &Properties, filter: &Properties) -> bool {
    filter
        .iter()
        .all(|(k, v)| stored.get(k).is_some_and(|s| values_equal(s, v)))
}

/// JSONB equality: numbers compare by value, so `30` equals `30.0`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Reject embeddings of the wrong length or with non-finite components
pub fn validate_embedding(embedding: &[f32], embedding_dim: usize) -> Result<()> {
    if embedding.len() != embedding_dim {
        return Err(GraphError::ValidationError(format!(
            "embedding has dimension {}, store expects {embedding_dim}",
            embedding.len()
        )));
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(GraphError::ValidationError(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// pgvector text form of an embedding
pub fn encode_vector(embedding: &[f32]) -> Result<String> {
    serde_json::to_string(embedding)
        .map_err(|e| GraphError::ValidationError(format!("Failed to encode embedding: {e}")))
}

/// Parse the pgvector text form
pub fn decode_vector(text: &str) -> Result<Vec<f32>> {
    serde_json::from_str(text)
        .map_err(|e| GraphError::DatabaseError(format!("Malformed stored embedding: {e}")))
}

/// Cosine distance, `None` when either vector has zero norm
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(1.0 - dot / (na * nb))
}
