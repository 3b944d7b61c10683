//! Row types and shared SQL fragments
//!
//! Every row read from the node table is decoded here into a classified
//! `Node` with stripped properties.

use chrono::{DateTime, Utc};
use pgraph_core::codec::{self, properties_from_json};
use pgraph_core::{Node, NodeKind, Properties, Relation, Result, Triplet};
use serde_json::Value;
use sqlx::{FromRow, Postgres, QueryBuilder};

/// Node columns; the embedding is read in pgvector text form
pub const NODE_COLUMNS: &str =
    "id, text, name, label, properties, embedding::text AS embedding, created_at, updated_at";

/// Node row from database
#[derive(Debug, FromRow)]
pub struct NodeRow {
    pub id: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub label: String,
    pub properties: Value,
    pub embedding: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = pgraph_core::GraphError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let embedding = row
            .embedding
            .as_deref()
            .map(codec::decode_vector)
            .transpose()?;

        Ok(Node {
            id: row.id,
            label: row.label,
            kind: NodeKind::classify(row.text, row.name),
            properties: properties_from_json(row.properties),
            embedding,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// Select list for a `(source, edge, target)` join
///
/// `edge` is the alias of the relation (or path) rows; endpoints must be
/// joined as `s` and `t`. Endpoint embeddings are not selected.
pub fn triplet_projection(edge: &str) -> String {
    format!(
        r#"
        s.id AS s_id, s.text AS s_text, s.name AS s_name, s.label AS s_label,
        s.properties AS s_properties, s.created_at AS s_created_at, s.updated_at AS s_updated_at,
        {edge}.label AS r_label, {edge}.source_id AS r_source_id,
        {edge}.target_id AS r_target_id, {edge}.properties AS r_properties,
        t.id AS t_id, t.text AS t_text, t.name AS t_name, t.label AS t_label,
        t.properties AS t_properties, t.created_at AS t_created_at, t.updated_at AS t_updated_at
        "#
    )
}

/// Triplet row from a relation join
#[derive(Debug, FromRow)]
pub struct TripletRow {
    s_id: String,
    s_text: Option<String>,
    s_name: Option<String>,
    s_label: String,
    s_properties: Value,
    s_created_at: DateTime<Utc>,
    s_updated_at: DateTime<Utc>,
    r_label: String,
    r_source_id: String,
    r_target_id: String,
    r_properties: Value,
    t_id: String,
    t_text: Option<String>,
    t_name: Option<String>,
    t_label: String,
    t_properties: Value,
    t_created_at: DateTime<Utc>,
    t_updated_at: DateTime<Utc>,
}

impl From<TripletRow> for Triplet {
    fn from(row: TripletRow) -> Self {
        Triplet {
            source: Node {
                id: row.s_id,
                label: row.s_label,
                kind: NodeKind::classify(row.s_text, row.s_name),
                properties: properties_from_json(row.s_properties),
                embedding: None,
                created_at: Some(row.s_created_at),
                updated_at: Some(row.s_updated_at),
            },
            relation: Relation {
                label: row.r_label,
                source_id: row.r_source_id,
                target_id: row.r_target_id,
                properties: properties_from_json(row.r_properties),
            },
            target: Node {
                id: row.t_id,
                label: row.t_label,
                kind: NodeKind::classify(row.t_text, row.t_name),
                properties: properties_from_json(row.t_properties),
                embedding: None,
                created_at: Some(row.t_created_at),
                updated_at: Some(row.t_updated_at),
            },
        }
    }
}

/// Push `(col -> k1 = v1 AND col -> k2 = v2 ...)` for a JSONB column
///
/// Values compare as JSONB, so `30` and `"30"` are different.
pub fn push_properties_match(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    properties: &Properties,
) {
    builder.push("(");
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            builder.push(" AND ");
        }
        builder
            .push(format!("{column} -> "))
            .push_bind(key.clone())
            .push(" = ")
            .push_bind(value.clone());
    }
    builder.push(")");
}
