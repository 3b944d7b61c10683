//! Cosine similarity search over node embeddings

use pgraph_core::codec::encode_vector;
use pgraph_core::{Node, Result, ScoredNode, VectorQuery};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::sync::Arc;

use crate::error::db_error;
use crate::schema::Tables;
use crate::sql::{NodeRow, NODE_COLUMNS};

#[derive(Debug, FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    node: NodeRow,
    distance: f64,
}

#[derive(Debug, Clone)]
pub struct VectorSearch {
    tables: Arc<Tables>,
    embedding_dim: usize,
}

impl VectorSearch {
    pub fn new(tables: Arc<Tables>, embedding_dim: usize) -> Self {
        Self {
            tables,
            embedding_dim,
        }
    }

    /// Ranking query for an encoded embedding
    ///
    /// Nodes without an embedding, and zero vectors (NaN distance), are
    /// never ranked. Equal distances are ordered by id.
    pub fn select(
        &self,
        vector: String,
        top_k: usize,
        ids: Option<&[String]>,
    ) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT * FROM (SELECT {NODE_COLUMNS}, embedding <=> "
        ));
        builder
            .push_bind(vector)
            .push(format!(
                "::vector AS distance FROM {} WHERE embedding IS NOT NULL",
                self.tables.nodes
            ));
        if let Some(ids) = ids {
            builder.push(" AND id = ANY(").push_bind(ids.to_vec()).push(")");
        }
        builder
            .push(") ranked WHERE distance <> 'NaN'::float8 ORDER BY distance, id LIMIT ")
            .push_bind(i64::try_from(top_k).unwrap_or(i64::MAX));
        builder
    }

    /// Up to `top_k` nodes, most similar first; `score = 1 - distance`
    pub async fn search(
        &self,
        conn: &mut PgConnection,
        query: &VectorQuery,
    ) -> Result<Vec<ScoredNode>> {
        let embedding = query.validate(self.embedding_dim)?;
        let ids = query.ids.as_deref().filter(|ids| !ids.is_empty());

        let rows: Vec<ScoredRow> = self
            .select(encode_vector(embedding)?, query.top_k, ids)
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to run vector query"))?;

        rows.into_iter()
            .map(|row| {
                Ok(ScoredNode {
                    node: Node::try_from(row.node)?,
                    score: (1.0 - row.distance) as f32,
                })
            })
            .collect()
    }
}
