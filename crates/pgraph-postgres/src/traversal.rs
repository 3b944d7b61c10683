//! Bounded-depth graph expansion
//!
//! Paths are grown one hop at a time from the seed nodes along outgoing
//! relations. Cycles are not pruned: a relation reached again at a greater
//! depth is returned again, and the depth bound ends the recursion.
//!
//! Within one depth, paths keep the order of their parents, then the
//! insertion order of their last relation.

use pgraph_core::{Result, TraversalQuery, Triplet};
use sqlx::PgConnection;
use std::sync::Arc;

use crate::error::db_error;
use crate::schema::Tables;
use crate::sql::{triplet_projection, TripletRow};

#[derive(Debug, Clone)]
pub struct TraversalEngine {
    tables: Arc<Tables>,
}

impl TraversalEngine {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Recursive query; binds seeds, max depth, limit and ignored labels
    pub fn traversal_sql(&self) -> String {
        let relations = &self.tables.relations;
        let nodes = &self.tables.nodes;
        let projection = triplet_projection("p");

        format!(
            r#"
            WITH RECURSIVE paths AS (
                SELECT r.label, r.source_id, r.target_id, r.properties,
                       1 AS depth, ARRAY[r.id] AS path
                FROM {relations} r
                WHERE r.source_id = ANY($1)
                  AND NOT (r.label = ANY($4))
                UNION ALL
                SELECT r.label, r.source_id, r.target_id, r.properties,
                       p.depth + 1, p.path || r.id
                FROM {relations} r
                JOIN paths p ON r.source_id = p.target_id
                WHERE p.depth < $2
                  AND NOT (r.label = ANY($4))
            )
            SELECT {projection}
            FROM paths p
            JOIN {nodes} s ON p.source_id = s.id
            JOIN {nodes} t ON p.target_id = t.id
            ORDER BY p.depth, p.path
            LIMIT $3
            "#
        )
    }

    pub async fn traverse(
        &self,
        conn: &mut PgConnection,
        query: &TraversalQuery,
    ) -> Result<Vec<Triplet>> {
        if query.is_trivial() {
            return Ok(Vec::new());
        }

        let max_depth = i32::try_from(query.max_depth).unwrap_or(i32::MAX);
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let rows: Vec<TripletRow> = sqlx::query_as(&self.traversal_sql())
            .bind(&query.seed_ids)
            .bind(max_depth)
            .bind(limit)
            .bind(&query.ignore_rels)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to traverse graph"))?;

        tracing::debug!(
            seeds = query.seed_ids.len(),
            max_depth = query.max_depth,
            paths = rows.len(),
            "Traversal finished"
        );

        Ok(rows.into_iter().map(Triplet::from).collect())
    }
}
