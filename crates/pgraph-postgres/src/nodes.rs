//! Node repository
//!
//! Every method takes an explicit connection so the caller decides the
//! transaction scope.

use pgraph_core::codec::{encode_vector, properties_to_json};
use pgraph_core::{Node, NodeFilter, Result, TripletFilter};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::sync::Arc;

use crate::error::db_error;
use crate::schema::Tables;
use crate::sql::{push_properties_match, NodeRow, NODE_COLUMNS};

#[derive(Debug, Clone)]
pub struct NodeRepository {
    tables: Arc<Tables>,
}

impl NodeRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Insert-or-update statement for a single node
    ///
    /// Empty `text`/`name`, an empty property map and a missing embedding
    /// leave the stored values alone. The label always follows the caller.
    pub fn upsert_sql(&self) -> String {
        let nodes = &self.tables.nodes;
        format!(
            r#"
            INSERT INTO {nodes} (id, text, name, label, properties, embedding)
            VALUES ($1, $2, $3, $4, $5, $6::vector)
            ON CONFLICT (id) DO UPDATE SET
                text = COALESCE(NULLIF(EXCLUDED.text, ''), {nodes}.text),
                name = COALESCE(NULLIF(EXCLUDED.name, ''), {nodes}.name),
                label = EXCLUDED.label,
                properties = CASE
                    WHEN EXCLUDED.properties = '{{}}'::jsonb THEN {nodes}.properties
                    ELSE EXCLUDED.properties
                END,
                embedding = COALESCE(EXCLUDED.embedding, {nodes}.embedding),
                updated_at = NOW()
            "#
        )
    }

    pub async fn upsert(
        &self,
        conn: &mut PgConnection,
        nodes: &[Node],
        embedding_dim: usize,
    ) -> Result<()> {
        for node in nodes {
            node.validate(embedding_dim)?;
        }

        let sql = self.upsert_sql();
        for node in nodes {
            let embedding = node.embedding.as_deref().map(encode_vector).transpose()?;

            sqlx::query(&sql)
                .bind(&node.id)
                .bind(node.text())
                .bind(node.name())
                .bind(&node.label)
                .bind(properties_to_json(&node.properties))
                .bind(embedding)
                .execute(&mut *conn)
                .await
                .map_err(db_error("Failed to upsert node"))?;
        }

        tracing::debug!(count = nodes.len(), table = %self.tables.nodes, "Upserted nodes");
        Ok(())
    }

    /// Query for nodes matching `filter`, in insertion order
    pub fn select(&self, filter: &NodeFilter) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {NODE_COLUMNS} FROM {} WHERE TRUE",
            self.tables.nodes
        ));

        if let Some(ids) = filter.ids() {
            builder.push(" AND id = ANY(").push_bind(ids.to_vec()).push(")");
        }
        if let Some(properties) = filter.properties() {
            builder.push(" AND ");
            push_properties_match(&mut builder, "properties", properties);
        }

        builder.push(" ORDER BY created_at, id");
        builder
    }

    pub async fn get(&self, conn: &mut PgConnection, filter: &NodeFilter) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = self
            .select(filter)
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to get nodes"))?;

        rows.into_iter().map(Node::try_from).collect()
    }

    /// Which of `ids` are stored
    pub async fn existing_ids(
        &self,
        conn: &mut PgConnection,
        ids: &[String],
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE id = ANY($1)",
            self.tables.nodes
        ))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("Failed to check node ids"))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete a node and every relation touching it
    pub async fn delete(&self, conn: &mut PgConnection, id: &str) -> Result<()> {
        let ids = [id.to_string()];
        self.delete_ids(conn, &ids).await
    }

    async fn delete_ids(&self, conn: &mut PgConnection, ids: &[String]) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE source_id = ANY($1) OR target_id = ANY($1)",
            self.tables.relations
        ))
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to delete relations"))?;

        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.tables.nodes))
            .bind(ids)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to delete nodes"))?;

        Ok(())
    }

    /// Query for ids of nodes matched by name, id or properties
    ///
    /// `None` when the filter names no node criterion.
    pub fn select_matching_ids(
        &self,
        filter: &TripletFilter,
    ) -> Option<QueryBuilder<'static, Postgres>> {
        let names = filter.entity_names();
        let ids = filter.ids();
        let properties = filter.properties();
        if names.is_none() && ids.is_none() && properties.is_none() {
            return None;
        }

        let mut builder =
            QueryBuilder::new(format!("SELECT id FROM {} WHERE FALSE", self.tables.nodes));
        if let Some(names) = names {
            builder.push(" OR name = ANY(").push_bind(names.to_vec()).push(")");
        }
        if let Some(ids) = ids {
            builder.push(" OR id = ANY(").push_bind(ids.to_vec()).push(")");
        }
        if let Some(properties) = properties {
            builder.push(" OR ");
            push_properties_match(&mut builder, "properties", properties);
        }
        Some(builder)
    }

    /// Delete the nodes matched by `filter`, with their relations
    pub async fn delete_matching(
        &self,
        conn: &mut PgConnection,
        filter: &TripletFilter,
    ) -> Result<usize> {
        let Some(mut builder) = self.select_matching_ids(filter) else {
            return Ok(0);
        };

        let doomed: Vec<String> = builder
            .build_query_scalar()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to select nodes for deletion"))?;

        if !doomed.is_empty() {
            self.delete_ids(conn, &doomed).await?;
        }
        Ok(doomed.len())
    }

    /// Remove all relations, then all nodes
    pub async fn clear(&self, conn: &mut PgConnection) -> Result<()> {
        for table in [&self.tables.relations, &self.tables.nodes] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *conn)
                .await
                .map_err(db_error("Failed to clear graph"))?;
        }
        Ok(())
    }
}
