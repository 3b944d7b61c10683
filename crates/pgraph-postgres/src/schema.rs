//! Schema manager
//!
//! Provisions the node and relation tables once, at store construction.
//! Before touching any table the engine is probed so that an unreachable
//! server and a missing pgvector extension fail with different errors.

use pgraph_core::config::is_identifier;
use pgraph_core::{ConfigError, GraphError, Result};
use sqlx::PgPool;

use crate::error::db_error;

/// Names of the two backing tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub nodes: String,
    pub relations: String,
}

impl Tables {
    /// Validated table names; both end up interpolated into SQL
    pub fn new(nodes: impl Into<String>, relations: impl Into<String>) -> Result<Self> {
        let tables = Self {
            nodes: nodes.into(),
            relations: relations.into(),
        };
        for name in [&tables.nodes, &tables.relations] {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidValue {
                    key: "table".to_string(),
                    value: name.clone(),
                }
                .into());
            }
        }
        Ok(tables)
    }
}

/// Creates, and optionally drops, the graph tables
pub struct SchemaManager<'a> {
    tables: &'a Tables,
    embedding_dim: usize,
}

impl<'a> SchemaManager<'a> {
    pub fn new(tables: &'a Tables, embedding_dim: usize) -> Self {
        Self {
            tables,
            embedding_dim,
        }
    }

    /// DDL for both tables and their indexes, in dependency order
    pub fn create_statements(&self) -> Vec<String> {
        let nodes = &self.tables.nodes;
        let relations = &self.tables.relations;
        let dim = self.embedding_dim;

        vec![
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {nodes} (
                    id VARCHAR PRIMARY KEY,
                    text TEXT,
                    name VARCHAR,
                    label VARCHAR NOT NULL DEFAULT 'node',
                    properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    embedding vector({dim}),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#
            ),
            format!("CREATE INDEX IF NOT EXISTS {nodes}_name_idx ON {nodes} (name)"),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {relations} (
                    id BIGSERIAL PRIMARY KEY,
                    label VARCHAR NOT NULL,
                    source_id VARCHAR NOT NULL REFERENCES {nodes} (id),
                    target_id VARCHAR NOT NULL REFERENCES {nodes} (id),
                    properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE (source_id, target_id, label)
                )
                "#
            ),
            format!("CREATE INDEX IF NOT EXISTS {relations}_source_idx ON {relations} (source_id)"),
            format!("CREATE INDEX IF NOT EXISTS {relations}_target_idx ON {relations} (target_id)"),
        ]
    }

    /// Relations go first because they reference nodes
    pub fn drop_statements(&self) -> Vec<String> {
        vec![
            format!("DROP TABLE IF EXISTS {}", self.tables.relations),
            format!("DROP TABLE IF EXISTS {}", self.tables.nodes),
        ]
    }

    /// Fail fast on an unreachable engine or a missing `vector` type
    pub async fn check_availability(pool: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|e| GraphError::ConnectionError(format!("PostgreSQL is not reachable: {e}")))?;

        // Needs CREATE privilege on the database; a preinstalled extension is fine
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
        {
            tracing::warn!(error = %e, "Could not create the vector extension");
        }

        sqlx::query("SELECT '[1]'::vector")
            .execute(pool)
            .await
            .map_err(|e| {
                GraphError::CapabilityError(format!(
                    "the pgvector extension is not installed or not usable: {e}"
                ))
            })?;

        Ok(())
    }

    /// Create the tables, dropping existing ones first when asked
    ///
    /// `drop_existing` destroys data and exists for test isolation.
    pub async fn provision(&self, pool: &PgPool, drop_existing: bool) -> Result<()> {
        let mut tx = pool
            .begin()
            .await
            .map_err(db_error("Schema init failed"))?;

        if drop_existing {
            tracing::warn!(
                nodes = %self.tables.nodes,
                relations = %self.tables.relations,
                "Dropping existing graph tables"
            );
            for statement in self.drop_statements() {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Schema drop failed"))?;
            }
        }

        for statement in self.create_statements() {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Schema init failed"))?;
        }

        tx.commit().await.map_err(db_error("Schema init failed"))?;

        tracing::info!(
            nodes = %self.tables.nodes,
            relations = %self.tables.relations,
            embedding_dim = self.embedding_dim,
            "Graph schema ready"
        );
        Ok(())
    }
}
