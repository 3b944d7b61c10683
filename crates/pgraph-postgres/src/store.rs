//! PostgreSQL property graph store
//!
//! Author: hephaex@gmail.com
//!
//! Owns the connection pool and composes the repositories. Writes run in a
//! transaction that commits only when the whole call succeeds; reads use a
//! single pooled connection.

use async_trait::async_trait;
use pgraph_core::{
    GraphError, Node, NodeFilter, PropertyGraphStore, Relation, Result, ScoredNode, StoreConfig,
    TraversalQuery, Triplet, TripletFilter, VectorQuery,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::db_error;
use crate::nodes::NodeRepository;
use crate::relations::RelationRepository;
use crate::schema::{SchemaManager, Tables};
use crate::traversal::TraversalEngine;
use crate::vector::VectorSearch;

/// Property graph store backed by PostgreSQL with pgvector
#[derive(Debug, Clone)]
pub struct PostgresGraphStore {
    pool: PgPool,
    tables: Arc<Tables>,
    embedding_dim: usize,
    nodes: NodeRepository,
    relations: RelationRepository,
    traversal: TraversalEngine,
    vectors: VectorSearch,
}

impl PostgresGraphStore {
    /// Connect, check the engine and provision the tables
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut options = PgConnectOptions::from_str(&config.database_url)
            .map_err(|e| GraphError::ConnectionError(format!("Invalid database URL: {e}")))?;
        if !config.log_queries {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                GraphError::ConnectionError(format!("PostgreSQL connection failed: {e}"))
            })?;

        tracing::info!(
            pool_size = config.pool_size,
            embedding_dim = config.embedding_dim,
            "Connected to PostgreSQL"
        );

        Self::from_pool(pool, config).await
    }

    /// Build the store on an existing pool
    pub async fn from_pool(pool: PgPool, config: &StoreConfig) -> Result<Self> {
        let tables = Arc::new(Tables::new(&config.node_table, &config.relation_table)?);

        SchemaManager::check_availability(&pool).await?;
        SchemaManager::new(&tables, config.embedding_dim)
            .provision(&pool, config.drop_existing_tables)
            .await?;

        Ok(Self {
            pool,
            embedding_dim: config.embedding_dim,
            nodes: NodeRepository::new(tables.clone()),
            relations: RelationRepository::new(tables.clone()),
            traversal: TraversalEngine::new(tables.clone()),
            vectors: VectorSearch::new(tables.clone(), config.embedding_dim),
            tables,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))
    }

    /// Run caller-supplied SQL and return one JSON object per row
    ///
    /// `params` bind to `$1..$n` in order. Scalars bind with their natural
    /// type; arrays and objects bind as JSONB. A JSON `null` binds as a
    /// text NULL, so compare it against other column types through an
    /// explicit cast (`$1::int`).
    pub async fn structured_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        let wrapped = wrap_structured(sql);
        let mut query = sqlx::query_scalar::<_, Value>(&wrapped);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64()),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.clone()),
            };
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        let rows = query
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error("Structured query failed"))?;

        match rows {
            Value::Array(rows) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }
}

/// Aggregate any row set into a single JSONB array
///
/// The statement becomes a CTE, which also admits `INSERT`/`UPDATE`/`DELETE
/// ... RETURNING`. It sits on its own lines so a trailing `--` comment
/// cannot swallow the closing parenthesis.
fn wrap_structured(sql: &str) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    format!(
        "WITH q AS (\n{sql}\n)\nSELECT COALESCE(jsonb_agg(to_jsonb(q)), '[]'::jsonb) FROM q"
    )
}

#[async_trait]
impl PropertyGraphStore for PostgresGraphStore {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin().await?;
        self.nodes.upsert(&mut tx, nodes, self.embedding_dim).await?;
        Self::commit(tx).await
    }

    async fn upsert_relations(&self, relations: &[Relation]) -> Result<()> {
        if relations.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin().await?;
        self.relations.upsert(&mut tx, relations).await?;
        Self::commit(tx).await
    }

    async fn get(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        self.nodes.get(&mut conn, filter).await
    }

    async fn get_triplets(&self, filter: &TripletFilter) -> Result<Vec<Triplet>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        self.relations.get_triplets(&mut conn, filter).await
    }

    async fn traverse(&self, query: &TraversalQuery) -> Result<Vec<Triplet>> {
        if query.is_trivial() {
            return Ok(Vec::new());
        }
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        self.traversal.traverse(&mut conn, query).await
    }

    async fn vector_query(&self, query: &VectorQuery) -> Result<Vec<ScoredNode>> {
        query.validate(self.embedding_dim)?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        self.vectors.search(&mut conn, query).await
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        self.nodes.delete(&mut tx, id).await?;
        Self::commit(tx).await
    }

    async fn delete_relation(&self, relation: &Relation) -> Result<()> {
        let mut tx = self.begin().await?;
        self.relations.delete(&mut tx, relation).await?;
        Self::commit(tx).await
    }

    async fn delete(&self, filter: &TripletFilter) -> Result<()> {
        if filter.is_empty() {
            return Ok(());
        }

        let mut tx = self.begin().await?;
        let mut relations = 0;
        if let Some(labels) = filter.relation_names() {
            relations = self.relations.delete_labels(&mut tx, labels).await?;
        }
        let nodes = self.nodes.delete_matching(&mut tx, filter).await?;
        Self::commit(tx).await?;

        tracing::debug!(nodes, relations, "Deleted by filter");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.begin().await?;
        self.nodes.clear(&mut tx).await?;
        Self::commit(tx).await?;

        tracing::info!(
            nodes = %self.tables.nodes,
            relations = %self.tables.relations,
            "Cleared graph"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_structured() {
        assert_eq!(
            wrap_structured("SELECT id FROM nodes WHERE label = $1;"),
            "WITH q AS (\nSELECT id FROM nodes WHERE label = $1\n)\n\
             SELECT COALESCE(jsonb_agg(to_jsonb(q)), '[]'::jsonb) FROM q"
        );
    }

    #[test]
    fn test_wrap_structured_keeps_trailing_comment_closed() {
        let wrapped = wrap_structured("SELECT id FROM nodes -- all ids");
        assert!(wrapped.contains("-- all ids\n)\nSELECT COALESCE"));
    }

    #[test]
    fn test_wrap_structured_accepts_returning_statements() {
        let wrapped = wrap_structured("UPDATE nodes SET label = 'x' RETURNING id");
        assert!(wrapped
            .starts_with("WITH q AS (\nUPDATE nodes SET label = 'x' RETURNING id\n)"));
        assert!(!wrapped.contains("FROM (UPDATE"));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let config = StoreConfig {
            database_url: "postgres://localhost/graph".to_string(),
            embedding_dim: 0,
            ..Default::default()
        };
        assert!(matches!(
            PostgresGraphStore::new(&config).await,
            Err(GraphError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_url_is_a_connection_error() {
        let config = StoreConfig {
            database_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            PostgresGraphStore::new(&config).await,
            Err(GraphError::ConnectionError(_))
        ));
    }
}
