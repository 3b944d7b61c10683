//! pgraph Core - Property graph models, codec, and shared traits
//!
//! This crate defines the core abstractions used by every pgraph backend:
//! - Graph models (nodes, relations, triplets)
//! - Query filters for nodes, triplets, traversal and vector search
//! - Identity & property codec
//! - Common error types
//! - The `PropertyGraphStore` trait and an in-memory implementation
//! - Configuration management and logging setup

pub mod codec;
pub mod config;
pub mod logging;
pub mod memory;

pub use config::{ConfigError, LoggingConfig, StoreConfig};
pub use memory::MemoryGraphStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Label given to nodes that are created without one
pub const DEFAULT_LABEL: &str = "node";

/// Property map attached to nodes and relations
pub type Properties = HashMap<String, serde_json::Value>;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for graph store operations
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Cannot connect to database: {0}")]
    ConnectionError(String),

    #[error("Vector capability unavailable: {0}")]
    CapabilityError(String),

    #[error("Referential integrity violation: {0}")]
    IntegrityError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GraphError {
    /// Error for a relation whose endpoints are not stored
    pub fn missing_endpoints(relation: &Relation, missing: &[String]) -> Self {
        Self::IntegrityError(format!(
            "relation {} ({} -> {}) references missing node(s): {}",
            relation.label,
            relation.source_id,
            relation.target_id,
            missing.join(", ")
        ))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Graph Models
// ============================================================================

/// What a node carries, decoded once when the node is read
///
/// A node is a chunk when it has non-empty text and no name; every other
/// combination decodes as an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Named node, identified by `label/name`
    Entity { name: String },
    /// Raw text node with a caller-supplied id
    Chunk { text: String },
}

impl NodeKind {
    /// Decode stored `text` / `name` columns
    pub fn classify(text: Option<String>, name: Option<String>) -> Self {
        let name = name.filter(|n| !n.is_empty());
        match (text.filter(|t| !t.is_empty()), name) {
            (Some(text), None) => Self::Chunk { text },
            (_, name) => Self::Entity {
                name: name.unwrap_or_default(),
            },
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Entity { name } => Some(name),
            Self::Chunk { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Chunk { text } => Some(text),
            Self::Entity { .. } => None,
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, Self::Chunk { .. })
    }
}

/// A labelled graph vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier, stable across upserts
    pub id: String,

    /// Category tag
    pub label: String,

    /// Entity or chunk payload
    pub kind: NodeKind,

    /// Property values
    pub properties: Properties,

    /// Optional embedding, dimension fixed per store
    pub embedding: Option<Vec<f32>>,

    /// Set by the store on insert
    pub created_at: Option<DateTime<Utc>>,

    /// Set by the store on every write
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Create an entity node; its id is derived from `(label, name)`
    pub fn entity(label: impl Into<String>, name: impl Into<String>) -> Self {
        let label = label.into();
        let name = name.into();
        Self {
            id: codec::entity_id(&label, &name),
            label,
            kind: NodeKind::Entity { name },
            properties: Properties::new(),
            embedding: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Create a chunk node with a random id
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::chunk_with_id(Uuid::new_v4().to_string(), text)
    }

    /// Create a chunk node with an explicit id
    pub fn chunk_with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: DEFAULT_LABEL.to_string(),
            kind: NodeKind::Chunk { text: text.into() },
            properties: Properties::new(),
            embedding: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the label. Entity ids follow the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        if let NodeKind::Entity { name } = &self.kind {
            self.id = codec::entity_id(&self.label, name);
        }
        self
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.kind.name()
    }

    pub fn text(&self) -> Option<&str> {
        self.kind.text()
    }

    /// Check the payload against a store's embedding dimension
    pub fn validate(&self, embedding_dim: usize) -> Result<()> {
        if self.id.is_empty() {
            return Err(GraphError::ValidationError(
                "node id must not be empty".to_string(),
            ));
        }
        if let Some(embedding) = &self.embedding {
            codec::validate_embedding(embedding, embedding_dim)?;
        }
        Ok(())
    }
}

/// A labelled, directed edge between two stored nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation type
    pub label: String,

    /// Source node ID
    pub source_id: String,

    /// Target node ID
    pub target_id: String,

    /// Property values
    pub properties: Properties,
}

impl Relation {
    /// Create a new relation
    pub fn new(
        label: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            properties: Properties::new(),
        }
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Upsert identity
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.target_id, &self.label)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(GraphError::ValidationError(
                "relation label must not be empty".to_string(),
            ));
        }
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return Err(GraphError::ValidationError(format!(
                "relation {} must name both endpoints",
                self.label
            )));
        }
        Ok(())
    }
}

/// `(source, relation, target)` projection returned by queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub source: Node,
    pub relation: Relation,
    pub target: Node,
}

/// Node returned by vector search with its cosine similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: Node,

    /// `1 - cosine distance`
    pub score: f32,
}

// ============================================================================
// Query Types
// ============================================================================

/// Node lookup filter; absent fields do not restrict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Every pair must equal the stored property value
    pub properties: Option<Properties>,

    /// Restrict to these ids
    pub ids: Option<Vec<String>>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref().filter(|p| !p.is_empty())
    }

    pub fn ids(&self) -> Option<&[String]> {
        active(&self.ids)
    }
}

/// Triplet lookup (and bulk delete) filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripletFilter {
    /// Source or target name in this set
    pub entity_names: Option<Vec<String>>,

    /// Relation label in this set
    pub relation_names: Option<Vec<String>>,

    /// Match on the relation, the source, or the target
    pub properties: Option<Properties>,

    /// Source or target id in this set
    pub ids: Option<Vec<String>>,
}

impl TripletFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_relation_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn entity_names(&self) -> Option<&[String]> {
        active(&self.entity_names)
    }

    pub fn relation_names(&self) -> Option<&[String]> {
        active(&self.relation_names)
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref().filter(|p| !p.is_empty())
    }

    pub fn ids(&self) -> Option<&[String]> {
        active(&self.ids)
    }

    /// True when no field would restrict the result
    pub fn is_empty(&self) -> bool {
        self.entity_names().is_none()
            && self.relation_names().is_none()
            && self.properties().is_none()
            && self.ids().is_none()
    }
}

/// Empty sets restrict nothing
fn active(values: &Option<Vec<String>>) -> Option<&[String]> {
    values.as_deref().filter(|v| !v.is_empty())
}

/// Bounded-depth expansion from a set of seed node ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalQuery {
    pub seed_ids: Vec<String>,

    /// Maximum number of hops; 0 yields nothing
    pub max_depth: u32,

    /// Maximum number of triplets returned
    pub limit: usize,

    /// Relation labels that are never followed
    pub ignore_rels: Vec<String>,
}

impl TraversalQuery {
    pub const DEFAULT_DEPTH: u32 = 2;
    pub const DEFAULT_LIMIT: usize = 30;

    pub fn new<I, S>(seed_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seed_ids: seed_ids.into_iter().map(Into::into).collect(),
            max_depth: Self::DEFAULT_DEPTH,
            limit: Self::DEFAULT_LIMIT,
            ignore_rels: Vec::new(),
        }
    }

    /// Seed the traversal with the ids of the given nodes
    pub fn from_nodes(nodes: &[Node]) -> Self {
        Self::new(nodes.iter().map(|n| n.id.clone()))
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_ignore_rels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_rels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// True when the traversal can return nothing
    pub fn is_trivial(&self) -> bool {
        self.seed_ids.is_empty() || self.max_depth == 0 || self.limit == 0
    }
}

/// Similarity search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorQuery {
    pub embedding: Option<Vec<f32>>,

    /// Number of results; must be positive
    pub top_k: usize,

    /// Restrict ranking to these ids
    pub ids: Option<Vec<String>>,
}

impl VectorQuery {
    pub fn new(embedding: Vec<f32>, top_k: usize) -> Self {
        Self {
            embedding: Some(embedding),
            top_k,
            ids: None,
        }
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Reject malformed queries before any storage access
    pub fn validate(&self, embedding_dim: usize) -> Result<&[f32]> {
        let embedding = self.embedding.as_deref().ok_or_else(|| {
            GraphError::ValidationError("vector query requires an embedding".to_string())
        })?;
        if self.top_k == 0 {
            return Err(GraphError::ValidationError(
                "top_k must be positive".to_string(),
            ));
        }
        codec::validate_embedding(embedding, embedding_dim)?;
        Ok(embedding)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Persistence layer for nodes, relations and embeddings
///
/// Every method is atomic: a failed call leaves no partial writes.
#[async_trait::async_trait]
pub trait PropertyGraphStore: Send + Sync {
    /// Embedding dimension fixed at construction
    fn embedding_dim(&self) -> usize;

    /// Insert nodes or update the non-empty fields of existing ones
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// Insert relations or update existing ones keyed by
    /// `(source_id, target_id, label)`. Fails without writing if any endpoint
    /// is missing.
    async fn upsert_relations(&self, relations: &[Relation]) -> Result<()>;

    /// Nodes matching the filter
    async fn get(&self, filter: &NodeFilter) -> Result<Vec<Node>>;

    /// Triplets matching the filter; an empty filter matches nothing
    async fn get_triplets(&self, filter: &TripletFilter) -> Result<Vec<Triplet>>;

    /// Bounded-depth paths from the seeds, shallowest first
    async fn traverse(&self, query: &TraversalQuery) -> Result<Vec<Triplet>>;

    /// Nodes ranked by cosine similarity to the query embedding
    async fn vector_query(&self, query: &VectorQuery) -> Result<Vec<ScoredNode>>;

    /// Delete a node and every relation touching it
    async fn delete_node(&self, id: &str) -> Result<()>;

    /// Delete relations matching `(source_id, target_id, label)`
    async fn delete_relation(&self, relation: &Relation) -> Result<()>;

    /// Delete nodes matched by name, id or properties (with their relations)
    /// and relations matched by label
    async fn delete(&self, filter: &TripletFilter) -> Result<()>;

    /// Remove all relations, then all nodes
    async fn clear(&self) -> Result<()>;

    /// Traversal seeded by node objects
    async fn get_rel_map(
        &self,
        nodes: &[Node],
        depth: u32,
        limit: usize,
        ignore_rels: &[String],
    ) -> Result<Vec<Triplet>> {
        let query = TraversalQuery::from_nodes(nodes)
            .with_max_depth(depth)
            .with_limit(limit)
            .with_ignore_rels(ignore_rels.iter().cloned());
        self.traverse(&query).await
    }

    /// Upsert both endpoints, then the relation between them
    async fn upsert_triplet(&self, source: &Node, label: &str, target: &Node) -> Result<()> {
        self.upsert_nodes(&[source.clone(), target.clone()]).await?;
        self.upsert_relations(&[Relation::new(label, &source.id, &target.id)])
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_follows_label() {
        let node = Node::entity("Person", "Alice");
        assert_eq!(node.id, "Person/Alice");

        let relabelled = node.with_label("Employee");
        assert_eq!(relabelled.id, "Employee/Alice");
        assert_eq!(relabelled.name(), Some("Alice"));
    }

    #[test]
    fn test_chunk_keeps_explicit_id() {
        let chunk = Node::chunk_with_id("chunk1", "some text").with_label("Chunk");
        assert_eq!(chunk.id, "chunk1");
        assert_eq!(chunk.text(), Some("some text"));
        assert!(chunk.kind.is_chunk());

        let generated = Node::chunk("other text");
        assert!(Uuid::parse_str(&generated.id).is_ok());
        assert_eq!(generated.label, DEFAULT_LABEL);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            NodeKind::classify(Some("body".into()), None),
            NodeKind::Chunk {
                text: "body".into()
            }
        );
        assert_eq!(
            NodeKind::classify(Some("body".into()), Some(String::new())),
            NodeKind::Chunk {
                text: "body".into()
            }
        );
        assert_eq!(
            NodeKind::classify(Some("body".into()), Some("Alice".into())),
            NodeKind::Entity {
                name: "Alice".into()
            }
        );
        assert_eq!(
            NodeKind::classify(Some(String::new()), None),
            NodeKind::Entity {
                name: String::new()
            }
        );
    }

    #[test]
    fn test_triplet_filter_is_empty() {
        assert!(TripletFilter::new().is_empty());
        assert!(TripletFilter::new()
            .with_entity_names(Vec::<String>::new())
            .is_empty());
        assert!(!TripletFilter::new().with_relation_names(["KNOWS"]).is_empty());
        assert!(!TripletFilter::new().with_property("p1", "v1").is_empty());
    }

    #[test]
    fn test_vector_query_validation() {
        let missing = VectorQuery {
            embedding: None,
            top_k: 1,
            ids: None,
        };
        assert!(matches!(
            missing.validate(4),
            Err(GraphError::ValidationError(_))
        ));

        let zero_k = VectorQuery::new(vec![0.1; 4], 0);
        assert!(matches!(
            zero_k.validate(4),
            Err(GraphError::ValidationError(_))
        ));

        let wrong_dim = VectorQuery::new(vec![0.1; 3], 1);
        assert!(matches!(
            wrong_dim.validate(4),
            Err(GraphError::ValidationError(_))
        ));

        let ok = VectorQuery::new(vec![0.1; 4], 1);
        assert_eq!(ok.validate(4).unwrap().len(), 4);
    }

    #[test]
    fn test_relation_validation() {
        assert!(Relation::new("KNOWS", "a", "b").validate().is_ok());
        assert!(Relation::new("", "a", "b").validate().is_err());
        assert!(Relation::new("KNOWS", "", "b").validate().is_err());
    }

    #[test]
    fn test_traversal_query_trivial() {
        assert!(TraversalQuery::new(Vec::<String>::new()).is_trivial());
        assert!(TraversalQuery::new(["a"]).with_max_depth(0).is_trivial());
        assert!(TraversalQuery::new(["a"]).with_limit(0).is_trivial());
        assert!(!TraversalQuery::new(["a"]).is_trivial());
    }
}
