//! In-memory property graph store
//!
//! Reference implementation of [`PropertyGraphStore`] with the same upsert,
//! filter, traversal and ranking semantics as the PostgreSQL store. Useful for
//! tests and for callers that do not need durability.
//!
//! All state sits behind one lock, so every call is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use crate::codec::{self, properties_match};
use crate::{
    GraphError, Node, NodeFilter, NodeKind, Properties, PropertyGraphStore, Relation, Result,
    ScoredNode, TraversalQuery, Triplet, TripletFilter, VectorQuery,
};

/// Stored node row; `text` and `name` are kept raw and classified on read
#[derive(Debug, Clone)]
struct NodeRow {
    id: String,
    label: String,
    text: Option<String>,
    name: Option<String>,
    properties: Properties,
    embedding: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NodeRow {
    fn insert(node: &Node, now: DateTime<Utc>) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            text: non_empty(node.text()),
            name: non_empty(node.name()),
            properties: node.properties.clone(),
            embedding: node.embedding.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite only the fields the incoming node actually carries
    fn merge(&mut self, node: &Node, now: DateTime<Utc>) {
        self.label = node.label.clone();
        if let Some(text) = non_empty(node.text()) {
            self.text = Some(text);
        }
        if let Some(name) = non_empty(node.name()) {
            self.name = Some(name);
        }
        if !node.properties.is_empty() {
            self.properties = node.properties.clone();
        }
        if let Some(embedding) = &node.embedding {
            self.embedding = Some(embedding.clone());
        }
        self.updated_at = now;
    }

    fn to_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            label: self.label.clone(),
            kind: NodeKind::classify(self.text.clone(), self.name.clone()),
            properties: codec::strip_empty(&self.properties),
            embedding: self.embedding.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }

    fn name_in(&self, names: &[String]) -> bool {
        self.name.as_ref().is_some_and(|n| names.contains(n))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Stored relation row, kept in insertion order
#[derive(Debug, Clone)]
struct RelationRow {
    label: String,
    source_id: String,
    target_id: String,
    properties: Properties,
}

impl RelationRow {
    fn matches(&self, relation: &Relation) -> bool {
        self.source_id == relation.source_id
            && self.target_id == relation.target_id
            && self.label == relation.label
    }

    fn touches(&self, ids: &HashSet<&str>) -> bool {
        ids.contains(self.source_id.as_str()) || ids.contains(self.target_id.as_str())
    }

    fn to_relation(&self) -> Relation {
        Relation {
            label: self.label.clone(),
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            properties: codec::strip_empty(&self.properties),
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<String, NodeRow>,
    relations: Vec<RelationRow>,
}

impl GraphState {
    fn triplet(&self, row: &RelationRow) -> Option<Triplet> {
        let source = self.nodes.get(&row.source_id)?;
        let target = self.nodes.get(&row.target_id)?;
        Some(Triplet {
            source: source.to_node(),
            relation: row.to_relation(),
            target: target.to_node(),
        })
    }

    fn remove_nodes(&mut self, ids: &HashSet<&str>) {
        self.relations.retain(|r| !r.touches(ids));
        self.nodes.retain(|id, _| !ids.contains(id.as_str()));
    }
}

/// In-memory graph store
#[derive(Debug)]
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
    embedding_dim: usize,
}

impl MemoryGraphStore {
    /// Create an empty store for embeddings of `embedding_dim`
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            embedding_dim,
        }
    }

    /// Number of stored nodes
    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    /// Number of stored relations
    pub async fn relation_count(&self) -> usize {
        self.state.read().await.relations.len()
    }
}

#[async_trait]
impl PropertyGraphStore for MemoryGraphStore {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            node.validate(self.embedding_dim)?;
        }

        let now = Utc::now();
        let mut state = self.state.write().await;
        for node in nodes {
            match state.nodes.get_mut(&node.id) {
                Some(row) => row.merge(node, now),
                None => {
                    state.nodes.insert(node.id.clone(), NodeRow::insert(node, now));
                }
            }
        }

        tracing::debug!(count = nodes.len(), "Upserted nodes");
        Ok(())
    }

    async fn upsert_relations(&self, relations: &[Relation]) -> Result<()> {
        for relation in relations {
            relation.validate()?;
        }

        let mut state = self.state.write().await;

        // Whole batch is checked before anything is written
        for relation in relations {
            let missing: Vec<String> = [&relation.source_id, &relation.target_id]
                .into_iter()
                .filter(|id| !state.nodes.contains_key(id.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(GraphError::missing_endpoints(relation, &missing));
            }
        }

        for relation in relations {
            match state.relations.iter_mut().find(|r| r.matches(relation)) {
                Some(row) => {
                    if !relation.properties.is_empty() {
                        row.properties = relation.properties.clone();
                    }
                }
                None => state.relations.push(RelationRow {
                    label: relation.label.clone(),
                    source_id: relation.source_id.clone(),
                    target_id: relation.target_id.clone(),
                    properties: relation.properties.clone(),
                }),
            }
        }

        tracing::debug!(count = relations.len(), "Upserted relations");
        Ok(())
    }

    async fn get(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let state = self.state.read().await;
        let ids = filter.ids();
        let properties = filter.properties();

        Ok(state
            .nodes
            .values()
            .filter(|row| ids.map_or(true, |ids| ids.contains(&row.id)))
            .filter(|row| properties.map_or(true, |p| properties_match(&row.properties, p)))
            .map(NodeRow::to_node)
            .collect())
    }

    async fn get_triplets(&self, filter: &TripletFilter) -> Result<Vec<Triplet>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut triplets = Vec::new();

        for row in &state.relations {
            let (Some(source), Some(target)) =
                (state.nodes.get(&row.source_id), state.nodes.get(&row.target_id))
            else {
                continue;
            };

            if let Some(labels) = filter.relation_names() {
                if !labels.contains(&row.label) {
                    continue;
                }
            }
            if let Some(props) = filter.properties() {
                let matched = properties_match(&row.properties, props)
                    || properties_match(&source.properties, props)
                    || properties_match(&target.properties, props);
                if !matched {
                    continue;
                }
            }
            if let Some(names) = filter.entity_names() {
                if !source.name_in(names) && !target.name_in(names) {
                    continue;
                }
            }
            if let Some(ids) = filter.ids() {
                if !ids.contains(&row.source_id) && !ids.contains(&row.target_id) {
                    continue;
                }
            }

            triplets.extend(state.triplet(row));
        }

        Ok(triplets)
    }

    async fn traverse(&self, query: &TraversalQuery) -> Result<Vec<Triplet>> {
        if query.is_trivial() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let relations = &state.relations;
        let seeds: HashSet<&str> = query.seed_ids.iter().map(String::as_str).collect();
        let followed = |row: &RelationRow| !query.ignore_rels.contains(&row.label);

        // Paths are identified by their last edge; depth 1 starts at the seeds
        let mut frontier: Vec<usize> = relations
            .iter()
            .enumerate()
            .filter(|(_, r)| followed(*r) && seeds.contains(r.source_id.as_str()))
            .map(|(i, _)| i)
            .collect();
        let mut paths: Vec<usize> = Vec::new();
        let mut depth = 1;

        loop {
            paths.extend(&frontier);
            if frontier.is_empty() || depth >= query.max_depth || paths.len() >= query.limit {
                break;
            }

            frontier = frontier
                .iter()
                .flat_map(|&p| {
                    let end = &relations[p].target_id;
                    relations
                        .iter()
                        .enumerate()
                        .filter(move |(_, r)| followed(*r) && &r.source_id == end)
                        .map(|(i, _)| i)
                })
                .collect();
            depth += 1;
        }

        paths.truncate(query.limit);

        tracing::debug!(
            seeds = query.seed_ids.len(),
            max_depth = query.max_depth,
            depth_reached = depth,
            paths = paths.len(),
            "Traversal finished"
        );

        Ok(paths
            .into_iter()
            .filter_map(|i| state.triplet(&relations[i]))
            .collect())
    }

    async fn vector_query(&self, query: &VectorQuery) -> Result<Vec<ScoredNode>> {
        let embedding = query.validate(self.embedding_dim)?;

        let state = self.state.read().await;
        let ids = query.ids.as_deref().filter(|ids| !ids.is_empty());

        let mut ranked: Vec<(f64, &NodeRow)> = state
            .nodes
            .values()
            .filter(|row| ids.map_or(true, |ids| ids.contains(&row.id)))
            .filter_map(|row| {
                let stored = row.embedding.as_deref()?;
                codec::cosine_distance(embedding, stored).map(|d| (d, row))
            })
            .collect();

        // Stable sort keeps storage order between equal distances
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(query.top_k);

        Ok(ranked
            .into_iter()
            .map(|(distance, row)| ScoredNode {
                node: row.to_node(),
                score: (1.0 - distance) as f32,
            })
            .collect())
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.remove_nodes(&HashSet::from([id]));
        Ok(())
    }

    async fn delete_relation(&self, relation: &Relation) -> Result<()> {
        let mut state = self.state.write().await;
        state.relations.retain(|r| !r.matches(relation));
        Ok(())
    }

    async fn delete(&self, filter: &TripletFilter) -> Result<()> {
        if filter.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;

        if let Some(labels) = filter.relation_names() {
            state.relations.retain(|r| !labels.contains(&r.label));
        }

        let doomed: Vec<String> = state
            .nodes
            .values()
            .filter(|row| {
                filter.entity_names().is_some_and(|names| row.name_in(names))
                    || filter.ids().is_some_and(|ids| ids.contains(&row.id))
                    || filter
                        .properties()
                        .is_some_and(|p| properties_match(&row.properties, p))
            })
            .map(|row| row.id.clone())
            .collect();
        let doomed_ids: HashSet<&str> = doomed.iter().map(String::as_str).collect();
        state.remove_nodes(&doomed_ids);

        tracing::debug!(nodes = doomed.len(), "Deleted by filter");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.relations.clear();
        state.nodes.clear();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_nodes() -> Vec<Node> {
        vec![
            Node::entity("Person", "Alice")
                .with_property("age", 30)
                .with_property("occupation", "Engineer"),
            Node::entity("Person", "Bob")
                .with_property("age", 25)
                .with_property("occupation", "Designer"),
            Node::chunk_with_id("Chunk/chunk1", "This is a test chunk")
                .with_label("Chunk")
                .with_property("source", "test")
                .with_embedding(vec![0.1, 0.2, 0.3, 0.4]),
        ]
    }

    fn sample_relations() -> Vec<Relation> {
        vec![
            Relation::new("KNOWS", "Person/Alice", "Person/Bob").with_property("since", 2020),
            Relation::new("CREATED", "Person/Alice", "Chunk/chunk1")
                .with_property("date", "2023-01-01"),
        ]
    }

    async fn populated() -> MemoryGraphStore {
        let store = MemoryGraphStore::new(4);
        store.upsert_nodes(&sample_nodes()).await.unwrap();
        store.upsert_relations(&sample_relations()).await.unwrap();
        store
    }

    /// A -r1-> B -r2-> C -r3-> D
    async fn chain() -> MemoryGraphStore {
        let store = MemoryGraphStore::new(4);
        let nodes: Vec<Node> = ["A", "B", "C", "D"]
            .iter()
            .map(|n| Node::entity("node", *n))
            .collect();
        store.upsert_nodes(&nodes).await.unwrap();
        store
            .upsert_relations(&[
                Relation::new("r1", "node/A", "node/B"),
                Relation::new("r2", "node/B", "node/C"),
                Relation::new("r3", "node/C", "node/D"),
            ])
            .await
            .unwrap();
        store
    }

    fn edges(triplets: &[Triplet]) -> Vec<(String, String, String)> {
        triplets
            .iter()
            .map(|t| {
                (
                    t.source.name().unwrap_or_default().to_string(),
                    t.relation.label.clone(),
                    t.target.name().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn edge(s: &str, r: &str, t: &str) -> (String, String, String) {
        (s.to_string(), r.to_string(), t.to_string())
    }

    #[tokio::test]
    async fn test_add_and_get_nodes() {
        let store = populated().await;

        assert_eq!(store.get(&NodeFilter::new()).await.unwrap().len(), 3);

        let engineers = store
            .get(&NodeFilter::new().with_property("occupation", "Engineer"))
            .await
            .unwrap();
        assert_eq!(engineers.len(), 1);
        assert_eq!(engineers[0].properties["occupation"], json!("Engineer"));

        let chunks = store
            .get(&NodeFilter::new().with_ids(["Chunk/chunk1"]))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].kind.is_chunk());
        assert_eq!(chunks[0].text(), Some("This is a test chunk"));

        let none = store
            .get(
                &NodeFilter::new()
                    .with_ids(["Person/Bob"])
                    .with_property("occupation", "Engineer"),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_numeric_property_filter_ignores_representation() {
        let store = populated().await;

        let by_float = store
            .get(&NodeFilter::new().with_property("age", 30.0))
            .await
            .unwrap();
        assert_eq!(by_float.len(), 1);
        assert_eq!(by_float[0].name(), Some("Alice"));

        let triplets = store
            .get_triplets(&TripletFilter::new().with_property("since", 2020.0))
            .await
            .unwrap();
        assert_eq!(edges(&triplets), vec![edge("Alice", "KNOWS", "Bob")]);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_partial() {
        let store = MemoryGraphStore::new(4);
        let alice = Node::entity("Person", "Alice")
            .with_property("age", 30)
            .with_embedding(vec![1.0, 0.0, 0.0, 0.0]);

        store.upsert_nodes(&[alice.clone()]).await.unwrap();
        store.upsert_nodes(&[alice]).await.unwrap();
        assert_eq!(store.node_count().await, 1);

        // Second write omits properties and embedding; neither is cleared
        store
            .upsert_nodes(&[Node::entity("Person", "Alice")])
            .await
            .unwrap();
        let nodes = store.get(&NodeFilter::new()).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].properties["age"], json!(30));
        assert_eq!(nodes[0].embedding, Some(vec![1.0, 0.0, 0.0, 0.0]));
        assert!(nodes[0].updated_at >= nodes[0].created_at);
    }

    #[tokio::test]
    async fn test_relation_upsert_is_idempotent() {
        let store = populated().await;
        store.upsert_relations(&sample_relations()).await.unwrap();
        assert_eq!(store.relation_count().await, 2);

        store
            .upsert_relations(&[Relation::new("KNOWS", "Person/Alice", "Person/Bob")])
            .await
            .unwrap();
        let knows = store
            .get_triplets(&TripletFilter::new().with_relation_names(["KNOWS"]))
            .await
            .unwrap();
        assert_eq!(knows.len(), 1);
        assert_eq!(knows[0].relation.properties["since"], json!(2020));
    }

    #[tokio::test]
    async fn test_property_stripping() {
        let store = MemoryGraphStore::new(4);
        store
            .upsert_nodes(&[Node::entity("Thing", "x")
                .with_property("a", "")
                .with_property("b", "x")])
            .await
            .unwrap();

        let nodes = store.get(&NodeFilter::new()).await.unwrap();
        assert_eq!(nodes[0].properties.len(), 1);
        assert_eq!(nodes[0].properties["b"], json!("x"));
    }

    #[tokio::test]
    async fn test_get_triplets() {
        let store = populated().await;

        let by_name = store
            .get_triplets(&TripletFilter::new().with_entity_names(["Alice"]))
            .await
            .unwrap();
        assert_eq!(by_name.len(), 2);
        assert!(by_name[1].target.kind.is_chunk());

        let by_label = store
            .get_triplets(&TripletFilter::new().with_relation_names(["KNOWS"]))
            .await
            .unwrap();
        assert_eq!(by_label.len(), 1);
        assert_eq!(by_label[0].relation.label, "KNOWS");

        let by_rel_prop = store
            .get_triplets(&TripletFilter::new().with_property("date", "2023-01-01"))
            .await
            .unwrap();
        assert_eq!(by_rel_prop.len(), 1);

        // Endpoint properties match too
        let by_node_prop = store
            .get_triplets(&TripletFilter::new().with_property("occupation", "Designer"))
            .await
            .unwrap();
        assert_eq!(edges(&by_node_prop), vec![edge("Alice", "KNOWS", "Bob")]);

        let by_target_id = store
            .get_triplets(&TripletFilter::new().with_ids(["Chunk/chunk1"]))
            .await
            .unwrap();
        assert_eq!(by_target_id.len(), 1);

        let conjunction = store
            .get_triplets(
                &TripletFilter::new()
                    .with_entity_names(["Alice"])
                    .with_relation_names(["CREATED"]),
            )
            .await
            .unwrap();
        assert_eq!(conjunction.len(), 1);
        assert_eq!(conjunction[0].relation.label, "CREATED");
    }

    #[tokio::test]
    async fn test_empty_filter_returns_nothing() {
        let store = populated().await;
        assert!(store
            .get_triplets(&TripletFilter::new())
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .get_triplets(&TripletFilter::new().with_ids(Vec::<String>::new()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_rejected() {
        let store = populated().await;

        let err = store
            .upsert_relations(&[
                Relation::new("LIKES", "Person/Bob", "Person/Alice"),
                Relation::new("KNOWS", "Person/Nobody", "Person/Bob"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::IntegrityError(ref m) if m.contains("Person/Nobody")));

        // Nothing from the failed batch was written
        assert_eq!(store.relation_count().await, 2);
        let likes = store
            .get_triplets(&TripletFilter::new().with_relation_names(["LIKES"]))
            .await
            .unwrap();
        assert!(likes.is_empty());
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let store = populated().await;
        store.delete_node("Person/Alice").await.unwrap();

        assert!(store
            .get(&NodeFilter::new().with_ids(["Person/Alice"]))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.relation_count().await, 0);
        assert_eq!(
            store
                .get(&NodeFilter::new().with_ids(["Person/Bob"]))
                .await
                .unwrap()
                .len(),
            1
        );

        // Deleting again is a no-op
        store.delete_node("Person/Alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_relation() {
        let store = populated().await;
        store
            .delete_relation(&sample_relations()[0])
            .await
            .unwrap();

        assert!(store
            .get_triplets(&TripletFilter::new().with_relation_names(["KNOWS"]))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_triplets(&TripletFilter::new().with_relation_names(["CREATED"]))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let store = populated().await;

        store
            .delete(&TripletFilter::new().with_property("occupation", "nobody"))
            .await
            .unwrap();
        assert_eq!(store.node_count().await, 3);

        store
            .delete(&TripletFilter::new().with_property("occupation", "Engineer"))
            .await
            .unwrap();
        assert_eq!(store.node_count().await, 2);
        assert_eq!(store.relation_count().await, 0);

        store.delete(&TripletFilter::new()).await.unwrap();
        assert_eq!(store.node_count().await, 2);
    }

    #[tokio::test]
    async fn test_delete_by_relation_name_keeps_nodes() {
        let store = populated().await;
        store
            .delete(&TripletFilter::new().with_relation_names(["KNOWS"]))
            .await
            .unwrap();
        assert_eq!(store.node_count().await, 3);
        assert_eq!(store.relation_count().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = populated().await;
        store.clear().await.unwrap();
        assert!(store.get(&NodeFilter::new()).await.unwrap().is_empty());
        assert_eq!(store.relation_count().await, 0);
    }

    #[tokio::test]
    async fn test_traversal_depth_bound() {
        let store = chain().await;

        let one = store
            .traverse(&TraversalQuery::new(["node/A"]).with_max_depth(1))
            .await
            .unwrap();
        assert_eq!(edges(&one), vec![edge("A", "r1", "B")]);

        let two = store
            .traverse(&TraversalQuery::new(["node/A"]).with_max_depth(2))
            .await
            .unwrap();
        assert_eq!(edges(&two), vec![edge("A", "r1", "B"), edge("B", "r2", "C")]);

        let three = store
            .traverse(&TraversalQuery::new(["node/A"]).with_max_depth(3))
            .await
            .unwrap();
        assert_eq!(
            edges(&three),
            vec![
                edge("A", "r1", "B"),
                edge("B", "r2", "C"),
                edge("C", "r3", "D")
            ]
        );
    }

    #[tokio::test]
    async fn test_traversal_limit_and_trivial_queries() {
        let store = chain().await;

        let limited = store
            .traverse(&TraversalQuery::new(["node/A"]).with_max_depth(3).with_limit(2))
            .await
            .unwrap();
        assert_eq!(edges(&limited), vec![edge("A", "r1", "B"), edge("B", "r2", "C")]);

        for query in [
            TraversalQuery::new(["node/A"]).with_max_depth(0),
            TraversalQuery::new(Vec::<String>::new()),
            TraversalQuery::new(["node/D"]),
        ] {
            assert!(store.traverse(&query).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_traversal_revisits_cycles_per_depth() {
        let store = MemoryGraphStore::new(4);
        store
            .upsert_nodes(&[Node::entity("node", "A"), Node::entity("node", "B")])
            .await
            .unwrap();
        store
            .upsert_relations(&[
                Relation::new("to", "node/A", "node/B"),
                Relation::new("back", "node/B", "node/A"),
            ])
            .await
            .unwrap();

        let paths = store
            .traverse(&TraversalQuery::new(["node/A"]).with_max_depth(3))
            .await
            .unwrap();
        assert_eq!(
            edges(&paths),
            vec![edge("A", "to", "B"), edge("B", "back", "A"), edge("A", "to", "B")]
        );
    }

    #[tokio::test]
    async fn test_get_rel_map_ignores_labels() {
        let store = chain().await;
        let seeds = store
            .get(&NodeFilter::new().with_ids(["node/A"]))
            .await
            .unwrap();

        let all = store.get_rel_map(&seeds, 3, 30, &[]).await.unwrap();
        assert_eq!(all.len(), 3);

        let cut = store
            .get_rel_map(&seeds, 3, 30, &["r2".to_string()])
            .await
            .unwrap();
        assert_eq!(edges(&cut), vec![edge("A", "r1", "B")]);
    }

    #[tokio::test]
    async fn test_vector_self_similarity() {
        let store = populated().await;
        store
            .upsert_nodes(&[Node::entity("Person", "Bob").with_embedding(vec![0.4, 0.3, 0.2, 0.1])])
            .await
            .unwrap();

        let results = store
            .vector_query(&VectorQuery::new(vec![0.1, 0.2, 0.3, 0.4], 2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node.id, "Chunk/chunk1");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results[0].score > results[1].score);

        let filtered = store
            .vector_query(&VectorQuery::new(vec![0.1, 0.2, 0.3, 0.4], 5).with_ids(["Person/Bob"]))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].node.id, "Person/Bob");
    }

    #[tokio::test]
    async fn test_vector_query_validation() {
        let store = populated().await;

        let wrong_dim = store
            .vector_query(&VectorQuery::new(vec![0.1, 0.2, 0.3], 1))
            .await;
        assert!(matches!(wrong_dim, Err(GraphError::ValidationError(_))));

        let zero_k = store
            .vector_query(&VectorQuery::new(vec![0.1, 0.2, 0.3, 0.4], 0))
            .await;
        assert!(matches!(zero_k, Err(GraphError::ValidationError(_))));

        let bad_node = store
            .upsert_nodes(&[Node::entity("Person", "Carol").with_embedding(vec![1.0])])
            .await;
        assert!(matches!(bad_node, Err(GraphError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_upsert_triplet() {
        let store = MemoryGraphStore::new(4);
        store
            .upsert_triplet(
                &Node::entity("Person", "Alice"),
                "KNOWS",
                &Node::entity("Person", "Bob"),
            )
            .await
            .unwrap();

        let triplets = store
            .get_triplets(&TripletFilter::new().with_entity_names(["Alice"]))
            .await
            .unwrap();
        assert_eq!(edges(&triplets), vec![edge("Alice", "KNOWS", "Bob")]);
    }
}
