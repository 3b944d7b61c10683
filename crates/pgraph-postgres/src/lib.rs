//! pgraph Postgres - PostgreSQL + pgvector graph store
//!
//! Maps the property graph model onto two tables (nodes and relations) and
//! implements `PropertyGraphStore` on top of them:
//! - `schema`: table provisioning and availability checks
//! - `nodes` / `relations`: repositories taking an explicit connection
//! - `traversal`: bounded-depth expansion with a recursive CTE
//! - `vector`: cosine ranking with the `<=>` operator
//! - `store`: the pooled façade that scopes every call in a transaction

pub mod error;
pub mod nodes;
pub mod relations;
pub mod schema;
pub mod sql;
pub mod store;
pub mod traversal;
pub mod vector;

pub use nodes::NodeRepository;
pub use relations::RelationRepository;
pub use schema::{SchemaManager, Tables};
pub use store::PostgresGraphStore;
pub use traversal::TraversalEngine;
pub use vector::VectorSearch;
