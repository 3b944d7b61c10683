//! Relation repository

use pgraph_core::codec::properties_to_json;
use pgraph_core::{GraphError, Relation, Result, Triplet, TripletFilter};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::db_error;
use crate::nodes::NodeRepository;
use crate::schema::Tables;
use crate::sql::{push_properties_match, triplet_projection, TripletRow};

#[derive(Debug, Clone)]
pub struct RelationRepository {
    tables: Arc<Tables>,
    nodes: NodeRepository,
}

impl RelationRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self {
            nodes: NodeRepository::new(tables.clone()),
            tables,
        }
    }

    /// Insert-or-update keyed by `(source_id, target_id, label)`
    ///
    /// An empty property map keeps the stored one.
    pub fn upsert_sql(&self) -> String {
        let relations = &self.tables.relations;
        format!(
            r#"
            INSERT INTO {relations} (label, source_id, target_id, properties)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_id, target_id, label) DO UPDATE SET
                properties = CASE
                    WHEN EXCLUDED.properties = '{{}}'::jsonb THEN {relations}.properties
                    ELSE EXCLUDED.properties
                END,
                updated_at = NOW()
            "#
        )
    }

    /// Upsert the batch, or nothing if any endpoint is missing
    pub async fn upsert(&self, conn: &mut PgConnection, relations: &[Relation]) -> Result<()> {
        for relation in relations {
            relation.validate()?;
        }
        if relations.is_empty() {
            return Ok(());
        }

        let endpoints: Vec<String> = relations
            .iter()
            .flat_map(|r| [r.source_id.clone(), r.target_id.clone()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let existing: HashSet<String> = self
            .nodes
            .existing_ids(conn, &endpoints)
            .await?
            .into_iter()
            .collect();

        for relation in relations {
            let missing: Vec<String> = [&relation.source_id, &relation.target_id]
                .into_iter()
                .filter(|id| !existing.contains(*id))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(GraphError::missing_endpoints(relation, &missing));
            }
        }

        let sql = self.upsert_sql();
        for relation in relations {
            sqlx::query(&sql)
                .bind(&relation.label)
                .bind(&relation.source_id)
                .bind(&relation.target_id)
                .bind(properties_to_json(&relation.properties))
                .execute(&mut *conn)
                .await
                .map_err(db_error("Failed to upsert relation"))?;
        }

        tracing::debug!(
            count = relations.len(),
            table = %self.tables.relations,
            "Upserted relations"
        );
        Ok(())
    }

    /// Query for triplets matching `filter`
    ///
    /// Predicates are combined with AND; a property filter matches the
    /// relation, the source or the target. `None` for an empty filter.
    pub fn select_triplets(
        &self,
        filter: &TripletFilter,
    ) -> Option<QueryBuilder<'static, Postgres>> {
        if filter.is_empty() {
            return None;
        }

        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM {relations} r \
             JOIN {nodes} s ON r.source_id = s.id \
             JOIN {nodes} t ON r.target_id = t.id \
             WHERE TRUE",
            triplet_projection("r"),
            relations = self.tables.relations,
            nodes = self.tables.nodes,
        ));

        if let Some(labels) = filter.relation_names() {
            builder.push(" AND r.label = ANY(").push_bind(labels.to_vec()).push(")");
        }
        if let Some(properties) = filter.properties() {
            builder.push(" AND (");
            push_properties_match(&mut builder, "r.properties", properties);
            builder.push(" OR ");
            push_properties_match(&mut builder, "s.properties", properties);
            builder.push(" OR ");
            push_properties_match(&mut builder, "t.properties", properties);
            builder.push(")");
        }
        if let Some(names) = filter.entity_names() {
            builder
                .push(" AND (s.name = ANY(")
                .push_bind(names.to_vec())
                .push(") OR t.name = ANY(")
                .push_bind(names.to_vec())
                .push("))");
        }
        if let Some(ids) = filter.ids() {
            builder
                .push(" AND (r.source_id = ANY(")
                .push_bind(ids.to_vec())
                .push(") OR r.target_id = ANY(")
                .push_bind(ids.to_vec())
                .push("))");
        }

        builder.push(" ORDER BY r.id");
        Some(builder)
    }

    pub async fn get_triplets(
        &self,
        conn: &mut PgConnection,
        filter: &TripletFilter,
    ) -> Result<Vec<Triplet>> {
        let Some(mut builder) = self.select_triplets(filter) else {
            return Ok(Vec::new());
        };

        let rows: Vec<TripletRow> = builder
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to get triplets"))?;

        Ok(rows.into_iter().map(Triplet::from).collect())
    }

    /// Delete relations matching `(source_id, target_id, label)`
    pub async fn delete(&self, conn: &mut PgConnection, relation: &Relation) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE source_id = $1 AND target_id = $2 AND label = $3",
            self.tables.relations
        ))
        .bind(&relation.source_id)
        .bind(&relation.target_id)
        .bind(&relation.label)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to delete relation"))?;
        Ok(())
    }

    /// Delete every relation whose label is in `labels`
    pub async fn delete_labels(
        &self,
        conn: &mut PgConnection,
        labels: &[String],
    ) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE label = ANY($1)",
            self.tables.relations
        ))
        .bind(labels)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to delete relations"))?;
        Ok(result.rows_affected())
    }
}
