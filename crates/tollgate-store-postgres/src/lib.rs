//! PostgreSQL implementation of the Tollgate document store.
//!
//! Every collection lives in one JSONB table, keyed by collection name and
//! document id. Filters translate to JSONB operators, so no per-collection
//! schema is needed.
//!
//! # Features
//!
//! - Upserts by `_id` with `ON CONFLICT`
//! - Partial updates as `doc || set - unset`
//! - Storage order preserved through a sequence column
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE tollgate_documents (
//!     seq BIGSERIAL,
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     doc JSONB NOT NULL,
//!     PRIMARY KEY (collection, id)
//! );
//!
//! CREATE INDEX idx_tollgate_documents_order ON tollgate_documents (collection, seq);
//! CREATE INDEX idx_tollgate_documents_doc ON tollgate_documents USING GIN (doc);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use tollgate::{StoreRegistry, MAIN_STORE};
//! use tollgate_store_postgres::PgDocumentStore;
//!
//! let pool = PgPool::connect("postgres://localhost/mydb").await?;
//! let stores = StoreRegistry::builder()
//!     .with_store(MAIN_STORE, Arc::new(PgDocumentStore::new(pool)))?
//!     .build();
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tollgate::{
    Condition, Document, DocumentStore, Filter, FindOptions, Patch, SortOrder, StoreError, ID_FIELD,
};
use tracing::debug;

/// Table used by [`PgDocumentStore::new`].
pub const DEFAULT_TABLE: &str = "tollgate_documents";

/// PostgreSQL document store.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    table: String,
}

impl PgDocumentStore {
    /// Store over [`DEFAULT_TABLE`].
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, DEFAULT_TABLE)
    }

    /// Store over a custom table with the documented layout.
    ///
    /// The name is quoted as an identifier, so it may contain any character.
    pub fn with_table(pool: PgPool, table: impl AsRef<str>) -> Self {
        Self {
            pool,
            table: quote_ident(table.as_ref()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn select<'a>(&self, columns: &str, collection: &'a str) -> QueryBuilder<'a, Postgres> {
        let mut query = QueryBuilder::new(format!("SELECT {columns} FROM {} ", self.table));
        push_where(&mut query, collection);
        query
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut query = self.select("COUNT(*) AS n", collection);
        push_conditions(&mut query, filter);
        debug!(sql = query.sql(), "count");

        let row = query
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        let n: i64 = row.try_get("n").map_err(StoreError::backend)?;
        Ok(n.max(0) as u64)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let mut query = self.select("doc", collection);
        push_conditions(&mut query, filter);
        query.push(" ORDER BY seq LIMIT 1");
        debug!(sql = query.sql(), "find one");

        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.map(|row| document(&row)).transpose()
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut query = self.select("doc", collection);
        push_conditions(&mut query, filter);
        push_window(&mut query, options);
        debug!(sql = query.sql(), "find many");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.iter().map(document).collect()
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        let id = match document.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            _ => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                document.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
                id
            }
        };

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (collection, id, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE
            SET doc = EXCLUDED.doc
            "#,
            self.table
        ))
        .bind(collection)
        .bind(&id)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::new(format!("UPDATE {} SET doc = (doc || ", self.table));
        query.push_bind(Json(patch.set.clone()));
        query.push(") - ");
        query.push_bind(patch.unset.clone());
        query.push("::text[] ");
        push_where(&mut query, collection);
        push_conditions(&mut query, filter);
        debug!(sql = query.sql(), "update");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::new(format!("DELETE FROM {} ", self.table));
        push_where(&mut query, collection);
        push_conditions(&mut query, filter);
        debug!(sql = query.sql(), "delete");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }
}

fn document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let Json(document): Json<Document> = row.try_get("doc").map_err(StoreError::backend)?;
    Ok(document)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_where<'a>(query: &mut QueryBuilder<'a, Postgres>, collection: &'a str) {
    query.push("WHERE collection = ");
    query.push_bind(collection);
}

/// Appends one `AND` clause per condition. Null attributes count as absent.
fn push_conditions(query: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (attribute, condition) in filter.conditions() {
        query.push(" AND ");
        match condition {
            Condition::Eq(value) => {
                query.push("doc -> ");
                query.push_bind(attribute.clone());
                query.push(" = ");
                query.push_bind(Json(value.clone()));
            }
            Condition::Ne(value) => {
                query.push("doc -> ");
                query.push_bind(attribute.clone());
                query.push(" IS DISTINCT FROM ");
                query.push_bind(Json(value.clone()));
            }
            Condition::Missing => {
                query.push("COALESCE(jsonb_typeof(doc -> ");
                query.push_bind(attribute.clone());
                query.push("), 'null') = 'null'");
            }
            Condition::In(values) => {
                query.push("(doc ? ");
                query.push_bind(attribute.clone());
                query.push(" AND ");
                query.push_bind(Json(Value::Array(values.clone())));
                query.push(" @> jsonb_build_array(doc -> ");
                query.push_bind(attribute.clone());
                query.push("))");
            }
            Condition::Gte(bound) => push_range(query, attribute, " >= ", bound),
            Condition::Lte(bound) => push_range(query, attribute, " <= ", bound),
            Condition::Pattern { pattern, options } => {
                query.push("doc ->> ");
                query.push_bind(attribute.clone());
                query.push(if options.contains('i') { " ~* " } else { " ~ " });
                query.push_bind(pattern.clone());
            }
        }
    }
}

/// jsonb orders values of different types by type, so the types must agree.
fn push_range(query: &mut QueryBuilder<'_, Postgres>, attribute: &str, op: &str, bound: &Value) {
    query.push("(jsonb_typeof(doc -> ");
    query.push_bind(attribute.to_owned());
    query.push(") = jsonb_typeof(");
    query.push_bind(Json(bound.clone()));
    query.push(") AND doc -> ");
    query.push_bind(attribute.to_owned());
    query.push(op);
    query.push_bind(Json(bound.clone()));
    query.push(")");
}

fn push_window(query: &mut QueryBuilder<'_, Postgres>, options: &FindOptions) {
    query.push(" ORDER BY ");
    for (attribute, order) in &options.sort {
        query.push("doc -> ");
        query.push_bind(attribute.clone());
        query.push(match order {
            SortOrder::Ascending => " ASC, ",
            SortOrder::Descending => " DESC, ",
        });
    }
    query.push("seq");

    if let Some(limit) = options.limit {
        query.push(" LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = options.skip {
        query.push(" OFFSET ");
        query.push_bind(i64::try_from(skip).unwrap_or(i64::MAX));
    }
}
