use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{Record, Resource},
    query::ProviderQuery,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected row shape returned from {0}")]
    RowShape(&'static str),
}

/// One page of a collection query plus the count of every matching row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Resource>,
    pub total: u64,
}

/// Repository Trait
///
/// The relational store as the mediator sees it: tables addressed by name,
/// rows as JSON objects. Table and column names always come from the static
/// resource descriptors.
///
/// **Send + Sync + async_trait** let `Arc<dyn Repository>` cross Axum's task
/// boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts every row in one statement and returns them as stored
    /// (generated id and timestamps included).
    async fn insert(&self, table: &'static str, rows: Vec<Record>) -> Result<Vec<Resource>, StoreError>;

    async fn find(&self, table: &'static str, id: &str) -> Result<Option<Resource>, StoreError>;

    async fn select(&self, query: &ProviderQuery) -> Result<Page, StoreError>;

    /// Applies `patch` to the row; keys absent from the patch keep their value.
    async fn update(
        &self,
        table: &'static str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Resource>, StoreError>;

    /// Returns false when no row matched.
    async fn delete(&self, table: &'static str, id: &str) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the provider's Postgres. Rows are converted with
/// `to_jsonb` on the way out and `jsonb_populate_record(set)` on the way in,
/// so one implementation serves every resource kind.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn into_resource(table: &'static str, value: Value) -> Result<Resource, StoreError> {
    match value {
        Value::Object(record) => Ok(Resource(record)),
        _ => Err(StoreError::RowShape(table)),
    }
}

/// Column list shared by every row of an insert, in first-seen order.
fn columns_of(rows: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Appends the WHERE predicates of a collection query. The caller has
/// already pushed `WHERE TRUE`.
fn push_predicates(builder: &mut QueryBuilder<'_, Postgres>, query: &ProviderQuery) {
    for (column, value) in &query.equals {
        builder
            .push(" AND t.")
            .push(quote(column))
            .push("::text = ")
            .push_bind(value.clone());
    }

    for (column, needle) in &query.contains {
        builder
            .push(" AND t.")
            .push(quote(column))
            .push(" ILIKE ")
            .push_bind(like_pattern(needle));
    }

    if let Some(search) = &query.search {
        let pattern = like_pattern(&search.term);
        builder.push(" AND (");
        for (i, field) in search.fields.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder
                .push("t.")
                .push(quote(field))
                .push(" ILIKE ")
                .push_bind(pattern.clone());
        }
        builder.push(")");
    }

    if let Some(range) = &query.range {
        if let Some(from) = range.from {
            builder
                .push(" AND t.")
                .push(quote(range.field))
                .push(" >= ")
                .push_bind(from);
        }
        if let Some(to) = range.to {
            builder
                .push(" AND t.")
                .push(quote(range.field))
                .push(" <= ")
                .push_bind(to);
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// insert
    ///
    /// `INSERT .. SELECT .. FROM jsonb_populate_recordset` lets Postgres cast
    /// each JSON value to its column type; columns not supplied keep their
    /// database defaults.
    async fn insert(&self, table: &'static str, rows: Vec<Record>) -> Result<Vec<Resource>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let columns = columns_of(&rows)
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO ");
        builder
            .push(quote(table))
            .push(" AS t (")
            .push(&columns)
            .push(") SELECT ")
            .push(&columns)
            .push(" FROM jsonb_populate_recordset(NULL::")
            .push(quote(table))
            .push(", ")
            .push_bind(payload)
            .push(") RETURNING to_jsonb(t.*)");

        let inserted = builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(table, count = inserted.len(), "rows inserted");
        inserted
            .into_iter()
            .map(|row| into_resource(table, row))
            .collect()
    }

    async fn find(&self, table: &'static str, id: &str) -> Result<Option<Resource>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT to_jsonb(t.*) FROM ");
        builder
            .push(quote(table))
            .push(" AS t WHERE t.id::text = ")
            .push_bind(id.to_string());

        builder
            .build_query_scalar::<Value>()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| into_resource(table, row))
            .transpose()
    }

    /// select
    ///
    /// Runs the page query and a COUNT over the same predicates. Sorting is
    /// NULLS LAST in both directions.
    async fn select(&self, query: &ProviderQuery) -> Result<Page, StoreError> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM ");
        count.push(quote(query.table)).push(" AS t WHERE TRUE");
        push_predicates(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut page: QueryBuilder<Postgres> = QueryBuilder::new("SELECT to_jsonb(t.*) FROM ");
        page.push(quote(query.table)).push(" AS t WHERE TRUE");
        push_predicates(&mut page, query);
        page.push(" ORDER BY t.")
            .push(quote(query.order_by))
            .push(if query.ascending { " ASC" } else { " DESC" })
            .push(" NULLS LAST LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows = page
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| into_resource(query.table, row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            rows,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    /// update
    ///
    /// Only the patch's columns appear in the SET list.
    async fn update(
        &self,
        table: &'static str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Resource>, StoreError> {
        if patch.is_empty() {
            return self.find(table, id).await;
        }

        let columns: Vec<String> = patch.keys().map(|c| quote(c)).collect();
        let column_list = columns.join(", ");

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE ");
        builder.push(quote(table)).push(" AS t SET ");
        if columns.len() == 1 {
            builder.push(&column_list).push(" = (SELECT ");
        } else {
            builder.push("(").push(&column_list).push(") = (SELECT ");
        }
        builder
            .push(&column_list)
            .push(" FROM jsonb_populate_record(NULL::")
            .push(quote(table))
            .push(", ")
            .push_bind(Value::Object(patch))
            .push(")) WHERE t.id::text = ")
            .push_bind(id.to_string())
            .push(" RETURNING to_jsonb(t.*)");

        builder
            .build_query_scalar::<Value>()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| into_resource(table, row))
            .transpose()
    }

    async fn delete(&self, table: &'static str, id: &str) -> Result<bool, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("DELETE FROM ");
        builder
            .push(quote(table))
            .push(" WHERE id::text = ")
            .push_bind(id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-memory double ---

#[derive(Debug, Default)]
struct InMemoryInner {
    tables: HashMap<&'static str, Vec<Record>>,
    failing: HashSet<&'static str>,
    insert_calls: usize,
    mutation_calls: usize,
    sequence: i64,
}

impl InMemoryInner {
    /// Assigns the id and timestamps the database would generate. Timestamps
    /// strictly increase so default ordering is deterministic.
    fn stamp(&mut self, mut row: Record) -> Record {
        self.sequence += 1;
        let now = (Utc::now() + chrono::Duration::microseconds(self.sequence)).to_rfc3339();
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(now.clone()));
        row.entry("updated_at").or_insert_with(|| Value::String(now));
        row
    }

    fn check_writable(&self, table: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(table) {
            return Err(StoreError::Unavailable(format!("writes to {table} are failing")));
        }
        Ok(())
    }
}

/// InMemoryRepository
///
/// Test double with the same filtering, search, range and ordering
/// semantics as `PostgresRepository`. It also counts write attempts so tests
/// can assert that rejected requests never reached the store.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    inner: Mutex<InMemoryInner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing the call counters.
    pub fn seed(&self, table: &'static str, rows: Vec<Record>) -> Vec<Resource> {
        let mut inner = self.inner.lock();
        let stamped: Vec<Record> = rows.into_iter().map(|row| inner.stamp(row)).collect();
        inner
            .tables
            .entry(table)
            .or_default()
            .extend(stamped.iter().cloned());
        stamped.into_iter().map(Resource).collect()
    }

    /// Every subsequent insert, update and delete on `table` fails.
    pub fn fail_writes_to(&self, table: &'static str) {
        self.inner.lock().failing.insert(table);
    }

    pub fn rows(&self, table: &'static str) -> Vec<Resource> {
        self.inner
            .lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Resource).collect())
            .unwrap_or_default()
    }

    pub fn insert_calls(&self) -> usize {
        self.inner.lock().insert_calls
    }

    /// Update and delete attempts.
    pub fn mutation_calls(&self) -> usize {
        self.inner.lock().mutation_calls
    }
}

fn text_of(row: &Record, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn ilike(row: &Record, field: &str, needle: &str) -> bool {
    text_of(row, field).is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase()))
}

fn timestamp_of(row: &Record, field: &str) -> Option<DateTime<Utc>> {
    row.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn matches(row: &Record, query: &ProviderQuery) -> bool {
    let equals = query
        .equals
        .iter()
        .all(|(column, value)| text_of(row, column).as_deref() == Some(value.as_str()));
    let contains = query
        .contains
        .iter()
        .all(|(column, needle)| ilike(row, column, needle));
    let search = query.search.as_ref().is_none_or(|search| {
        search.fields.iter().any(|field| ilike(row, field, &search.term))
    });
    let range = query.range.as_ref().is_none_or(|range| {
        let Some(ts) = timestamp_of(row, range.field) else {
            return false;
        };
        range.from.is_none_or(|from| ts >= from) && range.to.is_none_or(|to| ts <= to)
    });
    equals && contains && search && range
}

/// Nulls sort last in both directions.
fn compare(a: &Record, b: &Record, field: &str, ascending: bool) -> Ordering {
    let left = a.get(field).filter(|v| !v.is_null());
    let right = b.get(field).filter(|v| !v.is_null());
    let ordering = match (left, right) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => match (timestamp_of(a, field), timestamp_of(b, field)) {
            (Some(tx), Some(ty)) => tx.cmp(&ty),
            _ => x.to_string().cmp(&y.to_string()),
        },
    };
    if ascending { ordering } else { ordering.reverse() }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, table: &'static str, rows: Vec<Record>) -> Result<Vec<Resource>, StoreError> {
        let mut inner = self.inner.lock();
        inner.insert_calls += 1;
        inner.check_writable(table)?;

        let stamped: Vec<Record> = rows.into_iter().map(|row| inner.stamp(row)).collect();
        inner
            .tables
            .entry(table)
            .or_default()
            .extend(stamped.iter().cloned());
        Ok(stamped.into_iter().map(Resource).collect())
    }

    async fn find(&self, table: &'static str, id: &str) -> Result<Option<Resource>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| text_of(row, "id").as_deref() == Some(id)))
            .cloned()
            .map(Resource))
    }

    async fn select(&self, query: &ProviderQuery) -> Result<Page, StoreError> {
        let inner = self.inner.lock();
        let mut matching: Vec<&Record> = inner
            .tables
            .get(query.table)
            .map(|rows| rows.iter().filter(|row| matches(row, query)).collect())
            .unwrap_or_default();
        matching.sort_by(|a, b| compare(a, b, query.order_by, query.ascending));

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .cloned()
            .map(Resource)
            .collect();
        Ok(Page { rows, total })
    }

    async fn update(
        &self,
        table: &'static str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Resource>, StoreError> {
        let mut inner = self.inner.lock();
        inner.mutation_calls += 1;
        inner.check_writable(table)?;

        let Some(row) = inner
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| text_of(row, "id").as_deref() == Some(id)))
        else {
            return Ok(None);
        };
        row.extend(patch);
        Ok(Some(Resource(row.clone())))
    }

    async fn delete(&self, table: &'static str, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        inner.mutation_calls += 1;
        inner.check_writable(table)?;

        let Some(rows) = inner.tables.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| text_of(row, "id").as_deref() != Some(id));
        Ok(rows.len() < before)
    }
}
