//! Document store client
//!
//! Schema-less documents (flat JSON maps) grouped by collection path and
//! persisted in SQLite. The store assigns ids and `createdAt`/`updatedAt`
//! timestamps on write and announces every change on a broadcast channel
//! so live queries can re-run.

use super::paths::{CollectionPath, DocPath};
use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type Fields = Map<String, Value>;

/// Field names the store owns; clients may not write them
const RESERVED_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Serialize a value into document fields
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Generic(format!(
            "Document body must be an object, got {}",
            other
        ))),
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: CollectionPath,
    pub id: String,
    pub data: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn path(&self) -> DocPath {
        self.collection.doc(&self.id)
    }

    /// Field lookup that also resolves the store-owned metadata fields
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "createdAt" => serde_json::to_value(self.created_at).ok(),
            "updatedAt" => serde_json::to_value(self.updated_at).ok(),
            _ => self.data.get(name).cloned(),
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    /// Decode into a typed model, with `id`, `createdAt` and `updatedAt`
    /// merged into the body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut body = self.data.clone();
        body.insert("id".to_string(), Value::String(self.id.clone()));
        body.insert("createdAt".to_string(), serde_json::to_value(self.created_at)?);
        body.insert("updatedAt".to_string(), serde_json::to_value(self.updated_at)?);
        Ok(serde_json::from_value(Value::Object(body))?)
    }
}

#[derive(FromRow)]
struct DocumentRow {
    collection: String,
    id: String,
    data: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(Document {
            collection: CollectionPath::parse(&row.collection)?,
            id: row.id,
            data: serde_json::from_str(&row.data)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A single field transform
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Delete,
    Increment(i64),
    /// Append each value not already present
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value
    ArrayRemove(Vec<Value>),
}

/// Partial update applied field by field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push((field.to_string(), FieldOp::Set(value.into())));
        self
    }

    pub fn delete(mut self, field: &str) -> Self {
        self.ops.push((field.to_string(), FieldOp::Delete));
        self
    }

    pub fn increment(mut self, field: &str, by: i64) -> Self {
        self.ops.push((field.to_string(), FieldOp::Increment(by)));
        self
    }

    pub fn array_union(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops
            .push((field.to_string(), FieldOp::ArrayUnion(vec![value.into()])));
        self
    }

    pub fn array_remove(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops
            .push((field.to_string(), FieldOp::ArrayRemove(vec![value.into()])));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    /// Apply every op in order to a document body
    pub fn apply(&self, data: &mut Fields) -> Result<()> {
        for (field, op) in &self.ops {
            if RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(AppError::Validation(format!(
                    "Field '{}' is managed by the store",
                    field
                )));
            }

            match op {
                FieldOp::Set(value) => {
                    data.insert(field.clone(), value.clone());
                }
                FieldOp::Delete => {
                    data.remove(field);
                }
                FieldOp::Increment(by) => {
                    let current = match data.get(field) {
                        None | Some(Value::Null) => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            AppError::Validation(format!("Field '{}' is not an integer", field))
                        })?,
                    };
                    data.insert(field.clone(), Value::from(current + by));
                }
                FieldOp::ArrayUnion(values) => {
                    let array = array_field(data, field)?;
                    for value in values {
                        if !array.contains(value) {
                            array.push(value.clone());
                        }
                    }
                }
                FieldOp::ArrayRemove(values) => {
                    let array = array_field(data, field)?;
                    array.retain(|existing| !values.contains(existing));
                }
            }
        }
        Ok(())
    }
}

fn array_field<'a>(data: &'a mut Fields, field: &str) -> Result<&'a mut Vec<Value>> {
    let entry = data
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if entry.is_null() {
        *entry = Value::Array(Vec::new());
    }
    entry
        .as_array_mut()
        .ok_or_else(|| AppError::Validation(format!("Field '{}' is not an array", field)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Query over one collection: equality filters, one ordering field, a limit
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    filters: Vec<(String, Value)>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.collection == self.collection
            && self
                .filters
                .iter()
                .all(|(field, expected)| doc.field(field).as_ref() == Some(expected))
    }

    /// Filter, order and truncate a collection's documents
    pub fn evaluate(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        match &self.order_by {
            Some((field, direction)) => docs.sort_by(|a, b| {
                let ord = compare_values(a.field(field).as_ref(), b.field(field).as_ref());
                let ord = match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            }),
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over field values: missing/null first, then by type, then
/// by value. Strings that are both RFC 3339 timestamps compare as instants.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Array(x)), Some(Value::Array(y))) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Store client over the `documents` table
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    changes: broadcast::Sender<CollectionPath>,
    clock: Arc<dyn Clock>,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            changes,
            clock,
        }
    }

    /// Server time used for document timestamps
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn watch_changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.changes.subscribe()
    }

    fn announce(&self, collection: &CollectionPath) {
        // No receivers just means nobody is listening
        let _ = self.changes.send(collection.clone());
    }

    /// Create a document and return its generated id
    pub async fn create(&self, collection: &CollectionPath, mut data: Fields) -> Result<String> {
        for field in RESERVED_FIELDS {
            data.remove(*field);
        }

        let id = Uuid::new_v4().to_string();
        let now = self.clock.now();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection.as_str())
        .bind(&id)
        .bind(serde_json::to_string(&data)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Created document: {}/{}", collection, id);
        self.announce(collection);
        Ok(id)
    }

    /// Get a document by path
    pub async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT * FROM documents WHERE collection = ? AND id = ?
            "#,
        )
        .bind(path.collection.as_str())
        .bind(&path.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    /// Apply a patch to an existing document
    pub async fn update(&self, path: &DocPath, patch: Patch) -> Result<Document> {
        self.transact(path, move |_| Ok(patch)).await
    }

    /// Read the document, let `f` inspect it and produce a patch, and write
    /// the result, all inside one transaction.
    ///
    /// An error from `f` aborts without writing. An empty patch leaves the
    /// document (and its `updatedAt`) untouched.
    ///
    /// The write lock is taken before the read; a deferred transaction
    /// could not upgrade once another writer committed after its snapshot.
    pub async fn transact<F>(&self, path: &DocPath, f: F) -> Result<Document>
    where
        F: FnOnce(&Document) -> Result<Patch> + Send,
    {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT * FROM documents WHERE collection = ? AND id = ?
            "#,
        )
        .bind(path.collection.as_str())
        .bind(&path.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Document", path.to_string()))?;

        let mut doc = Document::try_from(row)?;
        let patch = f(&doc)?;

        if patch.is_empty() {
            return Ok(doc);
        }

        patch.apply(&mut doc.data)?;
        doc.updated_at = self.clock.now();

        sqlx::query(
            r#"
            UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?
            "#,
        )
        .bind(serde_json::to_string(&doc.data)?)
        .bind(doc.updated_at)
        .bind(path.collection.as_str())
        .bind(&path.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Updated document: {}", path);
        self.announce(&path.collection);
        Ok(doc)
    }

    /// Delete a document
    pub async fn delete(&self, path: &DocPath) -> Result<()> {
        let rows = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(path.collection.as_str())
            .bind(&path.id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found("Document", path.to_string()));
        }

        tracing::debug!("Deleted document: {}", path);
        self.announce(&path.collection);
        Ok(())
    }

    /// One-shot fetch of every document matching the query
    pub async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT * FROM documents WHERE collection = ?
            "#,
        )
        .bind(query.collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        let docs = rows
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(query.evaluate(docs))
    }
}
