//! In-memory datastore. One row list per entity, rows are JSON objects.

use super::{DataSource, QueryBuilder};
use crate::entity::EntityKey;
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Rows = Vec<Value>;

/// Process-local storage keyed by entity collection. Insert assigns a v4
/// uuid when the body carries no `id`.
#[derive(Clone, Default)]
pub struct MemoryDataSource {
    tables: Arc<RwLock<HashMap<String, Rows>>>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload rows for an entity. Existing rows for that entity are kept.
    pub fn seed(&self, entity: &EntityKey, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.write().expect("memory tables poisoned");
        tables
            .entry(entity.collection_segment())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of an entity's rows, in insertion order.
    pub fn rows(&self, entity: &EntityKey) -> Vec<Value> {
        self.tables
            .read()
            .expect("memory tables poisoned")
            .get(&entity.collection_segment())
            .cloned()
            .unwrap_or_default()
    }
}

impl DataSource for MemoryDataSource {
    fn builder(&self, entity: &EntityKey) -> Box<dyn QueryBuilder> {
        Box::new(MemoryQueryBuilder {
            tables: Arc::clone(&self.tables),
            table: entity.collection_segment(),
            filters: Vec::new(),
            limit: None,
            offset: None,
        })
    }
}

struct MemoryQueryBuilder {
    tables: Arc<RwLock<HashMap<String, Rows>>>,
    table: String,
    filters: Vec<(String, Value)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

/// Loose equality so a `?age=30` string filter matches a numeric column and
/// a path id matches either a string or numeric `id`.
fn value_matches(row_value: &Value, wanted: &Value) -> bool {
    if row_value == wanted {
        return true;
    }
    match (row_value, wanted) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        (Value::Bool(b), Value::String(s)) => s.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
        _ => false,
    }
}

fn id_matches(row: &Value, id: &str) -> bool {
    row.get("id")
        .map(|v| value_matches(v, &Value::String(id.to_string())))
        .unwrap_or(false)
}

impl MemoryQueryBuilder {
    fn row_matches(&self, row: &Value) -> bool {
        self.filters
            .iter()
            .all(|(col, wanted)| row.get(col).map(|v| value_matches(v, wanted)).unwrap_or(false))
    }
}

#[async_trait]
impl QueryBuilder for MemoryQueryBuilder {
    fn filter(mut self: Box<Self>, column: &str, value: Value) -> Box<dyn QueryBuilder> {
        self.filters.push((column.to_string(), value));
        self
    }

    fn limit(mut self: Box<Self>, n: u32) -> Box<dyn QueryBuilder> {
        self.limit = Some(n);
        self
    }

    fn offset(mut self: Box<Self>, n: u32) -> Box<dyn QueryBuilder> {
        self.offset = Some(n);
        self
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, AppError> {
        let tables = self.tables.read().expect("memory tables poisoned");
        let rows = tables.get(&self.table).map(Vec::as_slice).unwrap_or(&[]);
        let offset = self.offset.unwrap_or(0) as usize;
        let out: Vec<Value> = rows
            .iter()
            .filter(|r| self.row_matches(r))
            .skip(offset)
            .take(self.limit.map(|n| n as usize).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(out)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Value>, AppError> {
        let tables = self.tables.read().expect("memory tables poisoned");
        Ok(tables
            .get(&self.table)
            .and_then(|rows| rows.iter().find(|r| id_matches(r, id)))
            .cloned())
    }

    async fn insert(&self, body: &Value) -> Result<Value, AppError> {
        let mut row = match body {
            Value::Object(m) => m.clone(),
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let row = Value::Object(row);
        let mut tables = self.tables.write().expect("memory tables poisoned");
        tables.entry(self.table.clone()).or_default().push(row.clone());
        Ok(row)
    }

    async fn patch(&self, id: &str, body: &Value) -> Result<Option<Value>, AppError> {
        let patch = match body {
            Value::Object(m) => m,
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        let mut tables = self.tables.write().expect("memory tables poisoned");
        let rows = match tables.get_mut(&self.table) {
            Some(rows) => rows,
            None => return Ok(None),
        };
        for row in rows.iter_mut() {
            if id_matches(row, id) {
                if let Value::Object(existing) = row {
                    for (k, v) in patch {
                        if k != "id" {
                            existing.insert(k.clone(), v.clone());
                        }
                    }
                }
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn remove(&self, id: &str) -> Result<Option<Value>, AppError> {
        let mut tables = self.tables.write().expect("memory tables poisoned");
        let rows = match tables.get_mut(&self.table) {
            Some(rows) => rows,
            None => return Ok(None),
        };
        let pos = rows.iter().position(|r| id_matches(r, id));
        Ok(pos.map(|i| rows.remove(i)))
    }
}
