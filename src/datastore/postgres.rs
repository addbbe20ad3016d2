//! PostgreSQL datastore via sqlx. One table per entity collection
//! (`EntityKey::new("user")` reads and writes `"users"`), rows decoded to
//! JSON objects column by column. The primary identifier is the `id` column.

use super::{DataSource, QueryBuilder};
use crate::entity::EntityKey;
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Column, Row};

#[derive(Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DataSource for PgDataSource {
    fn builder(&self, entity: &EntityKey) -> Box<dyn QueryBuilder> {
        Box::new(PgQueryBuilder {
            pool: self.pool.clone(),
            table: entity.collection_segment(),
            filters: Vec::new(),
            limit: None,
            offset: None,
        })
    }
}

struct PgQueryBuilder {
    pool: PgPool,
    table: String,
    filters: Vec<(String, Value)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

/// Quote an identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Coerce a path/query string into the JSON value most likely to type-match
/// the target column: integer, then uuid/text.
fn typed_param(s: &str) -> Value {
    if let Ok(n) = s.parse::<i64>() {
        return Value::Number(n.into());
    }
    Value::String(s.to_string())
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, PgArguments>;

fn bind_json<'q>(q: PgQuery<'q>, v: &Value) -> PgQuery<'q> {
    match v {
        Value::Null => q.bind(Option::<String>::None),
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else {
                q.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => {
            if let Ok(u) = uuid::Uuid::parse_str(s) {
                q.bind(u)
            } else {
                q.bind(s.clone())
            }
        }
        other => q.bind(other.clone()),
    }
}

macro_rules! try_cell {
    ($row:expr, $name:expr, $t:ty, $conv:expr) => {
        if let Ok(Some(v)) = $row.try_get::<Option<$t>, _>($name) {
            #[allow(clippy::redundant_closure_call)]
            return ($conv)(v);
        }
    };
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    try_cell!(row, name, i16, |n: i16| Value::Number(n.into()));
    try_cell!(row, name, i32, |n: i32| Value::Number(n.into()));
    try_cell!(row, name, i64, |n: i64| Value::Number(n.into()));
    try_cell!(row, name, f32, |n: f32| serde_json::Number::from_f64(n as f64)
        .map(Value::Number)
        .unwrap_or(Value::Null));
    try_cell!(row, name, f64, |n: f64| serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null));
    try_cell!(row, name, bool, Value::Bool);
    try_cell!(row, name, uuid::Uuid, |u: uuid::Uuid| Value::String(u.to_string()));
    try_cell!(row, name, chrono::DateTime<chrono::Utc>, |d: chrono::DateTime<chrono::Utc>| {
        Value::String(d.to_rfc3339())
    });
    try_cell!(row, name, chrono::NaiveDateTime, |d: chrono::NaiveDateTime| {
        Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    });
    try_cell!(row, name, chrono::NaiveDate, |d: chrono::NaiveDate| {
        Value::String(d.format("%Y-%m-%d").to_string())
    });
    try_cell!(row, name, String, Value::String);
    try_cell!(row, name, Value, |j: Value| j);
    Value::Null
}

fn row_to_json(row: &PgRow) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

impl PgQueryBuilder {
    fn where_clause(&self, next_param: &mut u32) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .filters
            .iter()
            .map(|(col, _)| {
                let clause = format!("{} = ${}", quoted(col), next_param);
                *next_param += 1;
                clause
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    async fn fetch_optional(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = bind_json(query, p);
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

#[async_trait]
impl QueryBuilder for PgQueryBuilder {
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
        const DEFAULT_LIMIT: u32 = 100;
        let mut next_param = 1;
        let where_clause = self.where_clause(&mut next_param);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).min(1000);
        let offset = self.offset.unwrap_or(0);
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
            quoted(&self.table),
            where_clause,
            quoted("id"),
            limit,
            offset
        );
        tracing::debug!(sql = %sql, params = ?self.filters, "query");
        let mut query = sqlx::query(&sql);
        for (_, v) in &self.filters {
            query = bind_json(query, v);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Value>, AppError> {
        let sql = format!("SELECT * FROM {} WHERE {} = $1", quoted(&self.table), quoted("id"));
        self.fetch_optional(&sql, &[typed_param(id)]).await
    }

    async fn insert(&self, body: &Value) -> Result<Value, AppError> {
        let obj = match body {
            Value::Object(m) => m,
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        let sql = if obj.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(&self.table))
        } else {
            let cols: Vec<String> = obj.keys().map(|k| quoted(k)).collect();
            let placeholders: Vec<String> = (1..=obj.len()).map(|n| format!("${n}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                quoted(&self.table),
                cols.join(", "),
                placeholders.join(", ")
            )
        };
        let params: Vec<Value> = obj.values().cloned().collect();
        self.fetch_optional(&sql, &params)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn patch(&self, id: &str, body: &Value) -> Result<Option<Value>, AppError> {
        let obj = match body {
            Value::Object(m) => m,
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        let mut sets = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        for (k, v) in obj {
            if k == "id" {
                continue;
            }
            params.push(v.clone());
            sets.push(format!("{} = ${}", quoted(k), params.len()));
        }
        if sets.is_empty() {
            return self.fetch_by_id(id).await;
        }
        params.push(typed_param(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING *",
            quoted(&self.table),
            sets.join(", "),
            quoted("id"),
            params.len()
        );
        self.fetch_optional(&sql, &params).await
    }

    async fn remove(&self, id: &str) -> Result<Option<Value>, AppError> {
        let sql = format!("DELETE FROM {} WHERE {} = $1 RETURNING *", quoted(&self.table), quoted("id"));
        self.fetch_optional(&sql, &[typed_param(id)]).await
    }
}
