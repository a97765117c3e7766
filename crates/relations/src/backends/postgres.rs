//! PostgreSQL Backend Implementation
//!
//! Runs relationship queries through a sqlx connection pool and decodes every
//! column of every row into a [`DatabaseValue`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres};

use super::core::{DatabaseValue, QueryExecutor, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

/// Query executor backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PostgresExecutor {
    pool: Arc<Pool<Postgres>>,
}

impl PostgresExecutor {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    /// Connect lazily; the first query opens the connection
    pub fn connect_lazy(database_url: &str) -> ModelResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(database_url)
            .map_err(|e| ModelError::Database(format!("Failed to create pool: {}", e)))?;
        Ok(Self::new(Arc::new(pool)))
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params();
        let mut sqlx_query = sqlx::query(&sql);

        for param in &params {
            sqlx_query = bind_database_value(sqlx_query, param);
        }

        let rows = sqlx_query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| ModelError::Database(format!("Query fetch failed: {}", e)))?;

        rows.iter().map(row_to_map).collect()
    }
}

fn row_to_map(row: &sqlx::postgres::PgRow) -> ModelResult<Row> {
    use sqlx::{Column, Row as _};

    let mut map = HashMap::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = postgres_value_to_database_value(row, i)?;
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'a>(
    query: sqlx::query::Query<'a, Postgres, sqlx::postgres::PgArguments>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'a, Postgres, sqlx::postgres::PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &sqlx::postgres::PgRow, index: usize) -> ModelResult<DatabaseValue> {
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};

    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let raw = row
        .try_get_raw(index)
        .map_err(|e| ModelError::Serialization(format!("Failed to read column '{}': {}", column.name(), e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let decode_err = |kind: &str, e: sqlx::Error| {
        ModelError::Serialization(format!(
            "Failed to get {} value for column '{}': {}",
            kind,
            column.name(),
            e
        ))
    };

    let value = match type_name {
        "BOOL" => DatabaseValue::Bool(row.try_get(index).map_err(|e| decode_err("bool", e))?),
        "INT2" => {
            let value: i16 = row.try_get(index).map_err(|e| decode_err("int16", e))?;
            DatabaseValue::Int32(i32::from(value))
        }
        "INT4" => DatabaseValue::Int32(row.try_get(index).map_err(|e| decode_err("int32", e))?),
        "INT8" => DatabaseValue::Int64(row.try_get(index).map_err(|e| decode_err("int64", e))?),
        "FLOAT4" => {
            let value: f32 = row.try_get(index).map_err(|e| decode_err("float32", e))?;
            DatabaseValue::Float64(f64::from(value))
        }
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index).map_err(|e| decode_err("float64", e))?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            DatabaseValue::String(row.try_get(index).map_err(|e| decode_err("string", e))?)
        }
        "UUID" => DatabaseValue::Uuid(row.try_get(index).map_err(|e| decode_err("UUID", e))?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index).map_err(|e| decode_err("datetime", e))?),
        "TIMESTAMP" => {
            let value: chrono::NaiveDateTime = row.try_get(index).map_err(|e| decode_err("timestamp", e))?;
            DatabaseValue::DateTime(chrono::DateTime::from_naive_utc_and_offset(value, chrono::Utc))
        }
        "DATE" => DatabaseValue::Date(row.try_get(index).map_err(|e| decode_err("date", e))?),
        "JSON" | "JSONB" => {
            let value: JsonValue = row.try_get(index).map_err(|e| decode_err("JSON", e))?;
            DatabaseValue::Json(value)
        }
        _ => {
            // Fallback: try to get as string
            let value: String = row.try_get(index).map_err(|e| {
                ModelError::Serialization(format!(
                    "Failed to get value as string for unknown type '{}': {}",
                    type_name, e
                ))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}
