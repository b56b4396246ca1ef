//! Postgres-backed relational store (feature `postgres`).

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo};
use tracing::{debug, warn};

use safelens_core::config::StoreConfig;
use safelens_core::Row;

use crate::error::StoreError;
use crate::relational::RelationalStore;

/// Store that opens a single Postgres connection per query.
pub struct PostgresStore {
    options: PgConnectOptions,
    masked_url: String,
}

impl PostgresStore {
    pub fn from_config(config: &StoreConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);
        Self {
            options,
            masked_url: config.masked_url(),
        }
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.options.connect().await.map_err(|e| {
            warn!(url = %self.masked_url, "Failed to connect to database: {}", e);
            StoreError::Connect(e.to_string())
        })?;

        let result = sqlx::query(sql).fetch_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            debug!("Error while closing connection: {}", e);
        }

        let rows = result.map_err(|e| StoreError::Query(e.to_string()))?;
        debug!(rows = rows.len(), "Postgres query executed");
        Ok(rows.iter().map(pg_row_to_map).collect())
    }
}

/// Convert a Postgres row into a column-keyed map.
fn pg_row_to_map(row: &PgRow) -> Row {
    let mut map = Row::new();

    for column in row.columns() {
        let name = column.name();
        let value: Option<Value> = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .map(Value::String),
            "INT2" => row
                .try_get::<Option<i16>, _>(name)
                .ok()
                .flatten()
                .map(Value::from),
            "INT4" => row
                .try_get::<Option<i32>, _>(name)
                .ok()
                .flatten()
                .map(Value::from),
            "INT8" => row
                .try_get::<Option<i64>, _>(name)
                .ok()
                .flatten()
                .map(Value::from),
            "FLOAT4" | "FLOAT8" => row
                .try_get::<Option<f64>, _>(name)
                .ok()
                .flatten()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            "NUMERIC" => row
                .try_get::<Option<bigdecimal::BigDecimal>, _>(name)
                .ok()
                .flatten()
                .map(|d| d.to_string())
                .map(|s| {
                    s.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::String(s))
                }),
            "BOOL" => row
                .try_get::<Option<bool>, _>(name)
                .ok()
                .flatten()
                .map(Value::Bool),
            "JSONB" | "JSON" => row.try_get::<Option<Value>, _>(name).ok().flatten(),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .ok()
                .flatten()
                .map(|dt| Value::String(dt.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                .ok()
                .flatten()
                .map(|dt| Value::String(dt.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(name)
                .ok()
                .flatten()
                .map(|d| Value::String(d.to_string())),
            _ => row.try_get::<Option<String>, _>(name).ok().flatten().map(Value::String),
        };

        map.insert(name.to_string(), value.unwrap_or(Value::Null));
    }

    map
}
