//! MySQL connector built on sqlx.
//!
//! The Go-style DSN is display/test surface only; the actual connection is
//! built field-wise because sqlx parses URL-form DSNs exclusively.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row};

use super::{ColumnInfo, ConnectionConfig, Connector, ConnectorError, QueryResult, TableInfo};

pub struct MySqlConnector {
    pool: MySqlPool,
}

impl MySqlConnector {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Connector for MySqlConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| ConnectorError::Connect(err.to_string()))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<QueryResult, ConnectorError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                Value::Number(n) => query.bind(n.as_f64()),
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let data: Vec<Vec<Value>> = rows.iter().map(row_to_json).collect();
        let row_count = data.len();
        Ok(QueryResult {
            columns,
            rows: data,
            row_count,
        })
    }

    async fn schema(&self) -> Result<Vec<TableInfo>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT table_name, column_name, data_type, is_nullable, column_key \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() \
             ORDER BY table_name, ordinal_position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ConnectorError::Schema(err.to_string()))?;

        let mut tables: Vec<TableInfo> = Vec::new();
        for row in &rows {
            let table: String = row
                .try_get::<String, _>(0)
                .map_err(|err| ConnectorError::Schema(err.to_string()))?;
            let column = ColumnInfo {
                name: row
                    .try_get::<String, _>(1)
                    .map_err(|err| ConnectorError::Schema(err.to_string()))?,
                data_type: row.try_get::<String, _>(2).unwrap_or_default(),
                nullable: row.try_get::<String, _>(3).unwrap_or_default() == "YES",
                primary_key: row.try_get::<String, _>(4).unwrap_or_default() == "PRI",
            };

            match tables.last_mut() {
                Some(last) if last.name == table => last.columns.push(column),
                _ => tables.push(TableInfo {
                    name: table,
                    schema: String::new(),
                    columns: vec![column],
                }),
            }
        }
        Ok(tables)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// MySQL sends no type metadata sqlx can map one-to-one onto JSON, so cells
/// are extracted by trying decodes from most to least specific.
fn row_to_json(row: &MySqlRow) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| cell_to_json(row, idx))
        .collect()
}

fn cell_to_json(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}
