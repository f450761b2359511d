//! Oracle connector.
//!
//! The `oracle` crate is a blocking driver, so every operation runs under
//! `spawn_blocking` to keep the async workers free.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task;

use super::{ColumnInfo, ConnectionConfig, Connector, ConnectorError, QueryResult, TableInfo};

pub struct OracleConnector {
    conn: Arc<Mutex<oracle::Connection>>,
}

impl OracleConnector {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let username = config.username.clone();
        let password = config.password.clone();
        let connect_string = format!("//{}:{}/{}", config.host, config.port, config.database);

        let conn = task::spawn_blocking(move || {
            oracle::Connection::connect(&username, &password, &connect_string)
        })
        .await
        .map_err(|err| ConnectorError::Connect(err.to_string()))?
        .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait::async_trait]
impl Connector for OracleConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || conn.lock().unwrap().ping())
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?
            .map_err(|err| ConnectorError::Connect(err.to_string()))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<QueryResult, ConnectorError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let args = args.to_vec();

        task::spawn_blocking(move || -> Result<QueryResult, ConnectorError> {
            let conn = conn.lock().unwrap();
            let params: Vec<Box<dyn oracle::sql_type::ToSql>> =
                args.iter().map(json_to_ora_param).collect();
            let param_refs: Vec<&dyn oracle::sql_type::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();

            let result_set = conn
                .query(&sql, &param_refs)
                .map_err(|err| ConnectorError::Execute(err.to_string()))?;

            let columns: Vec<String> = result_set
                .column_info()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let column_count = columns.len();

            let mut rows = Vec::new();
            for row in result_set {
                let row = row.map_err(|err| ConnectorError::Execute(err.to_string()))?;
                rows.push(
                    (0..column_count)
                        .map(|idx| cell_to_json(&row, idx))
                        .collect(),
                );
            }

            let row_count = rows.len();
            Ok(QueryResult {
                columns,
                rows,
                row_count,
            })
        })
        .await
        .map_err(|err| ConnectorError::Execute(err.to_string()))?
    }

    async fn schema(&self) -> Result<Vec<TableInfo>, ConnectorError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || -> Result<Vec<TableInfo>, ConnectorError> {
            let conn = conn.lock().unwrap();

            let pk_rows = conn
                .query(
                    "SELECT cols.table_name, cols.column_name \
                     FROM user_cons_columns cols \
                     JOIN user_constraints cons ON cons.constraint_name = cols.constraint_name \
                     WHERE cons.constraint_type = 'P'",
                    &[],
                )
                .map_err(|err| ConnectorError::Schema(err.to_string()))?;
            let mut primary_keys = std::collections::HashSet::new();
            for row in pk_rows {
                let row = row.map_err(|err| ConnectorError::Schema(err.to_string()))?;
                let table: String = row.get(0).unwrap_or_default();
                let column: String = row.get(1).unwrap_or_default();
                primary_keys.insert((table, column));
            }

            let rows = conn
                .query(
                    "SELECT table_name, column_name, data_type, nullable \
                     FROM user_tab_columns ORDER BY table_name, column_id",
                    &[],
                )
                .map_err(|err| ConnectorError::Schema(err.to_string()))?;

            let mut tables: Vec<TableInfo> = Vec::new();
            for row in rows {
                let row = row.map_err(|err| ConnectorError::Schema(err.to_string()))?;
                let table: String = row.get(0).unwrap_or_default();
                let name: String = row.get(1).unwrap_or_default();
                let column = ColumnInfo {
                    primary_key: primary_keys.contains(&(table.clone(), name.clone())),
                    name,
                    data_type: row.get(2).unwrap_or_default(),
                    nullable: row.get::<_, String>(3).unwrap_or_default() == "Y",
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
        })
        .await
        .map_err(|err| ConnectorError::Schema(err.to_string()))?
    }

    async fn close(&self) {
        let conn = self.conn.clone();
        let _ = task::spawn_blocking(move || conn.lock().unwrap().close()).await;
    }
}

fn json_to_ora_param(value: &Value) -> Box<dyn oracle::sql_type::ToSql> {
    match value {
        Value::Null => Box::new(None::<String>),
        // Oracle has no boolean bind type; 0/1 matches NUMBER(1) columns.
        Value::Bool(b) => Box::new(*b as i64),
        Value::Number(n) if n.is_i64() => Box::new(n.as_i64().unwrap_or_default()),
        Value::Number(n) => Box::new(n.as_f64().unwrap_or_default()),
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

fn cell_to_json(row: &oracle::Row, idx: usize) -> Value {
    if let Ok(v) = row.get::<usize, Option<i64>>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.get::<usize, Option<f64>>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.get::<usize, Option<String>>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}
