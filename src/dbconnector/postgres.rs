//! PostgreSQL connector built on tokio-postgres.
//!
//! The DSN from [`ConnectionConfig::dsn`] is in the key=value form that
//! tokio-postgres parses natively. TLS is not negotiated; `sslmode=require`
//! fails at connect time.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::warn;

use super::{ColumnInfo, ConnectionConfig, Connector, ConnectorError, QueryResult, TableInfo};

pub struct PostgresConnector {
    client: Client,
}

impl PostgresConnector {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let pg_config = Config::from_str(&config.dsn())
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("postgres connection terminated: {err}");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Connector for PostgresConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|err| ConnectorError::Connect(err.to_string()))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<QueryResult, ConnectorError> {
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?;

        // The prepared statement knows the parameter types, so JSON args can
        // be converted to what the engine actually expects.
        let params: Vec<Box<dyn ToSql + Sync + Send>> = statement
            .params()
            .iter()
            .zip(args.iter())
            .map(|(ty, value)| json_to_pg_param(value, ty))
            .collect::<Result<_, _>>()?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(&statement, &param_refs)
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let data: Vec<Vec<Value>> = rows.iter().map(row_to_json).collect();
        let row_count = data.len();
        Ok(QueryResult {
            columns,
            rows: data,
            row_count,
        })
    }

    async fn schema(&self) -> Result<Vec<TableInfo>, ConnectorError> {
        let column_rows = self
            .client
            .query(
                "SELECT c.table_schema, c.table_name, c.column_name, c.data_type, c.is_nullable \
                 FROM information_schema.columns c \
                 JOIN information_schema.tables t \
                   ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
                 WHERE t.table_type = 'BASE TABLE' \
                   AND c.table_schema NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY c.table_schema, c.table_name, c.ordinal_position",
                &[],
            )
            .await
            .map_err(|err| ConnectorError::Schema(err.to_string()))?;

        let pk_rows = self
            .client
            .query(
                "SELECT kcu.table_schema, kcu.table_name, kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON kcu.constraint_name = tc.constraint_name \
                  AND kcu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY'",
                &[],
            )
            .await
            .map_err(|err| ConnectorError::Schema(err.to_string()))?;

        let primary_keys: HashSet<(String, String, String)> = pk_rows
            .iter()
            .map(|row| (row.get(0), row.get(1), row.get(2)))
            .collect();

        let mut tables: BTreeMap<(String, String), Vec<ColumnInfo>> = BTreeMap::new();
        for row in &column_rows {
            let schema: String = row.get(0);
            let table: String = row.get(1);
            let column: String = row.get(2);
            let data_type: String = row.get(3);
            let is_nullable: String = row.get(4);
            let primary_key =
                primary_keys.contains(&(schema.clone(), table.clone(), column.clone()));
            tables.entry((schema, table)).or_default().push(ColumnInfo {
                name: column,
                data_type,
                nullable: is_nullable == "YES",
                primary_key,
            });
        }

        Ok(tables
            .into_iter()
            .map(|((schema, name), columns)| TableInfo {
                name,
                schema,
                columns,
            })
            .collect())
    }

    async fn close(&self) {
        // Dropping the client terminates the connection task.
    }
}

fn json_to_pg_param(
    value: &Value,
    ty: &Type,
) -> Result<Box<dyn ToSql + Sync + Send>, ConnectorError> {
    let boxed: Box<dyn ToSql + Sync + Send> = if *ty == Type::BOOL {
        Box::new(value.as_bool())
    } else if *ty == Type::INT2 {
        Box::new(value.as_i64().map(|v| v as i16))
    } else if *ty == Type::INT4 {
        Box::new(value.as_i64().map(|v| v as i32))
    } else if *ty == Type::INT8 {
        Box::new(value.as_i64())
    } else if *ty == Type::FLOAT4 {
        Box::new(value.as_f64().map(|v| v as f32))
    } else if *ty == Type::FLOAT8 {
        Box::new(value.as_f64())
    } else if *ty == Type::NUMERIC {
        Box::new(match value {
            Value::Null => None,
            other => Some(
                Decimal::from_str(&scalar_to_string(other))
                    .map_err(|err| ConnectorError::Execute(format!("invalid numeric: {err}")))?,
            ),
        })
    } else if *ty == Type::DATE {
        Box::new(match value.as_str() {
            None => None,
            Some(s) => Some(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|err| ConnectorError::Execute(format!("invalid date: {err}")))?,
            ),
        })
    } else if *ty == Type::TIMESTAMP {
        Box::new(match value.as_str() {
            None => None,
            Some(s) => Some(
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                    .map_err(|err| ConnectorError::Execute(format!("invalid timestamp: {err}")))?,
            ),
        })
    } else if *ty == Type::TIMESTAMPTZ {
        Box::new(match value.as_str() {
            None => None,
            Some(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|err| ConnectorError::Execute(format!("invalid timestamp: {err}")))?,
            ),
        })
    } else if *ty == Type::UUID {
        Box::new(match value.as_str() {
            None => None,
            Some(s) => Some(
                uuid::Uuid::parse_str(s)
                    .map_err(|err| ConnectorError::Execute(format!("invalid uuid: {err}")))?,
            ),
        })
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Box::new(value.clone())
    } else {
        match value {
            Value::Null => Box::new(Option::<String>::None),
            Value::Bool(b) => Box::new(*b),
            Value::Number(n) if n.is_i64() => Box::new(n.as_i64()),
            Value::Number(n) => Box::new(n.as_f64()),
            Value::String(s) => Box::new(s.clone()),
            other => Box::new(other.to_string()),
        }
    };
    Ok(boxed)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_to_json(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| pg_cell_to_json(row, idx))
        .collect()
}

fn pg_cell_to_json(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_().clone();
    if ty == Type::BOOL {
        opt_to_json(row.try_get::<_, Option<bool>>(idx), Value::Bool)
    } else if ty == Type::INT2 {
        opt_to_json(row.try_get::<_, Option<i16>>(idx), |v| Value::from(v as i64))
    } else if ty == Type::INT4 {
        opt_to_json(row.try_get::<_, Option<i32>>(idx), |v| Value::from(v as i64))
    } else if ty == Type::INT8 {
        opt_to_json(row.try_get::<_, Option<i64>>(idx), Value::from)
    } else if ty == Type::FLOAT4 {
        opt_to_json(row.try_get::<_, Option<f32>>(idx), |v| Value::from(v as f64))
    } else if ty == Type::FLOAT8 {
        opt_to_json(row.try_get::<_, Option<f64>>(idx), Value::from)
    } else if ty == Type::NUMERIC {
        opt_to_json(row.try_get::<_, Option<Decimal>>(idx), |v| {
            v.to_f64()
                .map(Value::from)
                .unwrap_or_else(|| Value::String(v.to_string()))
        })
    } else if ty == Type::DATE {
        opt_to_json(row.try_get::<_, Option<NaiveDate>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if ty == Type::TIMESTAMP {
        opt_to_json(row.try_get::<_, Option<NaiveDateTime>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if ty == Type::TIMESTAMPTZ {
        opt_to_json(row.try_get::<_, Option<DateTime<Utc>>>(idx), |v| {
            Value::String(v.to_rfc3339())
        })
    } else if ty == Type::UUID {
        opt_to_json(row.try_get::<_, Option<uuid::Uuid>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if ty == Type::JSON || ty == Type::JSONB {
        opt_to_json(row.try_get::<_, Option<Value>>(idx), |v| v)
    } else {
        opt_to_json(row.try_get::<_, Option<String>>(idx), Value::String)
    }
}

fn opt_to_json<T>(
    result: Result<Option<T>, tokio_postgres::Error>,
    convert: impl FnOnce(T) -> Value,
) -> Value {
    match result {
        Ok(Some(v)) => convert(v),
        _ => Value::Null,
    }
}
