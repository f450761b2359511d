//! SQL Server connector built on tiberius over a tokio TCP stream.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{ColumnInfo, ConnectionConfig, Connector, ConnectorError, QueryResult, TableInfo};

pub struct SqlServerConnector {
    // tiberius clients are exclusive; one tool call owns one connector, the
    // mutex only satisfies the shared-reference trait surface.
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl SqlServerConnector {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let mut tds_config = Config::new();
        tds_config.host(&config.host);
        tds_config.port(config.port);
        tds_config.database(&config.database);
        tds_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        tds_config.trust_cert();

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        let client = Client::connect(tds_config, tcp.compat_write())
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait::async_trait]
impl Connector for SqlServerConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query("SELECT 1")
            .await
            .map_err(|err| ConnectorError::Connect(err.to_string()))?;
        stream
            .into_results()
            .await
            .map(|_| ())
            .map_err(|err| ConnectorError::Connect(err.to_string()))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<QueryResult, ConnectorError> {
        let params: Vec<Box<dyn ToSql>> = args.iter().map(json_to_tds_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut client = self.client.lock().await;
        let mut stream = client
            .query(sql, &param_refs)
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?;

        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|err| ConnectorError::Execute(err.to_string()))?;

        let data: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| cell_to_json(&cell)).collect())
            .collect();
        let row_count = data.len();
        Ok(QueryResult {
            columns,
            rows: data,
            row_count,
        })
    }

    async fn schema(&self) -> Result<Vec<TableInfo>, ConnectorError> {
        let mut client = self.client.lock().await;
        let rows = client
            .simple_query(
                "SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, \
                        CASE WHEN kcu.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS IS_PK \
                 FROM INFORMATION_SCHEMA.COLUMNS c \
                 LEFT JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                   ON tc.TABLE_SCHEMA = c.TABLE_SCHEMA AND tc.TABLE_NAME = c.TABLE_NAME \
                  AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
                 LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                   ON kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
                  AND kcu.COLUMN_NAME = c.COLUMN_NAME \
                 ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
            )
            .await
            .map_err(|err| ConnectorError::Schema(err.to_string()))?
            .into_first_result()
            .await
            .map_err(|err| ConnectorError::Schema(err.to_string()))?;

        let mut tables: Vec<TableInfo> = Vec::new();
        for row in rows {
            let schema: String = row.get::<&str, _>(0).unwrap_or_default().to_string();
            let table: String = row.get::<&str, _>(1).unwrap_or_default().to_string();
            let column = ColumnInfo {
                name: row.get::<&str, _>(2).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(3).unwrap_or_default().to_string(),
                nullable: row.get::<&str, _>(4) == Some("YES"),
                primary_key: row.get::<i32, _>(5) == Some(1),
            };

            match tables.last_mut() {
                Some(last) if last.name == table && last.schema == schema => {
                    last.columns.push(column)
                }
                _ => tables.push(TableInfo {
                    name: table,
                    schema,
                    columns: vec![column],
                }),
            }
        }
        Ok(tables)
    }

    async fn close(&self) {
        // Dropping the client closes the TCP stream.
    }
}

fn json_to_tds_param(value: &Value) -> Box<dyn ToSql> {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(*b),
        Value::Number(n) if n.is_i64() => Box::new(n.as_i64()),
        Value::Number(n) => Box::new(n.as_f64()),
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

fn cell_to_json(cell: &ColumnData<'static>) -> Value {
    match cell {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(|n| Value::from(n as i64)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(|n| Value::from(n as i64)).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(|n| Value::from(n as i64)).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(|n| Value::from(n as f64)).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::from(f64::from(n)))
            .unwrap_or(Value::Null),
        ColumnData::Date(_) => from_sql_string::<NaiveDate>(cell),
        ColumnData::Time(_) => from_sql_string::<NaiveTime>(cell),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            from_sql_string::<NaiveDateTime>(cell)
        }
        ColumnData::DateTimeOffset(_) => match DateTime::<Utc>::from_sql(cell) {
            Ok(Some(dt)) => Value::String(dt.to_rfc3339()),
            _ => Value::Null,
        },
        ColumnData::Binary(_) | ColumnData::Xml(_) => Value::Null,
    }
}

fn from_sql_string<'a, T: FromSql<'a> + ToString>(cell: &'a ColumnData<'static>) -> Value {
    match T::from_sql(cell) {
        Ok(Some(v)) => Value::String(v.to_string()),
        _ => Value::Null,
    }
}
