//! rusqlite-backed implementation of the metadata store traits.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::models::{
    DataSource, EntityStatus, McpLog, McpLogStatus, McpServer, McpServerStatus, Query, QueryParam,
    ServerConfig, Tool, User,
};
use super::schema::{BASE_DB_VERSION, META_VERSIONED_SCHEMAS};
use super::{
    DatasourceStore, DayLogStats, McpServerStore, Page, QueryStore, StoreError, StoreResult,
    ToolLogStats, ToolStore, UserStore,
};
use crate::dbconnector::DataSourceKind;

pub struct SqliteMetaStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetaStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)?;
        Self::setup(conn, || format!("{:?}", path))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::setup(conn, || "<memory>".to_string())
    }

    fn setup(conn: Connection, describe: impl Fn() -> String) -> anyhow::Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if raw_version == 0 {
            info!("Creating new metadata database at {}", describe());
            Self::initialize_schema(&conn)?;
        } else {
            let db_version = raw_version - BASE_DB_VERSION as i64;
            if db_version < 1 {
                anyhow::bail!("metadata database version {} is invalid", db_version);
            }
            let current = META_VERSIONED_SCHEMAS.last().unwrap().version as i64;
            if db_version < current {
                info!(
                    "Migrating metadata database from version {} to {}",
                    db_version, current
                );
                Self::run_migrations(&conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> anyhow::Result<()> {
        for schema in META_VERSIONED_SCHEMAS {
            conn.execute_batch(schema.up)?;
        }
        let last = META_VERSIONED_SCHEMAS.last().unwrap().version;
        conn.execute(&format!("PRAGMA user_version = {}", BASE_DB_VERSION + last), [])?;
        Ok(())
    }

    fn run_migrations(conn: &Connection, from_version: usize) -> anyhow::Result<()> {
        for schema in META_VERSIONED_SCHEMAS {
            if schema.version > from_version {
                conn.execute_batch(schema.up)?;
                conn.execute(
                    &format!("PRAGMA user_version = {}", BASE_DB_VERSION + schema.version),
                    [],
                )?;
            }
        }
        Ok(())
    }
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn parse_with<T, E: std::error::Error + Send + Sync + 'static>(
    idx: usize,
    result: Result<T, E>,
) -> rusqlite::Result<T> {
    result.map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: parse_timestamp(5, row.get("created_at")?)?,
        updated_at: parse_timestamp(6, row.get("updated_at")?)?,
    })
}

fn row_to_datasource(row: &rusqlite::Row) -> rusqlite::Result<DataSource> {
    Ok(DataSource {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        kind: parse_with(4, DataSourceKind::from_str(&row.get::<_, String>("kind")?))?,
        host: row.get("host")?,
        port: row.get::<_, i64>("port")? as u16,
        database: row.get("database")?,
        username: row.get("username")?,
        password: row.get("password")?,
        ssl_mode: row.get("ssl_mode")?,
        status: parse_with(
            11,
            EntityStatus::from_str(&row.get::<_, String>("status")?)
                .map_err(|e| std::io::Error::other(e.to_string())),
        )?,
        created_at: parse_timestamp(12, row.get("created_at")?)?,
        updated_at: parse_timestamp(13, row.get("updated_at")?)?,
    })
}

fn row_to_query(row: &rusqlite::Row) -> rusqlite::Result<Query> {
    let parameters: Vec<QueryParam> =
        parse_with(6, serde_json::from_str(&row.get::<_, String>("parameters")?))?;
    Ok(Query {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        datasource_id: row.get("datasource_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        sql_template: row.get("sql_template")?,
        parameters,
        created_at: parse_timestamp(7, row.get("created_at")?)?,
        updated_at: parse_timestamp(8, row.get("updated_at")?)?,
    })
}

fn row_to_tool(row: &rusqlite::Row) -> rusqlite::Result<Tool> {
    let input_schema = match row.get::<_, Option<String>>("input_schema")? {
        Some(raw) => Some(parse_with(6, serde_json::from_str(&raw))?),
        None => None,
    };
    Ok(Tool {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        query_id: row.get("query_id")?,
        name: row.get("name")?,
        display_name: row.get("display_name")?,
        description: row.get("description")?,
        input_schema,
        status: parse_with(
            7,
            EntityStatus::from_str(&row.get::<_, String>("status")?)
                .map_err(|e| std::io::Error::other(e.to_string())),
        )?,
        created_at: parse_timestamp(8, row.get("created_at")?)?,
        updated_at: parse_timestamp(9, row.get("updated_at")?)?,
    })
}

fn row_to_server(row: &rusqlite::Row) -> rusqlite::Result<McpServer> {
    let tool_ids: Vec<String> =
        parse_with(5, serde_json::from_str(&row.get::<_, String>("tool_ids")?))?;
    let config: ServerConfig =
        parse_with(6, serde_json::from_str(&row.get::<_, String>("config")?))?;
    Ok(McpServer {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        version: row.get("version")?,
        tool_ids,
        config,
        status: parse_with(
            7,
            McpServerStatus::from_str(&row.get::<_, String>("status")?)
                .map_err(|e| std::io::Error::other(e.to_string())),
        )?,
        endpoint: row.get("endpoint")?,
        api_key: row.get("api_key")?,
        created_at: parse_timestamp(11, row.get("created_at")?)?,
        updated_at: parse_timestamp(12, row.get("updated_at")?)?,
    })
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<McpLog> {
    let parameters = parse_with(4, serde_json::from_str(&row.get::<_, String>("parameters")?))?;
    Ok(McpLog {
        id: row.get("id")?,
        mcp_server_id: row.get("mcp_server_id")?,
        tool_id: row.get("tool_id")?,
        tool_name: row.get("tool_name")?,
        parameters,
        response_time_ms: row.get("response_time_ms")?,
        status: parse_with(
            6,
            McpLogStatus::from_str(&row.get::<_, String>("status")?)
                .map_err(|e| std::io::Error::other(e.to_string())),
        )?,
        error_message: row.get("error_message")?,
        row_count: row.get("row_count")?,
        timestamp: parse_timestamp(9, row.get("timestamp")?)?,
    })
}

fn like_pattern(keyword: &str) -> String {
    format!("%{}%", keyword.to_lowercase())
}

impl UserStore for SqliteMetaStore {
    fn create_user(&self, username: &str, email: &str, password_hash: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StoreError::Conflict("user"));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![username, email, password_hash, now],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(StoreError::from)
    }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .optional()
            .map_err(StoreError::from)
    }
}

impl DatasourceStore for SqliteMetaStore {
    fn create_datasource(&self, datasource: &DataSource) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO data_sources \
             (id, user_id, name, description, kind, host, port, database, username, password, \
              ssl_mode, status, deleted, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?14)",
            params![
                datasource.id,
                datasource.user_id,
                datasource.name,
                datasource.description,
                datasource.kind.as_str(),
                datasource.host,
                datasource.port,
                datasource.database,
                datasource.username,
                datasource.password,
                datasource.ssl_mode,
                datasource.status.as_str(),
                datasource.created_at.to_rfc3339(),
                datasource.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn datasource_by_id(&self, id: &str) -> StoreResult<Option<DataSource>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM data_sources WHERE id = ?1 AND deleted = 0",
            params![id],
            row_to_datasource,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn datasource_by_id_for_user(
        &self,
        id: &str,
        user_id: i64,
    ) -> StoreResult<Option<DataSource>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM data_sources WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
            params![id, user_id],
            row_to_datasource,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn list_datasources(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<DataSource>, i64)> {
        let conn = self.conn.lock().unwrap();
        match &page.keyword {
            Some(keyword) => {
                let pattern = like_pattern(keyword);
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM data_sources WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2)",
                    params![user_id, pattern],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM data_sources WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2) \
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_id, pattern, page.size, page.offset()],
                        row_to_datasource,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
            None => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM data_sources WHERE user_id = ?1 AND deleted = 0",
                    params![user_id],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM data_sources WHERE user_id = ?1 AND deleted = 0 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![user_id, page.size, page.offset()], row_to_datasource)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
        }
    }

    fn update_datasource(&self, datasource: &DataSource) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE data_sources SET name = ?1, description = ?2, kind = ?3, host = ?4, \
             port = ?5, database = ?6, username = ?7, password = ?8, ssl_mode = ?9, \
             status = ?10, updated_at = ?11 \
             WHERE id = ?12 AND user_id = ?13 AND deleted = 0",
            params![
                datasource.name,
                datasource.description,
                datasource.kind.as_str(),
                datasource.host,
                datasource.port,
                datasource.database,
                datasource.username,
                datasource.password,
                datasource.ssl_mode,
                datasource.status.as_str(),
                Utc::now().to_rfc3339(),
                datasource.id,
                datasource.user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_datasource(&self, id: &str, user_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE data_sources SET deleted = 1, updated_at = ?1 \
             WHERE id = ?2 AND user_id = ?3 AND deleted = 0",
            params![Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(changed > 0)
    }
}

impl QueryStore for SqliteMetaStore {
    fn create_query(&self, query: &Query) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO queries \
             (id, user_id, datasource_id, name, description, sql_template, parameters, deleted, \
              created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
            params![
                query.id,
                query.user_id,
                query.datasource_id,
                query.name,
                query.description,
                query.sql_template,
                serde_json::to_string(&query.parameters)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                query.created_at.to_rfc3339(),
                query.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn query_by_id(&self, id: &str) -> StoreResult<Option<Query>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM queries WHERE id = ?1 AND deleted = 0",
            params![id],
            row_to_query,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn query_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<Query>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM queries WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
            params![id, user_id],
            row_to_query,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn list_queries(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<Query>, i64)> {
        let conn = self.conn.lock().unwrap();
        match &page.keyword {
            Some(keyword) => {
                let pattern = like_pattern(keyword);
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM queries WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2)",
                    params![user_id, pattern],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM queries WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2) \
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_id, pattern, page.size, page.offset()],
                        row_to_query,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
            None => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM queries WHERE user_id = ?1 AND deleted = 0",
                    params![user_id],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM queries WHERE user_id = ?1 AND deleted = 0 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![user_id, page.size, page.offset()], row_to_query)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
        }
    }

    fn update_query(&self, query: &Query) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE queries SET datasource_id = ?1, name = ?2, description = ?3, \
             sql_template = ?4, parameters = ?5, updated_at = ?6 \
             WHERE id = ?7 AND user_id = ?8 AND deleted = 0",
            params![
                query.datasource_id,
                query.name,
                query.description,
                query.sql_template,
                serde_json::to_string(&query.parameters)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                Utc::now().to_rfc3339(),
                query.id,
                query.user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_query(&self, id: &str, user_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE queries SET deleted = 1, updated_at = ?1 \
             WHERE id = ?2 AND user_id = ?3 AND deleted = 0",
            params![Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(changed > 0)
    }
}

impl ToolStore for SqliteMetaStore {
    fn create_tool(&self, tool: &Tool) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tools WHERE user_id = ?1 AND name = ?2 AND deleted = 0",
            params![tool.user_id, tool.name],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StoreError::Conflict("tool name"));
        }

        let input_schema = tool
            .input_schema
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        conn.execute(
            "INSERT INTO tools \
             (id, user_id, query_id, name, display_name, description, input_schema, status, \
              deleted, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
            params![
                tool.id,
                tool.user_id,
                tool.query_id,
                tool.name,
                tool.display_name,
                tool.description,
                input_schema,
                tool.status.as_str(),
                tool.created_at.to_rfc3339(),
                tool.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn tool_by_id(&self, id: &str) -> StoreResult<Option<Tool>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM tools WHERE id = ?1 AND deleted = 0",
            params![id],
            row_to_tool,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn tool_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<Tool>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM tools WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
            params![id, user_id],
            row_to_tool,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn list_tools(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<Tool>, i64)> {
        let conn = self.conn.lock().unwrap();
        match &page.keyword {
            Some(keyword) => {
                let pattern = like_pattern(keyword);
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tools WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2)",
                    params![user_id, pattern],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM tools WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2) \
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_id, pattern, page.size, page.offset()],
                        row_to_tool,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
            None => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tools WHERE user_id = ?1 AND deleted = 0",
                    params![user_id],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM tools WHERE user_id = ?1 AND deleted = 0 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![user_id, page.size, page.offset()], row_to_tool)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
        }
    }

    fn update_tool(&self, tool: &Tool) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let clash: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tools \
             WHERE user_id = ?1 AND name = ?2 AND id != ?3 AND deleted = 0",
            params![tool.user_id, tool.name, tool.id],
            |row| row.get(0),
        )?;
        if clash > 0 {
            return Err(StoreError::Conflict("tool name"));
        }

        let input_schema = tool
            .input_schema
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let changed = conn.execute(
            "UPDATE tools SET query_id = ?1, name = ?2, display_name = ?3, description = ?4, \
             input_schema = ?5, status = ?6, updated_at = ?7 \
             WHERE id = ?8 AND user_id = ?9 AND deleted = 0",
            params![
                tool.query_id,
                tool.name,
                tool.display_name,
                tool.description,
                input_schema,
                tool.status.as_str(),
                Utc::now().to_rfc3339(),
                tool.id,
                tool.user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_tool(&self, id: &str, user_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tools SET deleted = 1, updated_at = ?1 \
             WHERE id = ?2 AND user_id = ?3 AND deleted = 0",
            params![Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(changed > 0)
    }
}

impl McpServerStore for SqliteMetaStore {
    fn create_server(&self, server: &McpServer) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mcp_servers WHERE user_id = ?1 AND name = ?2 AND deleted = 0",
            params![server.user_id, server.name],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StoreError::Conflict("mcp server name"));
        }

        conn.execute(
            "INSERT INTO mcp_servers \
             (id, user_id, name, description, version, tool_ids, config, status, endpoint, \
              api_key, deleted, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12)",
            params![
                server.id,
                server.user_id,
                server.name,
                server.description,
                server.version,
                serde_json::to_string(&server.tool_ids)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                serde_json::to_string(&server.config)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                server.status.as_str(),
                server.endpoint,
                server.api_key,
                server.created_at.to_rfc3339(),
                server.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn server_by_id(&self, id: &str) -> StoreResult<Option<McpServer>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM mcp_servers WHERE id = ?1 AND deleted = 0",
            params![id],
            row_to_server,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn server_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<McpServer>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM mcp_servers WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
            params![id, user_id],
            row_to_server,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn server_by_api_key(&self, api_key: &str) -> StoreResult<Option<McpServer>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM mcp_servers \
             WHERE api_key = ?1 AND status = 'published' AND deleted = 0",
            params![api_key],
            row_to_server,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn list_servers(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<McpServer>, i64)> {
        let conn = self.conn.lock().unwrap();
        match &page.keyword {
            Some(keyword) => {
                let pattern = like_pattern(keyword);
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM mcp_servers WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2)",
                    params![user_id, pattern],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM mcp_servers WHERE user_id = ?1 AND deleted = 0 \
                     AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2) \
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_id, pattern, page.size, page.offset()],
                        row_to_server,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
            None => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM mcp_servers WHERE user_id = ?1 AND deleted = 0",
                    params![user_id],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM mcp_servers WHERE user_id = ?1 AND deleted = 0 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![user_id, page.size, page.offset()], row_to_server)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total))
            }
        }
    }

    fn update_server(&self, server: &McpServer) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE mcp_servers SET name = ?1, description = ?2, version = ?3, tool_ids = ?4, \
             config = ?5, status = ?6, endpoint = ?7, api_key = ?8, updated_at = ?9 \
             WHERE id = ?10 AND user_id = ?11 AND deleted = 0",
            params![
                server.name,
                server.description,
                server.version,
                serde_json::to_string(&server.tool_ids)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                serde_json::to_string(&server.config)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                server.status.as_str(),
                server.endpoint,
                server.api_key,
                Utc::now().to_rfc3339(),
                server.id,
                server.user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_server(&self, id: &str, user_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE mcp_servers SET deleted = 1, updated_at = ?1 \
             WHERE id = ?2 AND user_id = ?3 AND deleted = 0",
            params![Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn create_log(&self, log: &McpLog) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mcp_logs \
             (id, mcp_server_id, tool_id, tool_name, parameters, response_time_ms, status, \
              error_message, row_count, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                log.id,
                log.mcp_server_id,
                log.tool_id,
                log.tool_name,
                serde_json::to_string(&log.parameters)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                log.response_time_ms,
                log.status.as_str(),
                log.error_message,
                log.row_count,
                log.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn logs_by_server(&self, server_id: &str, page: &Page) -> StoreResult<(Vec<McpLog>, i64)> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mcp_logs WHERE mcp_server_id = ?1",
            params![server_id],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT * FROM mcp_logs WHERE mcp_server_id = ?1 \
             ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![server_id, page.size, page.offset()], row_to_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    }

    fn count_logs(&self, server_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM mcp_logs WHERE mcp_server_id = ?1",
            params![server_id],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    fn count_logs_by_status(&self, server_id: &str, status: McpLogStatus) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM mcp_logs WHERE mcp_server_id = ?1 AND status = ?2",
            params![server_id, status.as_str()],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    fn avg_response_ms(&self, server_id: &str) -> StoreResult<f64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(AVG(response_time_ms), 0) FROM mcp_logs WHERE mcp_server_id = ?1",
            params![server_id],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    fn log_stats_by_tool(&self, server_id: &str) -> StoreResult<Vec<ToolLogStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tool_id, tool_name, COUNT(*) AS call_count, \
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS success_count, \
                    SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS error_count, \
                    COALESCE(AVG(response_time_ms), 0) AS avg_response_ms \
             FROM mcp_logs WHERE mcp_server_id = ?1 \
             GROUP BY tool_id, tool_name \
             ORDER BY call_count DESC",
        )?;
        let rows = stmt
            .query_map(params![server_id], |row| {
                Ok(ToolLogStats {
                    tool_id: row.get(0)?,
                    tool_name: row.get(1)?,
                    call_count: row.get(2)?,
                    success_count: row.get(3)?,
                    error_count: row.get(4)?,
                    avg_response_ms: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn log_stats_by_day(&self, server_id: &str, days: i64) -> StoreResult<Vec<DayLogStats>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT strftime('%Y-%m-%d', timestamp) AS date, COUNT(*) AS call_count, \
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS success_count, \
                    SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS error_count \
             FROM mcp_logs WHERE mcp_server_id = ?1 AND timestamp >= ?2 \
             GROUP BY strftime('%Y-%m-%d', timestamp) \
             ORDER BY date DESC",
        )?;
        let rows = stmt
            .query_map(params![server_id, cutoff], |row| {
                Ok(DayLogStats {
                    date: row.get(0)?,
                    call_count: row.get(1)?,
                    success_count: row.get(2)?,
                    error_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
