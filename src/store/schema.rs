//! Versioned SQLite schema for the metadata database.
//!
//! Each entry is a batch of DDL bringing the database from the previous
//! version to its own. `PRAGMA user_version` records the applied version,
//! offset by a sentinel base so a dataweaver database is distinguishable
//! from an empty or foreign SQLite file.

pub struct VersionedSchema {
    pub version: usize,
    pub up: &'static str,
}

pub const BASE_DB_VERSION: usize = 77000;

pub const META_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    up: "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE data_sources (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        kind TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        database TEXT NOT NULL,
        username TEXT NOT NULL,
        password TEXT NOT NULL,
        ssl_mode TEXT NOT NULL DEFAULT 'disable',
        status TEXT NOT NULL DEFAULT 'active',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_data_sources_user ON data_sources(user_id);

    CREATE TABLE queries (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        datasource_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        sql_template TEXT NOT NULL,
        parameters TEXT NOT NULL DEFAULT '[]',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_queries_user ON queries(user_id);

    CREATE TABLE tools (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        query_id TEXT NOT NULL,
        name TEXT NOT NULL,
        display_name TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        input_schema TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_tools_user ON tools(user_id);

    CREATE TABLE mcp_servers (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        version TEXT NOT NULL DEFAULT '1.0.0',
        tool_ids TEXT NOT NULL DEFAULT '[]',
        config TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'draft',
        endpoint TEXT NOT NULL DEFAULT '',
        api_key TEXT NOT NULL DEFAULT '',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_mcp_servers_user ON mcp_servers(user_id);
    CREATE UNIQUE INDEX idx_mcp_servers_api_key
        ON mcp_servers(api_key) WHERE status = 'published';

    CREATE TABLE mcp_logs (
        id TEXT PRIMARY KEY,
        mcp_server_id TEXT NOT NULL,
        tool_id TEXT NOT NULL DEFAULT '',
        tool_name TEXT NOT NULL DEFAULT '',
        parameters TEXT NOT NULL DEFAULT '{}',
        response_time_ms INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        error_message TEXT,
        row_count INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX idx_mcp_logs_server_ts ON mcp_logs(mcp_server_id, timestamp);
    ",
}];
