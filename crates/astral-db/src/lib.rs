//! # astral-db
//!
//! SQLite persistence for the Astral daemon's peer state: known systems with
//! their routing-cache metadata, the attestation log, observed peer-connection
//! edges, and first-write-wins identity bindings.
//!
//! One daemon process owns the database exclusively, so the access pattern is
//! a single writer with concurrent readers (request handlers and maintenance
//! loops racing over one connection behind the daemon's lock). The pragmas
//! reflect that: WAL keeps readers off the writer's back, NORMAL synchronous
//! is durable enough under WAL for state that is re-learnable from the
//! network, and a busy timeout absorbs the occasional overlap. The schema has
//! no cross-table references; each table is keyed by system id on its own.
//!
//! All timestamps are Unix epoch seconds. System ids are stored as hyphenated
//! UUID text, keys and signatures as raw blobs. The schema version lives in
//! `PRAGMA user_version`.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the database inside the daemon's data directory.
pub const DB_FILE: &str = "astral.db";

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema version: {0}")]
    Schema(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open (or create) the peer-state database inside `data_dir`.
pub fn open_in(data_dir: &Path) -> Result<Connection> {
    prepare(Connection::open(data_dir.join(DB_FILE))?)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

/// Apply the connection pragmas and bring the schema up to date.
fn prepare(conn: Connection) -> Result<Connection> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    migrations::run(&conn)?;
    Ok(conn)
}
