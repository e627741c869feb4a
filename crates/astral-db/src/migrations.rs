//! Schema versioning.
//!
//! The version gate is forward-only and currently trivial: v1 is the first
//! and only schema, so `run` either initializes a fresh database or verifies
//! the stored version matches. Peer state is re-learnable from the network,
//! so an unknown version is a hard stop rather than a best-effort upgrade;
//! wiping the data directory and re-bootstrapping is always safe.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Initialize a fresh database or verify the stored schema version.
pub fn run(conn: &Connection) -> Result<()> {
    let stored: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(DbError::Sqlite)?;

    match stored {
        0 => {
            tracing::info!("Initializing peer-state schema v{SCHEMA_VERSION}");
            conn.execute_batch(schema::SCHEMA_V1)
                .map_err(DbError::Sqlite)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(DbError::Sqlite)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        older if older < SCHEMA_VERSION => Err(DbError::Schema(format!(
            "no upgrade path from v{older}; delete the database and re-bootstrap"
        ))),
        newer => Err(DbError::Schema(format!(
            "database is v{newer}, newer than this build's v{SCHEMA_VERSION}"
        ))),
    }
}
