//! Peer-connection edge queries.
//!
//! Find-node responses reveal which peers a responder knows; those
//! `(responder -> returned id)` edges feed topology views and sponsor
//! discovery.

use rusqlite::Connection;
use uuid::Uuid;

use crate::{DbError, Result};

/// An observed edge: `from` reported knowing `peer` at `observed_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEdge {
    pub from: Uuid,
    pub peer: Uuid,
    pub observed_at: u64,
}

/// Record the peers a responder returned. Existing edges are refreshed.
pub fn record(conn: &Connection, from: &Uuid, peers: &[Uuid], observed_at: u64) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO peer_connections (from_id, peer_id, observed_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(from_id, peer_id) DO UPDATE SET observed_at = excluded.observed_at",
    )?;
    for peer in peers {
        stmt.execute(rusqlite::params![
            from.to_string(),
            peer.to_string(),
            observed_at as i64,
        ])?;
    }
    Ok(())
}

/// All edges observed within `max_age_secs` of `now`.
pub fn all_recent(conn: &Connection, max_age_secs: u64, now: u64) -> Result<Vec<ConnectionEdge>> {
    let cutoff = now.saturating_sub(max_age_secs);
    let mut stmt = conn.prepare(
        "SELECT from_id, peer_id, observed_at FROM peer_connections
         WHERE observed_at >= ?1 ORDER BY observed_at DESC",
    )?;
    let raws = stmt
        .query_map([cutoff as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raws.into_iter()
        .map(|(from, peer, observed_at)| {
            Ok(ConnectionEdge {
                from: parse_uuid(&from)?,
                peer: parse_uuid(&peer)?,
                observed_at: observed_at as u64,
            })
        })
        .collect()
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| DbError::CorruptRow(format!("uuid: {e}")))
}
