//! Peer-system query functions.
//!
//! One row per known system; the row carries both the System record and the
//! routing-cache metadata so the cache can be rebuilt after restart.

use rusqlite::Connection;
use uuid::Uuid;

use astral_types::{Coordinates, StarClass, System};

use crate::{DbError, Result};

/// A peer row: the System record plus cache metadata.
#[derive(Clone, Debug)]
pub struct PeerRow {
    pub system: System,
    pub learned_at: u64,
    pub learned_from: Uuid,
    pub verified: bool,
    pub last_verified: Option<u64>,
    pub last_gossip_heard: u64,
    pub fail_count: u32,
}

/// Insert or replace a peer row.
pub fn upsert(conn: &Connection, row: &PeerRow) -> Result<()> {
    let s = &row.system;
    conn.execute(
        "INSERT OR REPLACE INTO peer_systems (
            id, name, x, y, z, star_class, binary_star, trinary_star,
            peer_address, sponsor_id, public_key, info_version,
            created_at, last_seen_at, learned_at, learned_from,
            verified, last_verified, last_gossip_heard, fail_count
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                   ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        rusqlite::params![
            s.id.to_string(),
            s.name,
            s.coords.x,
            s.coords.y,
            s.coords.z,
            s.star_class.as_str(),
            s.binary_star,
            s.trinary_star,
            s.peer_address,
            s.sponsor_id.map(|id| id.to_string()),
            s.public_key.as_slice(),
            s.info_version as i64,
            s.created_at as i64,
            s.last_seen_at as i64,
            row.learned_at as i64,
            row.learned_from.to_string(),
            row.verified,
            row.last_verified.map(|t| t as i64),
            row.last_gossip_heard as i64,
            row.fail_count,
        ],
    )?;
    Ok(())
}

/// Refresh a peer's last-seen timestamp.
pub fn touch(conn: &Connection, id: &Uuid, last_seen_at: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE peer_systems SET last_seen_at = ?2 WHERE id = ?1",
        rusqlite::params![id.to_string(), last_seen_at as i64],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("peer system {id}")));
    }
    Ok(())
}

/// Get a single peer row by id.
pub fn get(conn: &Connection, id: &Uuid) -> Result<PeerRow> {
    let raw = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id.to_string()],
            read_raw,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("peer system {id}")),
            other => DbError::Sqlite(other),
        })?;
    decode_raw(raw)
}

/// Load every peer row, for cache warm-up at startup.
pub fn all(conn: &Connection) -> Result<Vec<PeerRow>> {
    let mut stmt = conn.prepare(SELECT_COLUMNS)?;
    let raws = stmt
        .query_map([], read_raw)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raws.into_iter().map(decode_raw).collect()
}

/// Delete a peer row. Deleting an absent row is a no-op.
pub fn delete(conn: &Connection, id: &Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM peer_systems WHERE id = ?1",
        [id.to_string()],
    )?;
    Ok(())
}

const SELECT_COLUMNS: &str = "SELECT id, name, x, y, z, star_class, binary_star, trinary_star,
        peer_address, sponsor_id, public_key, info_version, created_at, last_seen_at,
        learned_at, learned_from, verified, last_verified, last_gossip_heard, fail_count
     FROM peer_systems";

/// Column values before id/class parsing.
struct RawRow {
    id: String,
    name: String,
    x: f64,
    y: f64,
    z: f64,
    star_class: String,
    binary_star: bool,
    trinary_star: bool,
    peer_address: String,
    sponsor_id: Option<String>,
    public_key: Vec<u8>,
    info_version: i64,
    created_at: i64,
    last_seen_at: i64,
    learned_at: i64,
    learned_from: String,
    verified: bool,
    last_verified: Option<i64>,
    last_gossip_heard: i64,
    fail_count: u32,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        name: row.get(1)?,
        x: row.get(2)?,
        y: row.get(3)?,
        z: row.get(4)?,
        star_class: row.get(5)?,
        binary_star: row.get(6)?,
        trinary_star: row.get(7)?,
        peer_address: row.get(8)?,
        sponsor_id: row.get(9)?,
        public_key: row.get(10)?,
        info_version: row.get(11)?,
        created_at: row.get(12)?,
        last_seen_at: row.get(13)?,
        learned_at: row.get(14)?,
        learned_from: row.get(15)?,
        verified: row.get(16)?,
        last_verified: row.get(17)?,
        last_gossip_heard: row.get(18)?,
        fail_count: row.get(19)?,
    })
}

fn decode_raw(raw: RawRow) -> Result<PeerRow> {
    let id = parse_uuid(&raw.id)?;
    let sponsor_id = raw.sponsor_id.as_deref().map(parse_uuid).transpose()?;
    let learned_from = parse_uuid(&raw.learned_from)?;
    let star_class: StarClass = raw
        .star_class
        .parse()
        .map_err(|e: String| DbError::CorruptRow(e))?;
    let public_key: [u8; 32] = raw
        .public_key
        .try_into()
        .map_err(|_| DbError::CorruptRow(format!("public key length for {id}")))?;

    Ok(PeerRow {
        system: System {
            id,
            name: raw.name,
            coords: Coordinates::new(raw.x, raw.y, raw.z),
            star_class,
            binary_star: raw.binary_star,
            trinary_star: raw.trinary_star,
            peer_address: raw.peer_address,
            sponsor_id,
            public_key,
            info_version: raw.info_version as u64,
            created_at: raw.created_at as u64,
            last_seen_at: raw.last_seen_at as u64,
        },
        learned_at: raw.learned_at as u64,
        learned_from,
        verified: raw.verified,
        last_verified: raw.last_verified.map(|t| t as u64),
        last_gossip_heard: raw.last_gossip_heard as u64,
        fail_count: raw.fail_count,
    })
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| DbError::CorruptRow(format!("uuid: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn sample_row(id: Uuid) -> PeerRow {
        PeerRow {
            system: System {
                id,
                name: "Altair Gate".to_string(),
                coords: Coordinates::new(10.0, -20.0, 30.0),
                star_class: StarClass::K,
                binary_star: true,
                trinary_star: false,
                peer_address: "203.0.113.9:4817".to_string(),
                sponsor_id: Some(Uuid::new_v4()),
                public_key: [9u8; 32],
                info_version: 4,
                created_at: 1_700_000_000,
                last_seen_at: 1_700_000_500,
            },
            learned_at: 1_700_000_400,
            learned_from: Uuid::new_v4(),
            verified: true,
            last_verified: Some(1_700_000_500),
            last_gossip_heard: 1_700_000_450,
            fail_count: 1,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = test_db();
        let id = Uuid::new_v4();
        let row = sample_row(id);
        upsert(&conn, &row).expect("upsert");

        let loaded = get(&conn, &id).expect("get");
        assert_eq!(loaded.system.name, "Altair Gate");
        assert_eq!(loaded.system.star_class, StarClass::K);
        assert_eq!(loaded.system.public_key, [9u8; 32]);
        assert_eq!(loaded.last_verified, Some(1_700_000_500));
        assert_eq!(loaded.fail_count, 1);
    }

    #[test]
    fn test_upsert_replaces() {
        let conn = test_db();
        let id = Uuid::new_v4();
        let mut row = sample_row(id);
        upsert(&conn, &row).expect("first upsert");

        row.system.info_version = 9;
        row.fail_count = 0;
        upsert(&conn, &row).expect("second upsert");

        let loaded = get(&conn, &id).expect("get");
        assert_eq!(loaded.system.info_version, 9);
        assert_eq!(loaded.fail_count, 0);
        assert_eq!(all(&conn).expect("all").len(), 1);
    }

    #[test]
    fn test_touch() {
        let conn = test_db();
        let id = Uuid::new_v4();
        upsert(&conn, &sample_row(id)).expect("upsert");

        touch(&conn, &id, 1_700_001_000).expect("touch");
        let loaded = get(&conn, &id).expect("get");
        assert_eq!(loaded.system.last_seen_at, 1_700_001_000);

        let missing = touch(&conn, &Uuid::new_v4(), 1);
        assert!(matches!(missing, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let conn = test_db();
        let id = Uuid::new_v4();
        upsert(&conn, &sample_row(id)).expect("upsert");
        delete(&conn, &id).expect("delete");
        assert!(matches!(get(&conn, &id), Err(DbError::NotFound(_))));
        // Deleting again is a no-op.
        delete(&conn, &id).expect("re-delete");
    }

    #[test]
    fn test_all_roundtrip() {
        let conn = test_db();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        upsert(&conn, &sample_row(a)).expect("upsert a");
        let mut unverified = sample_row(b);
        unverified.verified = false;
        unverified.last_verified = None;
        upsert(&conn, &unverified).expect("upsert b");

        let rows = all(&conn).expect("all");
        assert_eq!(rows.len(), 2);
        let loaded_b = rows
            .iter()
            .find(|r| r.system.id == b)
            .expect("row b present");
        assert!(!loaded_b.verified);
        assert_eq!(loaded_b.last_verified, None);
    }
}
