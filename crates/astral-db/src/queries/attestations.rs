//! Attestation log queries.

use rusqlite::Connection;
use uuid::Uuid;

use astral_types::Attestation;

use crate::{DbError, Result};

/// Append a received attestation to the log.
pub fn insert(
    conn: &Connection,
    attestation: &Attestation,
    receiver: &Uuid,
    received_at: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO attestations (
            from_system_id, to_system_id, receiver_id, timestamp,
            message_type, signature, public_key, received_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            attestation.from_system_id.to_string(),
            attestation.to_system_id.to_string(),
            receiver.to_string(),
            attestation.timestamp as i64,
            attestation.message_type,
            attestation.signature.as_slice(),
            attestation.public_key.as_slice(),
            received_at as i64,
        ],
    )?;
    Ok(())
}

/// All attestations received from a given sender, newest first.
pub fn for_sender(conn: &Connection, from: &Uuid) -> Result<Vec<Attestation>> {
    let mut stmt = conn.prepare(
        "SELECT from_system_id, to_system_id, timestamp, message_type, signature, public_key
         FROM attestations WHERE from_system_id = ?1 ORDER BY received_at DESC",
    )?;

    let raws = stmt
        .query_map([from.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raws.into_iter()
        .map(|(from, to, timestamp, message_type, signature, public_key)| {
            Ok(Attestation {
                from_system_id: parse_uuid(&from)?,
                to_system_id: parse_uuid(&to)?,
                timestamp: timestamp as u64,
                message_type,
                signature: signature
                    .try_into()
                    .map_err(|_| DbError::CorruptRow("signature length".into()))?,
                public_key: public_key
                    .try_into()
                    .map_err(|_| DbError::CorruptRow("public key length".into()))?,
            })
        })
        .collect()
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| DbError::CorruptRow(format!("uuid: {e}")))
}
