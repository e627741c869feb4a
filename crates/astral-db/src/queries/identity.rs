//! Identity binding queries.
//!
//! The first (system id, public key) pair observed wins; any later claim of
//! the same id with a different key is a spoof.

use rusqlite::Connection;
use uuid::Uuid;

use crate::Result;

/// Outcome of checking an identity claim against the binding table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingCheck {
    /// The claimed key is acceptable (either newly bound or matching).
    pub ok: bool,
    /// This check created the binding.
    pub is_new: bool,
}

/// Validate `(system_id, public_key)` against the stored binding,
/// creating it first-write-wins when absent.
pub fn validate_binding(
    conn: &Connection,
    system_id: &Uuid,
    public_key: &[u8; 32],
    now: u64,
) -> Result<BindingCheck> {
    let existing: Option<Vec<u8>> = conn
        .query_row(
            "SELECT public_key FROM identity_bindings WHERE system_id = ?1",
            [system_id.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match existing {
        Some(bound) => Ok(BindingCheck {
            ok: bound == public_key.as_slice(),
            is_new: false,
        }),
        None => {
            conn.execute(
                "INSERT INTO identity_bindings (system_id, public_key, bound_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![system_id.to_string(), public_key.as_slice(), now as i64],
            )?;
            Ok(BindingCheck {
                ok: true,
                is_new: true,
            })
        }
    }
}

/// Remove a binding (used when an address reassignment deletes a peer).
pub fn remove_binding(conn: &Connection, system_id: &Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM identity_bindings WHERE system_id = ?1",
        [system_id.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_first_write_binds() {
        let conn = test_db();
        let id = Uuid::new_v4();
        let check = validate_binding(&conn, &id, &[1u8; 32], 100).expect("validate");
        assert!(check.ok);
        assert!(check.is_new);
    }

    #[test]
    fn test_matching_key_accepted() {
        let conn = test_db();
        let id = Uuid::new_v4();
        validate_binding(&conn, &id, &[1u8; 32], 100).expect("bind");
        let check = validate_binding(&conn, &id, &[1u8; 32], 200).expect("re-validate");
        assert!(check.ok);
        assert!(!check.is_new);
    }

    #[test]
    fn test_conflicting_key_rejected() {
        let conn = test_db();
        let id = Uuid::new_v4();
        validate_binding(&conn, &id, &[1u8; 32], 100).expect("bind");
        let check = validate_binding(&conn, &id, &[2u8; 32], 200).expect("validate spoof");
        assert!(!check.ok);
        assert!(!check.is_new);

        // The original binding is untouched.
        let again = validate_binding(&conn, &id, &[1u8; 32], 300).expect("original");
        assert!(again.ok);
    }

    #[test]
    fn test_remove_allows_rebinding() {
        let conn = test_db();
        let id = Uuid::new_v4();
        validate_binding(&conn, &id, &[1u8; 32], 100).expect("bind");
        remove_binding(&conn, &id).expect("remove");
        let check = validate_binding(&conn, &id, &[2u8; 32], 200).expect("rebind");
        assert!(check.ok);
        assert!(check.is_new);
    }
}
