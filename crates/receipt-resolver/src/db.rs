use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ResolverError;
use crate::types::OperatorReference;

/// `operator_reference` schema, following `models.py::OperatorReference`'s
/// field set.
pub fn init_schema(conn: &Connection) -> Result<(), ResolverError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS operator_reference (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_name    TEXT NOT NULL,
            application_name TEXT NOT NULL,
            is_p2p           INTEGER NOT NULL DEFAULT 0,
            is_active        INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(operator_name, application_name)
         );
         CREATE INDEX IF NOT EXISTS idx_operator_ref_active ON operator_reference(is_active);",
    )?;
    Ok(())
}

pub fn list_active(conn: &Connection) -> Result<Vec<OperatorReference>, ResolverError> {
    let mut stmt = conn.prepare(
        "SELECT id, operator_name, application_name, is_p2p, is_active
         FROM operator_reference WHERE is_active = 1",
    )?;
    let rows = stmt
        .query_map([], row_to_reference)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert an inactive suggestion row unless `(operator_name, application_name)`
/// already exists, per §4.6's side effect: a suggestion for human
/// review, never an automatic expansion of the active dictionary.
pub fn insert_suggestion(
    conn: &Connection,
    operator_name: &str,
    application_name: &str,
    is_p2p: bool,
) -> Result<bool, ResolverError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM operator_reference WHERE operator_name = ?1 AND application_name = ?2",
            params![operator_name, application_name],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO operator_reference (operator_name, application_name, is_p2p, is_active)
         VALUES (?1, ?2, ?3, 0)",
        params![operator_name, application_name, is_p2p],
    )?;
    Ok(true)
}

fn row_to_reference(row: &rusqlite::Row<'_>) -> rusqlite::Result<OperatorReference> {
    Ok(OperatorReference {
        id: row.get(0)?,
        operator_name: row.get(1)?,
        application_name: row.get(2)?,
        is_p2p: row.get(3)?,
        is_active: row.get(4)?,
    })
}
