use std::sync::Mutex;

use receipt_chat::ChatSession;
use receipt_core::types::{ChatId, FilterMode, MessageId};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::CaptureError;

/// Row of `monitored_chats`. Field set per §3's MonitoredChat entity.
#[derive(Debug, Clone)]
pub struct MonitoredChat {
    pub chat_id: ChatId,
    pub enabled: bool,
    pub last_processed_message_id: i64,
    pub chat_type: String,
    pub filter_mode: FilterMode,
    pub filter_keywords: Option<String>,
    pub chat_title: Option<String>,
    pub last_error: Option<String>,
}

/// Durable CRUD over `MonitoredChat`, shared read-mostly by producers and
/// written only by workers (cursor/error) or admin (enable/filter), per
/// §3's ownership note.
pub struct MonitorRegistry {
    conn: Mutex<Connection>,
}

impl MonitorRegistry {
    pub fn new(conn: Connection) -> Result<Self, CaptureError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or update monitor state for a chat. When `enabled &&
    /// start_from_latest`, the newest message id is fetched and seeded as
    /// `last_processed_message_id` so catch-up does not replay history.
    pub async fn upsert(
        &self,
        session: &ChatSession,
        chat_id: ChatId,
        enabled: bool,
        filter_mode: FilterMode,
        filter_keywords: Option<String>,
        start_from_latest: bool,
    ) -> Result<MonitoredChat, CaptureError> {
        let seed_id = if enabled && start_from_latest {
            session
                .get_messages(chat_id, None, 1, false)
                .await
                .map_err(|e| CaptureError::Chat(e.to_string()))?
                .first()
                .map(|m| m.id.0)
                .unwrap_or(0)
        } else {
            0
        };

        let conn = self.conn.lock().expect("monitor registry mutex poisoned");
        conn.execute(
            "INSERT INTO monitored_chats
                (chat_id, enabled, last_processed_message_id, filter_mode, filter_keywords)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chat_id) DO UPDATE SET
                enabled = excluded.enabled,
                filter_mode = excluded.filter_mode,
                filter_keywords = excluded.filter_keywords,
                last_processed_message_id = MAX(monitored_chats.last_processed_message_id, excluded.last_processed_message_id)",
            params![
                chat_id.0,
                enabled,
                seed_id,
                filter_mode.to_string(),
                filter_keywords,
            ],
        )?;

        self.get_locked(&conn, chat_id)?
            .ok_or_else(|| CaptureError::NotFound(chat_id.to_string()))
    }

    /// `last_processed_message_id = max(current, message_id)` only; callers
    /// decide whether to call this at all based on permanent/transient
    /// classification (§4.5's error policy). `last_error` is always
    /// set, regardless of whether the cursor moves.
    pub fn advance_cursor(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        error: Option<&str>,
        advance: bool,
    ) -> Result<(), CaptureError> {
        let conn = self.conn.lock().expect("monitor registry mutex poisoned");
        if advance {
            conn.execute(
                "UPDATE monitored_chats
                 SET last_processed_message_id = MAX(last_processed_message_id, ?2),
                     last_error = ?3
                 WHERE chat_id = ?1",
                params![chat_id.0, message_id.0, error],
            )?;
        } else {
            conn.execute(
                "UPDATE monitored_chats SET last_error = ?2 WHERE chat_id = ?1",
                params![chat_id.0, error],
            )?;
        }
        Ok(())
    }

    pub fn get(&self, chat_id: ChatId) -> Result<Option<MonitoredChat>, CaptureError> {
        let conn = self.conn.lock().expect("monitor registry mutex poisoned");
        self.get_locked(&conn, chat_id)
    }

    fn get_locked(
        &self,
        conn: &Connection,
        chat_id: ChatId,
    ) -> Result<Option<MonitoredChat>, CaptureError> {
        conn.query_row(
            "SELECT chat_id, enabled, last_processed_message_id, chat_type,
                    filter_mode, filter_keywords, chat_title, last_error
             FROM monitored_chats WHERE chat_id = ?1",
            params![chat_id.0],
            row_to_monitor,
        )
        .optional()
        .map_err(CaptureError::from)
    }

    pub fn list_enabled(&self) -> Result<Vec<MonitoredChat>, CaptureError> {
        let conn = self.conn.lock().expect("monitor registry mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT chat_id, enabled, last_processed_message_id, chat_type,
                    filter_mode, filter_keywords, chat_title, last_error
             FROM monitored_chats WHERE enabled = 1",
        )?;
        let rows = stmt
            .query_map([], row_to_monitor)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all(&self) -> Result<Vec<MonitoredChat>, CaptureError> {
        let conn = self.conn.lock().expect("monitor registry mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT chat_id, enabled, last_processed_message_id, chat_type,
                    filter_mode, filter_keywords, chat_title, last_error
             FROM monitored_chats",
        )?;
        let rows = stmt
            .query_map([], row_to_monitor)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_monitor(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitoredChat> {
    let filter_mode_raw: String = row.get(4)?;
    Ok(MonitoredChat {
        chat_id: ChatId(row.get(0)?),
        enabled: row.get(1)?,
        last_processed_message_id: row.get(2)?,
        chat_type: row.get(3)?,
        filter_mode: filter_mode_raw.parse().unwrap_or(FilterMode::All),
        filter_keywords: row.get(5)?,
        chat_title: row.get(6)?,
        last_error: row.get(7)?,
    })
}

fn init_schema(conn: &Connection) -> Result<(), CaptureError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS monitored_chats (
            chat_id                   INTEGER PRIMARY KEY,
            enabled                   INTEGER NOT NULL DEFAULT 1,
            last_processed_message_id INTEGER NOT NULL DEFAULT 0,
            chat_type                 TEXT NOT NULL DEFAULT 'private',
            filter_mode               TEXT NOT NULL DEFAULT 'all',
            filter_keywords           TEXT,
            chat_title                TEXT,
            last_error                TEXT,
            created_at                TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at                TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE INDEX IF NOT EXISTS idx_monitored_chats_enabled ON monitored_chats(enabled);",
    )?;
    info!("monitor registry schema ready");
    Ok(())
}
