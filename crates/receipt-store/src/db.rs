use rusqlite::Connection;

use crate::error::StoreError;

/// Schema init for `transactions`, `receipt_processing_tasks`,
/// `hidden_bot_chats`, `parsing_logs`. Follows `models.py`'s column
/// sets, minus the legacy `checks` / `operator_mappings` / `hourly_reports`
/// / `automation_*` tables — the single `transactions` schema is
/// authoritative here, the dual-schema migration is not reproduced.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    create_transactions_table(conn)?;
    create_processing_tasks_table(conn)?;
    create_hidden_chats_table(conn)?;
    create_parsing_logs_table(conn)?;
    Ok(())
}

fn create_transactions_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS transactions (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid                TEXT NOT NULL UNIQUE,
            raw_text            TEXT NOT NULL,
            source_type         TEXT NOT NULL CHECK (source_type IN ('AUTO', 'MANUAL')),
            chat_id             INTEGER,
            message_id          INTEGER,
            transaction_date    TEXT NOT NULL,
            amount              TEXT NOT NULL,
            currency            TEXT NOT NULL DEFAULT 'UZS',
            card_last_4         TEXT,
            operator_raw        TEXT,
            application_mapped  TEXT,
            transaction_type    TEXT NOT NULL CHECK (transaction_type IN ('DEBIT','CREDIT','CONVERSION','REVERSAL')),
            balance_after       TEXT,
            receiver_name       TEXT,
            receiver_card       TEXT,
            parsing_method      TEXT CHECK (parsing_method IN ('REGEX_HUMO','REGEX_SMS','REGEX_SEMICOLON','REGEX_CARDXABAR','GPT','GPT_VISION')),
            parsing_confidence  REAL CHECK (parsing_confidence IS NULL OR (parsing_confidence >= 0 AND parsing_confidence <= 1)),
            is_gpt_parsed       INTEGER NOT NULL DEFAULT 0,
            is_p2p              INTEGER NOT NULL DEFAULT 0,
            fingerprint         TEXT NOT NULL UNIQUE,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(chat_id, message_id)
         );
         CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date);
         CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);
         CREATE INDEX IF NOT EXISTS idx_transactions_card ON transactions(card_last_4);
         CREATE INDEX IF NOT EXISTS idx_transactions_app ON transactions(application_mapped);
         CREATE INDEX IF NOT EXISTS idx_transactions_operator ON transactions(operator_raw);
         CREATE INDEX IF NOT EXISTS idx_transactions_parsing ON transactions(parsing_method, parsing_confidence);
         CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions(source_type, chat_id);",
    )?;
    Ok(())
}

fn create_processing_tasks_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS receipt_processing_tasks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id         TEXT NOT NULL UNIQUE,
            chat_id         INTEGER NOT NULL,
            message_id      INTEGER NOT NULL,
            status          TEXT NOT NULL CHECK (status IN ('queued','processing','done','failed')),
            transaction_id  INTEGER,
            error           TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(chat_id, message_id)
         );
         CREATE INDEX IF NOT EXISTS idx_receipt_tasks_status ON receipt_processing_tasks(status);",
    )?;
    Ok(())
}

fn create_hidden_chats_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS hidden_bot_chats (
            chat_id INTEGER PRIMARY KEY
         );",
    )?;
    Ok(())
}

fn create_parsing_logs_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS parsing_logs (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            raw_message         TEXT NOT NULL,
            parsing_method      TEXT,
            success             INTEGER NOT NULL,
            error_message       TEXT,
            processing_time_ms  INTEGER,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE INDEX IF NOT EXISTS idx_parsing_logs_created ON parsing_logs(created_at);",
    )?;
    Ok(())
}
