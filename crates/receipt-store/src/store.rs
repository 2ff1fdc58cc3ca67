use std::sync::Mutex;

use chrono::NaiveDateTime;
use receipt_core::types::{ChatId, MessageId, SourceType, TaskStatus, TransactionType};
use receipt_parsing::types::ParsingMethod;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::StoreError;
use crate::types::{
    HiddenChat, NewTransaction, ParsingLogEntry, ProcessingTask, Transaction,
};

/// Outcome of `insert_transaction`: the pipeline never issues a raw update
/// on conflict, so a unique-constraint violation resolves by re-probing
/// and returning the winning row, per §4.7.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created(Transaction),
    Duplicate(Transaction),
}

/// Canonical append table plus the parallel processing-task table. Single
/// `Mutex<Connection>` shared across both. §5 requires the Transaction
/// insert and the ProcessingTask update to be separate transactions so a
/// failure in one does not block the other — callers issue them as two
/// calls, never one combined statement.
pub struct TransactionStore {
    conn: Mutex<Connection>,
}

impl TransactionStore {
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        db::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- Transaction ---------------------------------------------------

    pub fn find_by_address(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<Transaction>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        find_by_address_locked(&conn, chat_id, message_id)
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Transaction>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        find_by_fingerprint_locked(&conn, fingerprint)
    }

    /// Cheap existence probe used by the work queue before enqueueing
    /// (§4.4): true iff a row already addresses this `(chat_id,
    /// message_id)`.
    pub fn address_exists(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool, StoreError> {
        Ok(self.find_by_address(chat_id, message_id)?.is_some())
    }

    /// Insert, reconciling via re-probe on either unique-index conflict
    /// (address or fingerprint) rather than upserting — the winning row's
    /// attributes are always preserved (§4.7).
    pub fn insert_transaction(&self, new: NewTransaction) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let uuid = Uuid::new_v4();

        let result = conn.execute(
            "INSERT INTO transactions (
                uuid, raw_text, source_type, chat_id, message_id, transaction_date, amount,
                currency, card_last_4, operator_raw, application_mapped, transaction_type,
                balance_after, receiver_name, receiver_card, parsing_method, parsing_confidence,
                is_gpt_parsed, is_p2p, fingerprint
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                uuid.to_string(),
                new.raw_text,
                new.source_type.to_string(),
                new.chat_id.map(|c| c.0),
                new.message_id.map(|m| m.0),
                new.transaction_date.format("%Y-%m-%d %H:%M:%S").to_string(),
                new.amount.to_string(),
                new.currency,
                new.card_last_4,
                new.operator_raw,
                new.application_mapped,
                new.transaction_type.to_string(),
                new.balance_after.map(|b| b.to_string()),
                new.receiver_name,
                new.receiver_card,
                new.parsing_method.map(|m| m.to_string()),
                new.parsing_confidence,
                new.is_gpt_parsed,
                new.is_p2p,
                new.fingerprint.clone(),
            ],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                let row = find_by_id_locked(&conn, id)?
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
                info!(transaction_id = id, fingerprint = %new.fingerprint, "transaction inserted");
                Ok(InsertOutcome::Created(row))
            }
            Err(e) if is_unique_violation(&e) => {
                if let (Some(chat_id), Some(message_id)) = (new.chat_id, new.message_id) {
                    if let Some(existing) = find_by_address_locked(&conn, chat_id, message_id)? {
                        return Ok(InsertOutcome::Duplicate(existing));
                    }
                }
                let existing = find_by_fingerprint_locked(&conn, &new.fingerprint)?
                    .ok_or(StoreError::Database(e))?;
                Ok(InsertOutcome::Duplicate(existing))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    // ---- ProcessingTask --------------------------------------------------

    /// Insert a `queued` task, or flip an existing `failed` row back to
    /// `queued` on re-enqueue (§3's only permitted backward
    /// transition). A no-op if the task is already `queued`/`processing`/
    /// `done`.
    pub fn enqueue_task(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<ProcessingTask, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        if let Some(existing) = find_task_by_address_locked(&conn, chat_id, message_id)? {
            if existing.status == TaskStatus::Failed {
                conn.execute(
                    "UPDATE receipt_processing_tasks SET status = 'queued', error = NULL WHERE id = ?1",
                    params![existing.id],
                )?;
                return find_task_by_address_locked(&conn, chat_id, message_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("task {chat_id}/{message_id}")));
            }
            return Ok(existing);
        }

        let task_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO receipt_processing_tasks (task_id, chat_id, message_id, status)
             VALUES (?1, ?2, ?3, 'queued')",
            params![task_id.to_string(), chat_id.0, message_id.0],
        )?;
        find_task_by_address_locked(&conn, chat_id, message_id)?
            .ok_or_else(|| StoreError::NotFound(format!("task {chat_id}/{message_id}")))
    }

    pub fn find_task_by_address(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<ProcessingTask>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        find_task_by_address_locked(&conn, chat_id, message_id)
    }

    pub fn mark_processing(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE receipt_processing_tasks SET status = 'processing'
             WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id.0, message_id.0],
        )?;
        Ok(())
    }

    pub fn mark_done(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        transaction_id: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE receipt_processing_tasks SET status = 'done', transaction_id = ?3, error = NULL
             WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id.0, message_id.0, transaction_id],
        )?;
        Ok(())
    }

    pub fn mark_failed(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        error: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE receipt_processing_tasks SET status = 'failed', error = ?3
             WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id.0, message_id.0, error],
        )?;
        Ok(())
    }

    // ---- HiddenChat ------------------------------------------------------

    pub fn hide_chat(&self, chat_id: ChatId) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO hidden_bot_chats (chat_id) VALUES (?1)",
            params![chat_id.0],
        )?;
        Ok(())
    }

    pub fn unhide_chat(&self, chat_id: ChatId) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM hidden_bot_chats WHERE chat_id = ?1", params![chat_id.0])?;
        Ok(())
    }

    pub fn list_hidden(&self) -> Result<Vec<HiddenChat>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT chat_id FROM hidden_bot_chats")?;
        let rows = stmt
            .query_map([], |row| Ok(HiddenChat { chat_id: ChatId(row.get(0)?) }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- ParsingLog --------------------------------------------------------

    pub fn log_parsing_attempt(&self, entry: ParsingLogEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO parsing_logs (raw_message, parsing_method, success, error_message, processing_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.raw_message,
                entry.parsing_method.map(|m| m.to_string()),
                entry.success,
                entry.error_message,
                entry.processing_time_ms,
            ],
        )?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn find_by_address_locked(
    conn: &Connection,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Option<Transaction>, StoreError> {
    conn.query_row(
        &format!("{SELECT_TRANSACTION} WHERE chat_id = ?1 AND message_id = ?2"),
        params![chat_id.0, message_id.0],
        row_to_transaction,
    )
    .optional()
    .map_err(StoreError::from)
}

fn find_by_fingerprint_locked(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<Transaction>, StoreError> {
    conn.query_row(
        &format!("{SELECT_TRANSACTION} WHERE fingerprint = ?1"),
        params![fingerprint],
        row_to_transaction,
    )
    .optional()
    .map_err(StoreError::from)
}

fn find_by_id_locked(conn: &Connection, id: i64) -> Result<Option<Transaction>, StoreError> {
    conn.query_row(&format!("{SELECT_TRANSACTION} WHERE id = ?1"), params![id], row_to_transaction)
        .optional()
        .map_err(StoreError::from)
}

fn find_task_by_address_locked(
    conn: &Connection,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Option<ProcessingTask>, StoreError> {
    conn.query_row(
        "SELECT id, task_id, chat_id, message_id, status, transaction_id, error
         FROM receipt_processing_tasks WHERE chat_id = ?1 AND message_id = ?2",
        params![chat_id.0, message_id.0],
        row_to_task,
    )
    .optional()
    .map_err(StoreError::from)
}

const SELECT_TRANSACTION: &str = "SELECT id, uuid, raw_text, source_type, chat_id, message_id, \
    transaction_date, amount, currency, card_last_4, operator_raw, application_mapped, \
    transaction_type, balance_after, receiver_name, receiver_card, parsing_method, \
    parsing_confidence, is_gpt_parsed, is_p2p, fingerprint, created_at, updated_at \
    FROM transactions";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let source_type_raw: String = row.get(3)?;
    let transaction_type_raw: String = row.get(12)?;
    let parsing_method_raw: Option<String> = row.get(16)?;
    let amount_raw: String = row.get(7)?;
    let balance_raw: Option<String> = row.get(13)?;

    Ok(Transaction {
        id: row.get(0)?,
        uuid: row.get::<_, String>(1)?.parse().unwrap_or_else(|_| Uuid::nil()),
        raw_text: row.get(2)?,
        source_type: source_type_raw.parse().unwrap_or(SourceType::Auto),
        chat_id: row.get::<_, Option<i64>>(4)?.map(ChatId),
        message_id: row.get::<_, Option<i64>>(5)?.map(MessageId),
        transaction_date: parse_naive(&row.get::<_, String>(6)?),
        amount: amount_raw.parse().unwrap_or(Decimal::ZERO),
        currency: row.get(8)?,
        card_last_4: row.get(9)?,
        operator_raw: row.get(10)?,
        application_mapped: row.get(11)?,
        transaction_type: transaction_type_raw.parse().unwrap_or(TransactionType::Debit),
        balance_after: balance_raw.and_then(|s| s.parse().ok()),
        receiver_name: row.get(14)?,
        receiver_card: row.get(15)?,
        parsing_method: parsing_method_raw.and_then(|s| s.parse().ok()),
        parsing_confidence: row.get(17)?,
        is_gpt_parsed: row.get(18)?,
        is_p2p: row.get(19)?,
        fingerprint: row.get(20)?,
        created_at: parse_naive(&row.get::<_, String>(21)?),
        updated_at: parse_naive(&row.get::<_, String>(22)?),
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingTask> {
    let status_raw: String = row.get(4)?;
    Ok(ProcessingTask {
        id: row.get(0)?,
        task_id: row.get::<_, String>(1)?.parse().unwrap_or_else(|_| Uuid::nil()),
        chat_id: ChatId(row.get(2)?),
        message_id: MessageId(row.get(3)?),
        status: status_raw.parse().unwrap_or(TaskStatus::Queued),
        transaction_id: row.get(5)?,
        error: row.get(6)?,
    })
}

fn parse_naive(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .unwrap_or_else(|_| NaiveDateTime::parse_from_str("1970-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipt_core::types::{ChatId, MessageId};

    fn sample(chat: i64, msg: i64, fingerprint: &str) -> NewTransaction {
        NewTransaction {
            raw_text: "raw".into(),
            source_type: SourceType::Auto,
            chat_id: Some(ChatId(chat)),
            message_id: Some(MessageId(msg)),
            transaction_date: NaiveDateTime::parse_from_str("2025-04-05 12:58:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            amount: Decimal::new(-400000, 0),
            currency: "UZS".into(),
            card_last_4: Some("6905".into()),
            operator_raw: Some("OQ P2P>TASHKENT".into()),
            application_mapped: None,
            transaction_type: TransactionType::Debit,
            balance_after: None,
            receiver_name: None,
            receiver_card: None,
            parsing_method: Some(ParsingMethod::RegexHumo),
            parsing_confidence: Some(0.95),
            is_gpt_parsed: false,
            is_p2p: true,
            fingerprint: fingerprint.into(),
        }
    }

    #[test]
    fn address_uniqueness_reprobes_on_conflict() {
        let store = TransactionStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let first = store.insert_transaction(sample(1, 100, "fp-a")).unwrap();
        let first_id = match first {
            InsertOutcome::Created(t) => t.id,
            _ => panic!("expected Created"),
        };

        let second = store.insert_transaction(sample(1, 100, "fp-b")).unwrap();
        match second {
            InsertOutcome::Duplicate(t) => assert_eq!(t.id, first_id),
            _ => panic!("expected Duplicate on address conflict"),
        }
    }

    #[test]
    fn fingerprint_uniqueness_reprobes_on_conflict() {
        let store = TransactionStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let first = store.insert_transaction(sample(1, 100, "fp-shared")).unwrap();
        let first_id = match first {
            InsertOutcome::Created(t) => t.id,
            _ => panic!("expected Created"),
        };

        let second = store.insert_transaction(sample(2, 200, "fp-shared")).unwrap();
        match second {
            InsertOutcome::Duplicate(t) => assert_eq!(t.id, first_id),
            _ => panic!("expected Duplicate on fingerprint conflict"),
        }
    }

    #[test]
    fn failed_task_reenqueues_to_queued() {
        let store = TransactionStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let chat = ChatId(9);
        let msg = MessageId(9);
        store.enqueue_task(chat, msg).unwrap();
        store.mark_failed(chat, msg, "boom").unwrap();
        let task = store.enqueue_task(chat, msg).unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.error.is_none());
    }
}
