use chrono::NaiveDateTime;
use receipt_core::types::{ChatId, MessageId, SourceType, TaskStatus, TransactionType};
use receipt_parsing::types::ParsingMethod;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Canonical append-only row, field set per §3 plus `models.py`'s
/// `Transaction` (receiver fields, `is_gpt_parsed`). Amount carries the
/// sign convention directly (`DEBIT` negative, all others non-negative).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub uuid: Uuid,
    pub raw_text: String,
    pub source_type: SourceType,
    pub chat_id: Option<ChatId>,
    pub message_id: Option<MessageId>,
    pub transaction_date: NaiveDateTime,
    pub amount: Decimal,
    pub currency: String,
    pub card_last_4: Option<String>,
    pub operator_raw: Option<String>,
    pub application_mapped: Option<String>,
    pub transaction_type: TransactionType,
    pub balance_after: Option<Decimal>,
    pub receiver_name: Option<String>,
    pub receiver_card: Option<String>,
    pub parsing_method: Option<ParsingMethod>,
    pub parsing_confidence: Option<f64>,
    pub is_gpt_parsed: bool,
    pub is_p2p: bool,
    pub fingerprint: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields the worker supplies when inserting a new transaction; store-owned
/// fields (`id`, `uuid`, `created_at`, `updated_at`) are generated on insert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub raw_text: String,
    pub source_type: SourceType,
    pub chat_id: Option<ChatId>,
    pub message_id: Option<MessageId>,
    pub transaction_date: NaiveDateTime,
    pub amount: Decimal,
    pub currency: String,
    pub card_last_4: Option<String>,
    pub operator_raw: Option<String>,
    pub application_mapped: Option<String>,
    pub transaction_type: TransactionType,
    pub balance_after: Option<Decimal>,
    pub receiver_name: Option<String>,
    pub receiver_card: Option<String>,
    pub parsing_method: Option<ParsingMethod>,
    pub parsing_confidence: Option<f64>,
    pub is_gpt_parsed: bool,
    pub is_p2p: bool,
    pub fingerprint: String,
}

/// One row per `(chat_id, message_id)` the pipeline ever attempts,
/// per §3's ProcessingTask entity.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub id: i64,
    pub task_id: Uuid,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub status: TaskStatus,
    pub transaction_id: Option<i64>,
    pub error: Option<String>,
}

/// View-filter only row, per §3's HiddenChat entity.
#[derive(Debug, Clone, Copy)]
pub struct HiddenChat {
    pub chat_id: ChatId,
}

/// Debugging/observability row: one entry per parse attempt regardless of
/// outcome. Ambient concern carried forward from `models.py::ParsingLog`
/// even though the original feature list doesn't name it — logging survives
/// as an ambient concern regardless.
#[derive(Debug, Clone)]
pub struct ParsingLogEntry {
    pub raw_message: String,
    pub parsing_method: Option<ParsingMethod>,
    pub success: bool,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
}
