use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use receipt_core::types::{ChatId, MessageId};
use receipt_store::Transaction;
use receipt_worker::PipelineOutcome;

use crate::app::AppState;
use crate::error::ApiError;

/// Wire view of `Transaction`, following the §3 sign/type/fingerprint
/// conventions verbatim — decimals serialize as strings so no precision
/// is lost crossing the JSON boundary.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: i64,
    pub uuid: String,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub transaction_date: String,
    pub amount: String,
    pub currency: String,
    pub card_last_4: Option<String>,
    pub operator_raw: Option<String>,
    pub application_mapped: Option<String>,
    pub transaction_type: String,
    pub balance_after: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_card: Option<String>,
    pub is_p2p: bool,
    pub fingerprint: String,
}

impl From<&Transaction> for TransactionView {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id,
            uuid: t.uuid.to_string(),
            chat_id: t.chat_id.map(|c| c.0),
            message_id: t.message_id.map(|m| m.0),
            transaction_date: t.transaction_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            amount: t.amount.to_string(),
            currency: t.currency.clone(),
            card_last_4: t.card_last_4.clone(),
            operator_raw: t.operator_raw.clone(),
            application_mapped: t.application_mapped.clone(),
            transaction_type: t.transaction_type.to_string(),
            balance_after: t.balance_after.map(|b| b.to_string()),
            receiver_name: t.receiver_name.clone(),
            receiver_card: t.receiver_card.clone(),
            is_p2p: t.is_p2p,
            fingerprint: t.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParsingInfo {
    pub method: Option<String>,
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&Transaction> for ParsingInfo {
    fn from(t: &Transaction) -> Self {
        Self {
            method: t.parsing_method.map(|m| m.to_string()),
            confidence: t.parsing_confidence,
            notes: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessReceiptResponse {
    pub created: bool,
    pub duplicate: bool,
    pub transaction: TransactionView,
    pub parsing: ParsingInfo,
}

impl From<PipelineOutcome> for ProcessReceiptResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Created(t) => ProcessReceiptResponse {
                created: true,
                duplicate: false,
                transaction: TransactionView::from(&t),
                parsing: ParsingInfo::from(&t),
            },
            PipelineOutcome::Duplicate(t) => ProcessReceiptResponse {
                created: false,
                duplicate: true,
                transaction: TransactionView::from(&t),
                parsing: ParsingInfo::from(&t),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessReceiptRequest {
    pub chat_id: i64,
    pub message_id: i64,
    #[serde(default)]
    pub force: bool,
}

/// POST /process-receipt — run the full pipeline (spec §4.5) on one
/// message address synchronously, outside the capture layer's work queue.
/// `force=true` bypasses the address probe only, per §6's contract.
pub async fn process_receipt(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessReceiptRequest>,
) -> Result<Json<ProcessReceiptResponse>, ApiError> {
    let outcome = state
        .pipeline
        .process_one_forced(ChatId(req.chat_id), MessageId(req.message_id), req.force)
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct ProcessReceiptBatchRequest {
    pub chat_id: i64,
    pub message_ids: Vec<i64>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub message_id: i64,
    pub created: bool,
    pub duplicate: bool,
    pub transaction: Option<TransactionView>,
    pub parsing: Option<ParsingInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /process-receipt-batch — same as `/process-receipt` but over a
/// list of message ids in one chat; each item's outcome (including
/// failure) is independent of the others.
pub async fn process_receipt_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessReceiptBatchRequest>,
) -> Json<Vec<BatchItemResult>> {
    let mut results = Vec::with_capacity(req.message_ids.len());
    for message_id in req.message_ids {
        let outcome = state
            .pipeline
            .process_one_forced(ChatId(req.chat_id), MessageId(message_id), req.force)
            .await;
        results.push(match outcome {
            Ok(PipelineOutcome::Created(t)) => BatchItemResult {
                message_id,
                created: true,
                duplicate: false,
                transaction: Some(TransactionView::from(&t)),
                parsing: Some(ParsingInfo::from(&t)),
                error: None,
            },
            Ok(PipelineOutcome::Duplicate(t)) => BatchItemResult {
                message_id,
                created: false,
                duplicate: true,
                transaction: Some(TransactionView::from(&t)),
                parsing: Some(ParsingInfo::from(&t)),
                error: None,
            },
            Err(e) => BatchItemResult {
                message_id,
                created: false,
                duplicate: false,
                transaction: None,
                parsing: None,
                error: Some(e.to_string()),
            },
        });
    }
    Json(results)
}

#[derive(Debug, Deserialize)]
pub struct ProcessedStatusQuery {
    pub chat_id: i64,
    pub message_ids: String,
}

/// GET /processed-status?chat_id=...&message_ids=1,2,3 — map from message
/// id to whether a transaction already addresses `(chat_id, message_id)`.
pub async fn processed_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessedStatusQuery>,
) -> Result<Json<HashMap<String, bool>>, ApiError> {
    let chat_id = ChatId(query.chat_id);
    let mut out = HashMap::new();
    for raw in query.message_ids.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let message_id: i64 = raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid message id: {raw}")))?;
        let exists = state.store.address_exists(chat_id, MessageId(message_id))?;
        out.insert(message_id.to_string(), exists);
    }
    Ok(Json(out))
}
