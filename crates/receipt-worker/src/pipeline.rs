use std::sync::Arc;

use chrono::Timelike;
use chrono_tz::Tz;
use receipt_chat::{ChatDocument, ChatSession};
use receipt_core::time::localize_naive;
use receipt_core::types::{ChatId, MessageId, SourceType, TransactionType};
use receipt_parsing::llm::{mask_sensitive_text, parse_images_with_model, parse_text_with_model, LlmProvider};
use receipt_parsing::pdf::{extract_text, OcrEngine, PageRenderer};
use receipt_parsing::regex_cascade;
use receipt_parsing::{fingerprint, ParseOutcome, ParsedReceipt};
use receipt_resolver::OperatorResolver;
use receipt_store::{InsertOutcome, NewTransaction, ParsingLogEntry, Transaction, TransactionStore};
use tracing::{info, warn};

use crate::error::WorkerError;

const RESOLVER_TEXT_CAP_BYTES: usize = 4 * 1024;
const VISION_MAX_PAGES: usize = 2;

/// Outcome of one pipeline run, used by the worker pool to decide whether
/// the monitor cursor advances (it always does on a terminal outcome —
/// only mid-flight errors are subject to the permanent/transient split).
#[derive(Debug)]
pub enum PipelineOutcome {
    Created(Transaction),
    Duplicate(Transaction),
}

/// The 15-step per-message pipeline from §4.5, step-for-step.
pub struct Pipeline {
    pub chat: Arc<ChatSession>,
    pub store: Arc<TransactionStore>,
    pub resolver: Arc<OperatorResolver>,
    pub model: Option<Arc<dyn LlmProvider>>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub zone: Tz,
    pub text_confidence_threshold: f64,
}

impl Pipeline {
    pub async fn process_one(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<PipelineOutcome, WorkerError> {
        self.process_one_inner(chat_id, message_id, false).await
    }

    /// Same as `process_one`, but `force=true` skips step 1's address probe
    /// (the `/process-receipt` HTTP contract's `force` flag, §6) — the
    /// fingerprint probe in step 13 still runs unconditionally, so a forced
    /// re-process of an already-persisted receipt still cannot duplicate it.
    pub async fn process_one_forced(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        force: bool,
    ) -> Result<PipelineOutcome, WorkerError> {
        self.process_one_inner(chat_id, message_id, force).await
    }

    async fn process_one_inner(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        force: bool,
    ) -> Result<PipelineOutcome, WorkerError> {
        self.store.enqueue_task(chat_id, message_id)?;

        // Step 1: idempotency probe. Skipped under `force`, per the HTTP
        // contract's "force bypasses the address probe but not the
        // fingerprint probe" rule.
        if !force {
            if let Some(existing) = self.store.find_by_address(chat_id, message_id)? {
                self.store.mark_done(chat_id, message_id, existing.id)?;
                return Ok(PipelineOutcome::Duplicate(existing));
            }
        }

        self.store.mark_processing(chat_id, message_id)?;

        match self.run(chat_id, message_id).await {
            Ok(outcome) => {
                let transaction_id = match &outcome {
                    PipelineOutcome::Created(t) | PipelineOutcome::Duplicate(t) => t.id,
                };
                self.store.mark_done(chat_id, message_id, transaction_id)?;
                Ok(outcome)
            }
            Err(e) => {
                self.store.mark_failed(chat_id, message_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Times the attempt and records one `parsing_logs` row regardless of
    /// outcome (§4.7's "one row per attempt, success or failure"), then
    /// delegates the actual pipeline steps to `run_inner`.
    async fn run(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<PipelineOutcome, WorkerError> {
        let started = std::time::Instant::now();
        let mut attempt_text = String::new();
        let mut attempt_method = None;

        let result = self
            .run_inner(chat_id, message_id, &mut attempt_text, &mut attempt_method)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let entry = ParsingLogEntry {
            raw_message: attempt_text,
            parsing_method: attempt_method,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
            processing_time_ms: Some(elapsed_ms),
        };
        if let Err(e) = self.store.log_parsing_attempt(entry) {
            warn!(%chat_id, %message_id, error = %e, "failed to record parsing log entry");
        }

        result
    }

    async fn run_inner(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        attempt_text: &mut String,
        attempt_method: &mut Option<receipt_parsing::types::ParsingMethod>,
    ) -> Result<PipelineOutcome, WorkerError> {
        // Step 2: fetch message.
        let message = self
            .chat
            .get_message(chat_id, message_id)
            .await?
            .ok_or_else(|| WorkerError::Permanent("message not found".into()))?;

        let caption = message.text.trim().to_string();

        // Step 3: branch on payload.
        let (parser_input, pdf_bytes) = match &message.document {
            Some(document) => {
                if !is_pdf_document(document) {
                    return Err(WorkerError::Permanent(format!(
                        "unsupported document type: {}",
                        document.mime_type.clone().unwrap_or_default()
                    )));
                }
                let (extracted, bytes) = self.extract_pdf_text(chat_id, message_id, document).await?;
                let combined = [caption.as_str(), extracted.as_str()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (combined, Some(bytes))
            }
            None => {
                if caption.is_empty() {
                    return Err(WorkerError::Permanent("empty message content".into()));
                }
                (caption.clone(), None)
            }
        };
        *attempt_text = parser_input.clone();

        // Steps 4-7: regex cascade, then model-text, then (PDF only) vision.
        let parsed = self
            .parse_cascade(&parser_input, pdf_bytes.as_deref())
            .await?;

        // Step 8: post-validation.
        let validated = self.post_validate(parsed, &parser_input);
        *attempt_method = Some(validated.parsing_method);

        // Step 9: operator resolution.
        let operator_raw = validated.operator_raw.clone().unwrap_or_else(|| "Unknown".to_string());
        let masked_text = mask_sensitive_text(&parser_input);
        let masked_hint = truncate_bytes(&masked_text, RESOLVER_TEXT_CAP_BYTES);
        let resolve_outcome = match self
            .resolver
            .resolve(&operator_raw, masked_hint, self.model.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "operator resolution failed, keeping parser-provided is_p2p");
                receipt_resolver::ResolveOutcome {
                    application_mapped: None,
                    is_p2p: validated.is_p2p.unwrap_or(false),
                    suggested_reference: None,
                }
            }
        };

        // Step 10: timestamp canonicalization. Every cascade stage already
        // produces a local wall-clock reading (no embedded offset), so
        // canonicalization is just treating it as local to the configured
        // zone rather than converting a UTC instant.
        let transaction_date = localize_naive(validated.transaction_date, self.zone);

        // Step 11: signed amount.
        let signed_amount = if validated.transaction_type == TransactionType::Debit {
            -validated.amount.abs()
        } else {
            validated.amount.abs()
        };

        // Step 12: fingerprint.
        let minute_truncated = transaction_date
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(transaction_date);
        let fp = fingerprint::compute(
            validated.amount.abs(),
            minute_truncated,
            validated.card_last_4.as_deref(),
        );

        // Step 13: content-duplicate probe.
        if let Some(existing) = self.store.find_by_fingerprint(&fp)? {
            return Ok(PipelineOutcome::Duplicate(existing));
        }

        let new_transaction = NewTransaction {
            raw_text: parser_input.clone(),
            source_type: SourceType::Auto,
            chat_id: Some(chat_id),
            message_id: Some(message_id),
            transaction_date,
            amount: signed_amount,
            currency: validated.currency,
            card_last_4: validated.card_last_4,
            operator_raw: Some(operator_raw),
            application_mapped: resolve_outcome.application_mapped,
            transaction_type: validated.transaction_type,
            balance_after: validated.balance_after,
            receiver_name: validated.receiver_name,
            receiver_card: validated.receiver_card,
            parsing_method: Some(validated.parsing_method),
            parsing_confidence: Some(validated.parsing_confidence),
            is_gpt_parsed: validated.parsing_method.is_model(),
            is_p2p: resolve_outcome.is_p2p,
            fingerprint: fp,
        };

        // Step 14-15: insert, reconciling on conflict, then caller marks the task done.
        match self.store.insert_transaction(new_transaction)? {
            InsertOutcome::Created(t) => {
                info!(transaction_id = t.id, %chat_id, %message_id, "transaction created");
                Ok(PipelineOutcome::Created(t))
            }
            InsertOutcome::Duplicate(t) => Ok(PipelineOutcome::Duplicate(t)),
        }
    }

    async fn extract_pdf_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        document: &ChatDocument,
    ) -> Result<(String, Vec<u8>), WorkerError> {
        let path = self
            .chat
            .download_file(chat_id, message_id, document)
            .await?
            .ok_or_else(|| WorkerError::Transient("timed out downloading pdf".into()))?;

        let bytes = std::fs::read(&path)
            .map_err(|e| WorkerError::Permanent(format!("failed to read downloaded pdf: {e}")))?;

        let text = match extract_text(&bytes, self.ocr.as_deref()) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "pdf text extraction failed, continuing with empty text");
                String::new()
            }
        };
        Ok((text, bytes))
    }

    /// Steps 4-7: regex cascade -> model-text fallback -> (PDF only) vision
    /// fallback. Each stage "wins" outright on success; the next stage only
    /// runs when the previous one failed or fell below the text-confidence
    /// threshold. `pdf_bytes` is `Some` only when the message carried a PDF.
    async fn parse_cascade(
        &self,
        text: &str,
        pdf_bytes: Option<&[u8]>,
    ) -> Result<ParsedReceipt, WorkerError> {
        if let ParseOutcome::Parsed(receipt) = regex_cascade::parse(text) {
            if receipt.parsing_confidence >= self.text_confidence_threshold {
                return Ok(receipt);
            }
        }

        if let Some(model) = &self.model {
            if !text.is_empty() {
                match parse_text_with_model(model.as_ref(), text).await {
                    Ok(ParseOutcome::Parsed(receipt)) => return Ok(receipt),
                    Ok(ParseOutcome::Failed(failure)) => {
                        warn!(reason = %failure.reason, "model-text fallback did not yield a record")
                    }
                    Err(e) => warn!(error = %e, "model-text fallback call failed"),
                }
            }
        }

        if let Some(bytes) = pdf_bytes {
            if let (Some(model), Some(renderer)) = (&self.model, &self.renderer) {
                let images = renderer
                    .render_to_png_base64(bytes, VISION_MAX_PAGES)
                    .map_err(WorkerError::Parsing)?;
                return match parse_images_with_model(model.as_ref(), &images, text).await {
                    Ok(ParseOutcome::Parsed(receipt)) => Ok(receipt),
                    Ok(ParseOutcome::Failed(failure)) => Err(WorkerError::Permanent(failure.reason)),
                    Err(e) => Err(WorkerError::Parsing(e)),
                };
            }
            return Err(WorkerError::Permanent(
                "vision fallback unavailable: model or page renderer not configured".into(),
            ));
        }

        Err(WorkerError::Permanent("cannot parse receipt".into()))
    }

    /// Step 8: require non-null amount/timestamp/type (guaranteed by
    /// `ParsedReceipt`'s construction), coerce currency, take absolute
    /// values, backfill card-last-4, and fall back to the "P2P" substring
    /// heuristic when the parser did not set `is_p2p` itself.
    fn post_validate(&self, mut parsed: ParsedReceipt, raw_text: &str) -> ParsedReceipt {
        parsed.currency = if parsed.currency.trim().is_empty() {
            "UZS".to_string()
        } else {
            parsed.currency.to_uppercase()
        };
        parsed.amount = parsed.amount.abs();
        parsed.balance_after = parsed.balance_after.map(|b| b.abs());
        if parsed.card_last_4.is_none() {
            parsed.card_last_4 = receipt_parsing::amount::extract_card_last4(raw_text);
        }
        if parsed.is_p2p.is_none() {
            let operator_upper = parsed
                .operator_raw
                .as_deref()
                .unwrap_or_default()
                .to_uppercase();
            parsed.is_p2p = Some(operator_upper.contains("P2P"));
        }
        parsed
    }
}

fn is_pdf_document(document: &ChatDocument) -> bool {
    document
        .mime_type
        .as_deref()
        .map(|m| m.eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false)
        || document
            .file_name
            .as_deref()
            .map(|n| n.to_lowercase().ends_with(".pdf"))
            .unwrap_or(false)
}

fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut idx = max_bytes;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    &s[..idx]
}
