use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use receipt_core::types::TransactionType;

use crate::error::ParsingError;
use crate::types::{ParseFailure, ParseOutcome, ParsedReceipt, ParsingMethod};

/// Text capped at 20 kB, images capped to two pages, per §5's
/// cost-bounded payload rule.
const MAX_TEXT_BYTES: usize = 20 * 1024;
const MODEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Common interface for the text/vision/resolver model calls: one trait,
/// one `complete` method per modality, scoped to this pipeline's
/// JSON-schema prompts rather than a general chat-completion surface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ParsingError>;
    async fn complete_vision_json(
        &self,
        system: &str,
        user: &str,
        images_b64: &[String],
    ) -> Result<String, ParsingError>;
}

/// OpenAI-compatible chat-completions client: bearer auth, `{base_url}{path}`
/// endpoint assembly, 429 mapped to a transient `ParsingError::Provider`.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    vision_model: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: String, base_url: String, text_model: String, vision_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            text_model,
            vision_model,
        }
    }

    async fn chat(&self, model: &str, messages: serde_json::Value) -> Result<String, ParsingError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.1,
        });

        let resp = tokio::time::timeout(
            MODEL_REQUEST_TIMEOUT,
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| ParsingError::Timeout(MODEL_REQUEST_TIMEOUT))?
        .map_err(|e| ParsingError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ParsingError::Provider(format!("http {status}: {text}")));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ParsingError::SchemaMismatch(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ParsingError::SchemaMismatch("model returned no content".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ParsingError> {
        let messages = json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ]);
        self.chat(&self.text_model, messages).await
    }

    async fn complete_vision_json(
        &self,
        system: &str,
        user: &str,
        images_b64: &[String],
    ) -> Result<String, ParsingError> {
        let mut content = vec![json!({"type": "text", "text": user})];
        for img in images_b64 {
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{img}")},
            }));
        }
        let messages = json!([
            {"role": "system", "content": system},
            {"role": "user", "content": content},
        ]);
        self.chat(&self.vision_model, messages).await
    }
}

/// System prompt for the text/vision schema parse, distilled from
/// `original_source/backend/parsers/gpt_parser.py`'s `system_prompt`.
const PARSE_SYSTEM_PROMPT: &str = "You are a financial data analyst specialized in Uzbek payment systems. \
Analyze receipt text from Uzbek banks and payment systems (Uzcard, Humo, Click, Payme, etc.) and extract \
structured transaction data. Amounts are typically in UZS, sometimes USD. Dates follow DD.MM.YYYY or \
YY-MM-DD formats. DEBIT covers payments/purchases/withdrawals, CREDIT covers deposits/refunds, CONVERSION \
covers currency exchange, REVERSAL covers cancellations (OTMENA). Return ONLY a JSON object with keys: \
amount, currency, transaction_date_iso, card_last_4, operator_raw, transaction_type, balance_after, confidence.";

#[derive(Debug, Deserialize)]
struct TransactionSchema {
    amount: f64,
    #[serde(default = "default_currency")]
    currency: String,
    transaction_date_iso: String,
    card_last_4: Option<String>,
    operator_raw: Option<String>,
    transaction_type: String,
    balance_after: Option<f64>,
    confidence: f64,
}

fn default_currency() -> String {
    "UZS".to_string()
}

/// Digit sequences of length 12-19 (card-like) and phone-like 10-15-digit
/// runs are reduced to all-asterisks plus last four, per §4.5 step 6.
/// Grounded verbatim on `gpt_parser.py::_mask_sensitive_text`.
static CARD_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\d[ -]?){12,19}").unwrap());
static PHONE_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+?\d[\d -]{9,14}").unwrap());

pub fn mask_sensitive_text(text: &str) -> String {
    let masked = CARD_LIKE.replace_all(text, |caps: &regex::Captures| mask_digit_run(&caps[0]));
    PHONE_LIKE
        .replace_all(&masked, |caps: &regex::Captures| mask_digit_run(&caps[0]))
        .into_owned()
}

fn mask_digit_run(run: &str) -> String {
    let digits: String = run.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 8 {
        return run.to_string();
    }
    let last4 = &digits[digits.len() - 4..];
    format!("{}{}", "*".repeat(digits.len().saturating_sub(4).max(4)), last4)
}

/// Model-text fallback (§4.5 step 6). Masks sensitive digits first,
/// truncates to `MAX_TEXT_BYTES`, then requires the reply to parse into
/// `TransactionSchema` or the step fails.
pub async fn parse_text_with_model(
    provider: &dyn LlmProvider,
    text: &str,
) -> Result<ParseOutcome, ParsingError> {
    let masked = mask_sensitive_text(text);
    let truncated = truncate_bytes(&masked, MAX_TEXT_BYTES);
    let user = format!("Parse this Uzbek financial receipt:\n\n{truncated}");

    let reply = provider.complete_json(PARSE_SYSTEM_PROMPT, &user).await?;
    schema_to_outcome(&reply, ParsingMethod::Gpt)
}

/// Vision fallback (§4.5 step 7): renders are supplied by the caller
/// (PDF page rendering lives in `pdf.rs`'s pluggable `PageRenderer`), this
/// function only issues the model call and validates the schema reply.
pub async fn parse_images_with_model(
    provider: &dyn LlmProvider,
    images_b64: &[String],
    text_hint: &str,
) -> Result<ParseOutcome, ParsingError> {
    let user = if text_hint.is_empty() {
        "Extract structured transaction data from these receipt images. Return ONLY a JSON object \
         with keys: amount, currency, transaction_date_iso, card_last_4, operator_raw, \
         transaction_type, balance_after, confidence."
            .to_string()
    } else {
        format!(
            "Extract structured transaction data from these receipt images. Return ONLY a JSON object \
             with keys: amount, currency, transaction_date_iso, card_last_4, operator_raw, \
             transaction_type, balance_after, confidence.\n\nAdditional text hint (masked):\n{}",
            truncate_bytes(&mask_sensitive_text(text_hint), MAX_TEXT_BYTES)
        )
    };

    let reply = provider
        .complete_vision_json(PARSE_SYSTEM_PROMPT, &user, images_b64)
        .await?;
    schema_to_outcome(&reply, ParsingMethod::GptVision)
}

fn schema_to_outcome(reply: &str, method: ParsingMethod) -> Result<ParseOutcome, ParsingError> {
    let schema: TransactionSchema = extract_json(reply)
        .ok_or_else(|| ParsingError::SchemaMismatch("no JSON object in model reply".to_string()))?;

    let transaction_date = NaiveDateTime::parse_from_str(&schema.transaction_date_iso, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| {
            chrono::DateTime::parse_from_rfc3339(&schema.transaction_date_iso).map(|dt| dt.naive_utc())
        })
        .map_err(|e| ParsingError::SchemaMismatch(format!("invalid transaction_date_iso: {e}")))?;

    let amount = Decimal::try_from(schema.amount)
        .map_err(|e| ParsingError::SchemaMismatch(format!("invalid amount: {e}")))?;

    let transaction_type: TransactionType = schema
        .transaction_type
        .parse()
        .map_err(|e: String| ParsingError::SchemaMismatch(e))?;

    let balance_after = schema
        .balance_after
        .and_then(|b| Decimal::try_from(b).ok());

    Ok(ParseOutcome::Parsed(ParsedReceipt {
        amount: amount.abs(),
        currency: schema.currency.to_uppercase(),
        transaction_type,
        card_last_4: schema.card_last_4,
        operator_raw: schema.operator_raw,
        transaction_date,
        balance_after,
        parsing_method: method,
        parsing_confidence: schema.confidence.clamp(0.0, 1.0),
        is_p2p: None,
        receiver_name: None,
        receiver_card: None,
        application_mapped: None,
    }))
}

fn extract_json<T: for<'de> Deserialize<'de>>(content: &str) -> Option<T> {
    if let Ok(v) = serde_json::from_str(content) {
        return Some(v);
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
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

/// Converts a schema/provider error into a `ParseOutcome::Failed`, the
/// tagged-variant shape the cascade uses throughout (§9's REDESIGN
/// FLAGS item on outcome values, never string flags).
pub fn outcome_on_error(err: ParsingError) -> ParseOutcome {
    if err.is_permanent() {
        ParseOutcome::Failed(ParseFailure::permanent(err.to_string()))
    } else {
        ParseOutcome::Failed(ParseFailure::transient(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_card_number_keeping_last_four() {
        let masked = mask_sensitive_text("card 8600123456789012 was charged");
        assert!(masked.contains("9012"));
        assert!(!masked.contains("8600123456789012"));
    }

    #[test]
    fn leaves_short_digit_runs_untouched() {
        let masked = mask_sensitive_text("amount 12345 UZS");
        assert_eq!(masked, "amount 12345 UZS");
    }

    #[test]
    fn extracts_json_from_code_fence() {
        let reply = "Sure, here you go:\n```json\n{\"amount\": 1.0}\n```";
        let value: serde_json::Value = extract_json(reply).unwrap();
        assert_eq!(value["amount"], 1.0);
    }
}
