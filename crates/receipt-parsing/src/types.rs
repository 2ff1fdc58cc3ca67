use std::fmt;

use chrono::NaiveDateTime;
use receipt_core::types::TransactionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Parsing method tag, drawn from §6's fixed set. A tagged enum
/// rather than a loose string, per §9's REDESIGN FLAGS ("cascading
/// fallbacks ... should be modeled as tagged-variant outcome values
/// carrying the method tag and confidence, not as string flags").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsingMethod {
    RegexHumo,
    RegexSms,
    RegexSemicolon,
    RegexCardXabar,
    Gpt,
    GptVision,
}

impl ParsingMethod {
    pub fn is_model(&self) -> bool {
        matches!(self, ParsingMethod::Gpt | ParsingMethod::GptVision)
    }
}

impl fmt::Display for ParsingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParsingMethod::RegexHumo => "REGEX_HUMO",
            ParsingMethod::RegexSms => "REGEX_SMS",
            ParsingMethod::RegexSemicolon => "REGEX_SEMICOLON",
            ParsingMethod::RegexCardXabar => "REGEX_CARDXABAR",
            ParsingMethod::Gpt => "GPT",
            ParsingMethod::GptVision => "GPT_VISION",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ParsingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGEX_HUMO" => Ok(ParsingMethod::RegexHumo),
            "REGEX_SMS" => Ok(ParsingMethod::RegexSms),
            "REGEX_SEMICOLON" => Ok(ParsingMethod::RegexSemicolon),
            "REGEX_CARDXABAR" => Ok(ParsingMethod::RegexCardXabar),
            "GPT" => Ok(ParsingMethod::Gpt),
            "GPT_VISION" => Ok(ParsingMethod::GptVision),
            other => Err(format!("unknown parsing method: {other}")),
        }
    }
}

/// A fully extracted receipt, prior to operator resolution and fingerprinting.
/// Amounts are always non-negative here; sign is applied by the worker once
/// the canonical `transaction_type` is known (§4.5 step 11).
#[derive(Debug, Clone)]
pub struct ParsedReceipt {
    pub amount: Decimal,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub card_last_4: Option<String>,
    pub operator_raw: Option<String>,
    pub transaction_date: NaiveDateTime,
    pub balance_after: Option<Decimal>,
    pub parsing_method: ParsingMethod,
    pub parsing_confidence: f64,
    /// Set by the parser itself (e.g. an explicit P2P marker in the text).
    /// `None` means "not determined here" — the worker's resolver/heuristic
    /// order from §9's Open Question #3 applies next.
    pub is_p2p: Option<bool>,
    pub receiver_name: Option<String>,
    pub receiver_card: Option<String>,
    pub application_mapped: Option<String>,
}

/// Outcome of one cascade stage. Carries the method tag and confidence on
/// the success path rather than relying on string flags, per §9.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(ParsedReceipt),
    Failed(ParseFailure),
}

#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub permanent: bool,
    pub reason: String,
}

impl ParseFailure {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            permanent: true,
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            permanent: false,
            reason: reason.into(),
        }
    }
}
