use once_cell::sync::Lazy;
use receipt_core::types::TransactionType;
use regex::Regex;

use crate::amount::{extract_card_last4, normalize_amount, parse_date_semicolon, parse_date_standard};
use crate::types::{ParseFailure, ParseOutcome, ParsedReceipt, ParsingMethod};

/// Runs the four deterministic dialect parsers, each gated by a cheap
/// substring/marker check before the dialect's own field regexes run.
/// Mirrors `original_source/backend/parsers/regex_parser.py::parse`'s
/// dispatch order exactly: CardXabar's bullet emoji first (since its
/// notification body also carries the Humo emoji set and would otherwise
/// be mis-routed), then Humo's own emoji notification, then the
/// semicolon-delimited export line, then the inline SMS dialect.
pub fn parse(text: &str) -> ParseOutcome {
    if has_cardxabar_marker(text) {
        if let Some(receipt) = parse_cardxabar(text) {
            return ParseOutcome::Parsed(receipt);
        }
    }
    if has_humo_marker(text) {
        if let Some(receipt) = parse_humo_notification(text) {
            return ParseOutcome::Parsed(receipt);
        }
    }
    if has_semicolon_marker(text) {
        if let Some(receipt) = parse_semicolon_format(text) {
            return ParseOutcome::Parsed(receipt);
        }
    }
    if has_sms_marker(text) {
        if let Some(receipt) = parse_sms_inline(text) {
            return ParseOutcome::Parsed(receipt);
        }
    }
    ParseOutcome::Failed(ParseFailure::permanent(
        "text matched none of the known regex dialects",
    ))
}

fn has_cardxabar_marker(text: &str) -> bool {
    ["CardXabar", "NBU Card", "\u{1f534}", "\u{1f7e2}"]
        .iter()
        .any(|m| text.contains(m))
}

fn has_humo_marker(text: &str) -> bool {
    ["\u{1f4b8}", "\u{1f4b3}", "\u{1f4cd}", "\u{1f553}", "\u{1f558}"]
        .iter()
        .any(|m| text.contains(m))
}

fn has_semicolon_marker(text: &str) -> bool {
    text.contains("HUMOCARD *") && text.contains(';')
}

fn has_sms_marker(text: &str) -> bool {
    text.contains("summa:") && text.contains("karta")
}

// ---------------------------------------------------------------------
// Humo notification: emoji-labelled, multi-line ("💸 Оплата\n➖ 10.000 UZS\n
// 📍 operator\n💳 HUMOCARD *6714\n🕓 12:01 14.04.2025\n💰 balance UZS").
// ---------------------------------------------------------------------

static HUMO_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{2796}\u{2795}\u{1f4b8}]\s*([\d\s.,]+)\s*(UZS|USD)").unwrap());
static HUMO_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Оплата|Пополнение|Операция|Конверсия)").unwrap());
static HUMO_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{1f4cd}\s*(.+)").unwrap());
static HUMO_DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\u{1f553}\u{1f558}]\s*(?:(\d{2}:\d{2})\s+(\d{2}\.\d{2}\.\d{2,4})|(\d{2}\.\d{2}\.\d{2,4})\s+(\d{2}:\d{2}))",
    )
    .unwrap()
});
static HUMO_BALANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{1f4b0}\u{1f4b5}]\s*([\d\s.,]+)\s*(USD|UZS)").unwrap());
static HUMO_CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(USD|UZS)").unwrap());

/// `Оплата` (payment) and `Операция` (operation) are debits; `Пополнение`
/// (top-up) is a credit; `Конверсия` (conversion) is its own type. When no
/// labelled keyword is present, fall back to the OTMENA/conversion/emoji
/// heuristics `regex_parser.py::parse_humo_notification` uses.
fn parse_humo_notification(text: &str) -> Option<ParsedReceipt> {
    let amount_caps = HUMO_AMOUNT.captures(text)?;
    let amount = normalize_amount(&amount_caps[1]).ok()?;
    let amount_currency = amount_caps.get(2).map(|m| m.as_str().to_string());

    let transaction_type = match HUMO_TYPE.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str()) {
        Some("\u{41e}\u{43f}\u{43b}\u{430}\u{442}\u{430}") => TransactionType::Debit, // Оплата
        Some("\u{41f}\u{43e}\u{43f}\u{43e}\u{43b}\u{43d}\u{435}\u{43d}\u{438}\u{435}") => TransactionType::Credit, // Пополнение
        Some("\u{41e}\u{43f}\u{435}\u{440}\u{430}\u{446}\u{438}\u{44f}") => TransactionType::Debit, // Операция
        Some("\u{41a}\u{43e}\u{43d}\u{432}\u{435}\u{440}\u{441}\u{438}\u{44f}") => TransactionType::Conversion, // Конверсия
        _ => {
            let upper = text.to_uppercase();
            if upper.contains("OTMENA") {
                TransactionType::Reversal
            } else if upper.contains("\u{41a}\u{41e}\u{41d}\u{412}\u{415}\u{420}\u{421}") || upper.contains("CONVERS") {
                TransactionType::Conversion
            } else if text.contains('\u{2795}') || text.contains('\u{1f389}') {
                TransactionType::Credit
            } else {
                TransactionType::Debit
            }
        }
    };

    let card_last_4 = extract_card_last4(text);
    let operator_raw = HUMO_OPERATOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let dt_caps = HUMO_DATETIME.captures(text)?;
    let (date_str, time_str) = match (dt_caps.get(1), dt_caps.get(2)) {
        (Some(time), Some(date)) => (date.as_str(), time.as_str()),
        _ => (dt_caps.get(3)?.as_str(), dt_caps.get(4)?.as_str()),
    };
    let transaction_date = parse_date_standard(date_str, time_str).ok()?;

    let balance_after = HUMO_BALANCE
        .captures(text)
        .and_then(|c| normalize_amount(&c[1]).ok());

    let currency = amount_currency
        .or_else(|| HUMO_CURRENCY.captures(text).map(|c| c[1].to_string()))
        .unwrap_or_else(|| "UZS".to_string());

    Some(ParsedReceipt {
        amount,
        currency,
        transaction_type,
        card_last_4,
        operator_raw,
        transaction_date,
        balance_after,
        parsing_method: ParsingMethod::RegexHumo,
        parsing_confidence: 0.95,
        is_p2p: None,
        receiver_name: None,
        receiver_card: None,
        application_mapped: None,
    })
}

// ---------------------------------------------------------------------
// Inline SMS: compact, comma-separated
// ("Pokupka: shop, city 02.04.25 08:37 karta ***0907. summa:44000.00 UZS").
// ---------------------------------------------------------------------

static SMS_OPERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Pokupka|Spisanie c karty|Popolnenie scheta|E-Com oplata|Platezh):\s*(.+?)(?:,|\s+\d{2}\.\d{2})")
        .unwrap()
});
static SMS_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}\.\d{2}\.\d{2})\s+(\d{2}:\d{2})").unwrap());
static SMS_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"summa:([\d\s.,]+)\s*UZS").unwrap());
static SMS_BALANCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"balans:([\d\s.,]+)\s*UZS").unwrap());
static SMS_TYPE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Pokupka|Spisanie|Popolnenie|E-Com|Platezh|OTMENA)").unwrap());

fn parse_sms_inline(text: &str) -> Option<ParsedReceipt> {
    let amount = normalize_amount(&SMS_AMOUNT.captures(text)?[1]).ok()?;
    let operator_raw = SMS_OPERATOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let dt_caps = SMS_DATETIME.captures(text)?;
    let transaction_date = parse_date_standard(&dt_caps[1], &dt_caps[2]).ok()?;

    let card_last_4 = extract_card_last4(text);
    let balance_after = SMS_BALANCE.captures(text).and_then(|c| normalize_amount(&c[1]).ok());

    let transaction_type = match SMS_TYPE_KEYWORD.captures(text).map(|c| c[1].to_string()) {
        Some(keyword) if keyword == "Popolnenie" => TransactionType::Credit,
        Some(keyword) if keyword == "OTMENA" => TransactionType::Reversal,
        _ => TransactionType::Debit,
    };

    Some(ParsedReceipt {
        amount,
        currency: "UZS".to_string(),
        transaction_type,
        card_last_4,
        operator_raw,
        transaction_date,
        balance_after,
        parsing_method: ParsingMethod::RegexSms,
        parsing_confidence: 0.90,
        is_p2p: None,
        receiver_name: None,
        receiver_card: None,
        application_mapped: None,
    })
}

// ---------------------------------------------------------------------
// Semicolon-delimited export line
// ("HUMOCARD *2529: popolnenie 2300.00 UZS; operator; 25-04-04 10:19; Dostupno: 4500.00 UZS").
// ---------------------------------------------------------------------

static SEMI_CARD_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"HUMOCARD\s*\*(\d{4}):\s*(oplata|popolnenie|operacija)\s+([\d.]+)\s*UZS").unwrap()
});
static SEMI_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r";\s*([^;]+?)\s*;").unwrap());
static SEMI_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";\s*(\d{2})-(\d{2})-(\d{2})\s+(\d{2}:\d{2})").unwrap());
static SEMI_BALANCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Dostupno:\s*([\d.]+)\s*UZS").unwrap());

fn parse_semicolon_format(text: &str) -> Option<ParsedReceipt> {
    let caps = SEMI_CARD_AMOUNT.captures(text)?;
    let card_last_4 = Some(caps[1].to_string());
    let transaction_type = match &caps[2] {
        "popolnenie" => TransactionType::Credit,
        _ => TransactionType::Debit,
    };
    let amount = normalize_amount(&caps[3]).ok()?;

    let operator_raw = SEMI_OPERATOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let dt_caps = SEMI_DATETIME.captures(text)?;
    let transaction_date = parse_date_semicolon(&dt_caps[1], &dt_caps[2], &dt_caps[3], &dt_caps[4]).ok()?;

    let balance_after = SEMI_BALANCE.captures(text).and_then(|c| normalize_amount(&c[1]).ok());

    Some(ParsedReceipt {
        amount,
        currency: "UZS".to_string(),
        transaction_type,
        card_last_4,
        operator_raw,
        transaction_date,
        balance_after,
        parsing_method: ParsingMethod::RegexSemicolon,
        parsing_confidence: 0.92,
        is_p2p: None,
        receiver_name: None,
        receiver_card: None,
        application_mapped: None,
    })
}

// ---------------------------------------------------------------------
// CardXabar / NBU Card: emoji bullet notifications
// ("🔴 Spisanie c karty\n➖ 351 750.00 UZS\n💳 ***4862\n📍 operator\n🕓 14.04.25 21:52\n💵 balance UZS").
// ---------------------------------------------------------------------

static CARDXABAR_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{2796}\u{2795}]\s*([\d\s.,]+)\s*(USD|UZS)").unwrap());
static CARDXABAR_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{1f4cd}\s*(.+)").unwrap());
static CARDXABAR_DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\u{1f553}\s*(?:(\d{2}:\d{2})\s+(\d{2}\.\d{2}\.\d{2,4})|(\d{2}\.\d{2}\.\d{2,4})\s+(\d{2}:\d{2}))")
        .unwrap()
});

fn parse_cardxabar(text: &str) -> Option<ParsedReceipt> {
    let amount_caps = CARDXABAR_AMOUNT.captures(text)?;
    let amount = normalize_amount(&amount_caps[1]).ok()?;
    let currency = amount_caps[2].to_string();

    let card_last_4 = extract_card_last4(text);
    let operator_raw = CARDXABAR_OPERATOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let dt_caps = CARDXABAR_DATETIME.captures(text)?;
    let (date_str, time_str) = match (dt_caps.get(1), dt_caps.get(2)) {
        (Some(time), Some(date)) => (date.as_str(), time.as_str()),
        _ => (dt_caps.get(3)?.as_str(), dt_caps.get(4)?.as_str()),
    };
    let transaction_date = parse_date_standard(date_str, time_str).ok()?;

    let balance_after = HUMO_BALANCE
        .captures(text)
        .and_then(|c| normalize_amount(&c[1]).ok());

    let upper = text.to_uppercase();
    let transaction_type = if upper.contains("OTMENA") {
        TransactionType::Reversal
    } else if upper.contains("\u{41a}\u{41e}\u{41d}\u{412}\u{415}\u{420}\u{421}")
        || upper.contains("CONVERS")
        || upper.contains("KONVERS")
    {
        TransactionType::Conversion
    } else if text.contains('\u{1f7e2}') || text.contains('\u{2795}') {
        TransactionType::Credit
    } else {
        TransactionType::Debit
    };

    Some(ParsedReceipt {
        amount,
        currency,
        transaction_type,
        card_last_4,
        operator_raw,
        transaction_date,
        balance_after,
        parsing_method: ParsingMethod::RegexCardXabar,
        parsing_confidence: 0.93,
        is_p2p: None,
        receiver_name: None,
        receiver_card: None,
        application_mapped: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_text_fails_permanently() {
        match parse("hello, just a regular chat message") {
            ParseOutcome::Failed(f) => assert!(f.permanent),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn humo_payment_debit() {
        let text = "\u{1f4b8} \u{41e}\u{43f}\u{43b}\u{430}\u{442}\u{430}\n\u{2796} 10.035.000,00 UZS\n\u{1f4cd} ChakanaPay Humo Uzca\n\u{1f4b3} HUMOCARD *6714\n\u{1f553} 12:01 14.04.2025\n\u{1f4b0} 3.547.712,00 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.parsing_method, ParsingMethod::RegexHumo);
                assert_eq!(r.amount.to_string(), "10035000.00");
                assert_eq!(r.currency, "UZS");
                assert_eq!(r.transaction_type, TransactionType::Debit);
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn humo_conversion_usd_card_mask_middle() {
        let text = "\u{1f4b8} \u{41a}\u{43e}\u{43d}\u{432}\u{435}\u{440}\u{441}\u{438}\u{44f}\n\u{2796} 1 100.90 USD\n\u{1f4b3} 532154**1744\n\u{1f553} 14.04.25 10:39\n\u{1f4b5} 1 505.00 USD";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.currency, "USD");
                assert_eq!(r.amount.to_string(), "1100.90");
                assert_eq!(r.transaction_type, TransactionType::Conversion);
                assert_eq!(r.card_last_4.as_deref(), Some("1744"));
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn sms_dialect_inline_purchase() {
        let text = "Pokupka: OOO \"AGAT SYSTEM\", tashkent, g tashkent Ul Gavhar 151 02.04.25 08:37 karta ***0907. summa:44000.00 UZS, balans:2607792.14 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.parsing_method, ParsingMethod::RegexSms);
                assert_eq!(r.amount.to_string(), "44000.00");
                assert_eq!(r.currency, "UZS");
                assert_eq!(r.transaction_type, TransactionType::Debit);
                assert_eq!(r.card_last_4.as_deref(), Some("0907"));
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn sms_dialect_otmena_prefix_is_reversal() {
        let text = "OTMENA Pokupka: XK FAMILY SHOP, UZ,02.04.25 11:50,karta ***0907. summa:100000.00 UZS balans:2527792.14 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.transaction_type, TransactionType::Reversal);
                assert_eq!(r.amount.to_string(), "100000.00");
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn semicolon_dialect_credit_popolnenie() {
        let text = "HUMOCARD *2529: popolnenie 2300.00 UZS; TBC HUMO P2P>TASHKEN; 25-04-04 10:19;  Dostupno: 4500.00 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.parsing_method, ParsingMethod::RegexSemicolon);
                assert_eq!(r.transaction_type, TransactionType::Credit);
                assert_eq!(r.amount.to_string(), "2300.00");
                assert_eq!(r.card_last_4.as_deref(), Some("2529"));
                assert_eq!(r.operator_raw.as_deref(), Some("TBC HUMO P2P>TASHKEN"));
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn cardxabar_spisanie_debit() {
        let text = "\u{1f534} Spisanie c karty\n\u{2796} 351 750.00 UZS\n\u{1f4b3} ***4862\n\u{1f4cd} UZCARD OTHERS 2 ANY PAYNET, 99\n\u{1f553} 14.04.25 21:52\n\u{1f4b5} 6 532 215.26 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.parsing_method, ParsingMethod::RegexCardXabar);
                assert_eq!(r.transaction_type, TransactionType::Debit);
                assert_eq!(r.amount.to_string(), "351750.00");
                assert_eq!(r.currency, "UZS");
                assert_eq!(r.card_last_4.as_deref(), Some("4862"));
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn cardxabar_otmena_reversal() {
        let text = "\u{1f7e2} OTMENA Pokupka\n\u{2795} 100 000.00 UZS\n\u{1f4b3} ***0907\n\u{1f4cd} XK FAMILY SHOP, UZ\n\u{1f553} 02.04.25 11:50\n\u{1f4b5} 2 527 792.14 UZS";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.transaction_type, TransactionType::Reversal);
                assert_eq!(r.amount.to_string(), "100000.00");
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn cardxabar_conversion_usd_with_header() {
        let text = "CardXabar\n\u{1f7e2} Konversiya\n\u{2795} 50.00 USD\n\u{1f4b3} 532154**1744\n\u{1f4cd} TEST OPERATOR\n\u{1f553} 21:10 15.04.2025\n\u{1f4b5} 1 505.00 USD";
        match parse(text) {
            ParseOutcome::Parsed(r) => {
                assert_eq!(r.transaction_type, TransactionType::Conversion);
                assert_eq!(r.currency, "USD");
            }
            other => panic!("expected Parsed, got {other:?}"),
        }
    }
}
