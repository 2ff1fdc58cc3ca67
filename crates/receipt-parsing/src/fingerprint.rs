use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Content fingerprint, the stable layout from §6:
/// `sha256(amount_abs_decimal_string + "|" + YYYY-MM-DD + " " + HH:MM + "|" + last4)`.
/// Grounded on the fingerprint call site in
/// `original_source/backend/services/receipt_processor.py` (the original
/// computes the equivalent dedup key inline before the insert).
pub fn compute(amount_abs: Decimal, minute_truncated: NaiveDateTime, card_last_4: Option<&str>) -> String {
    let last4 = card_last_4.filter(|s| !s.is_empty()).unwrap_or("0000");
    let minute = minute_truncated.format("%Y-%m-%d %H:%M");
    let payload = format!("{amount_abs}|{minute}|{last4}");

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn stable_for_identical_inputs() {
        let a = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:00"), Some("6905"));
        let b = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:30"), Some("6905"));
        assert_eq!(a, b, "seconds component must not affect the fingerprint");
    }

    #[test]
    fn differs_when_amount_changes() {
        let a = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:00"), Some("6905"));
        let b = compute(Decimal::from_str("400000.01").unwrap(), dt("2025-04-05 12:58:00"), Some("6905"));
        assert_ne!(a, b);
    }

    #[test]
    fn differs_when_minute_changes() {
        let a = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:00"), Some("6905"));
        let b = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:59:00"), Some("6905"));
        assert_ne!(a, b);
    }

    #[test]
    fn differs_when_card_changes() {
        let a = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:00"), Some("6905"));
        let b = compute(Decimal::from_str("400000.00").unwrap(), dt("2025-04-05 12:58:00"), Some("0907"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_card_falls_back_to_zeros() {
        let a = compute(Decimal::from_str("100.00").unwrap(), dt("2025-01-01 00:00:00"), None);
        let b = compute(Decimal::from_str("100.00").unwrap(), dt("2025-01-01 00:00:00"), Some("0000"));
        assert_eq!(a, b);
    }
}
