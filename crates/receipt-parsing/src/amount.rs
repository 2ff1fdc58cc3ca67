use std::str::FromStr;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ParsingError;

/// Normalize an amount string to a fixed-precision `Decimal`, never a
/// binary float (§9). Grounded verbatim on
/// `original_source/backend/parsers/regex_parser.py::normalize_amount`:
/// strip non-breaking spaces and plain spaces; if both `.` and `,` are
/// present treat `.` as a thousands separator; if only `,` is present
/// treat it as the decimal point; collapse a stray extra `.` by joining
/// every part but the last.
pub fn normalize_amount(raw: &str) -> Result<Decimal, ParsingError> {
    let mut cleaned = raw.trim().replace('\u{00a0}', "");
    cleaned = cleaned.replace(' ', "");

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');

    if has_dot && has_comma {
        cleaned = cleaned.replace('.', "");
        cleaned = cleaned.replace(',', ".");
    } else if has_comma {
        cleaned = cleaned.replace(',', ".");
    }

    let cleaned: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let dot_count = cleaned.matches('.').count();
    let cleaned = if dot_count > 1 {
        let parts: Vec<&str> = cleaned.split('.').collect();
        let (last, rest) = parts.split_last().expect("dot_count > 1 implies >= 2 parts");
        format!("{}.{}", rest.concat(), last)
    } else {
        cleaned
    };

    if cleaned.is_empty() || cleaned == "." {
        return Err(ParsingError::InvalidAmount(raw.to_string()));
    }

    Decimal::from_str(&cleaned).map_err(|e| ParsingError::InvalidAmount(format!("{raw}: {e}")))
}

static CARD_LAST4_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\*+(\d{4})").unwrap(),
        Regex::new(r"\d+\*+(\d{4})").unwrap(),
        Regex::new(r"\d+\*+\d*(\d{4})").unwrap(),
    ]
});

/// Last 4 digits of a masked card number, tried against the mask shapes
/// `***4862`, `479091**6905`, `532154**1744`, in that order.
pub fn extract_card_last4(text: &str) -> Option<String> {
    for pattern in CARD_LAST4_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            return Some(caps.get(1).unwrap().as_str().to_string());
        }
    }
    None
}

/// `DD.MM.YY[YY] HH:MM` (or the reverse ordering, with `date_str`/`time_str`
/// already split by the caller).
pub fn parse_date_standard(date_str: &str, time_str: &str) -> Result<NaiveDateTime, ParsingError> {
    let parts: Vec<&str> = date_str.split('.').collect();
    if parts.len() != 3 {
        return Err(ParsingError::InvalidDate(date_str.to_string()));
    }
    let year = if parts[2].len() == 2 {
        format!("20{}", parts[2])
    } else {
        parts[2].to_string()
    };
    let combined = format!("{}.{}.{} {}", parts[0], parts[1], year, time_str);
    NaiveDateTime::parse_from_str(&combined, "%d.%m.%Y %H:%M")
        .map_err(|e| ParsingError::InvalidDate(format!("{combined}: {e}")))
}

/// `YY-MM-DD HH:MM`, the semicolon-delimited dialect's timestamp shape.
pub fn parse_date_semicolon(
    year2: &str,
    month: &str,
    day: &str,
    time_str: &str,
) -> Result<NaiveDateTime, ParsingError> {
    let combined = format!("20{year2}-{month}-{day} {time_str}");
    NaiveDateTime::parse_from_str(&combined, "%Y-%m-%d %H:%M")
        .map_err(|e| ParsingError::InvalidDate(format!("{combined}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_dot_decimal_comma() {
        assert_eq!(
            normalize_amount("6.935.000,00").unwrap(),
            Decimal::from_str("6935000.00").unwrap()
        );
    }

    #[test]
    fn thousands_space_decimal_comma() {
        assert_eq!(
            normalize_amount("2 052 200,14").unwrap(),
            Decimal::from_str("2052200.14").unwrap()
        );
    }

    #[test]
    fn thousands_space_decimal_dot() {
        assert_eq!(
            normalize_amount("351 750.00").unwrap(),
            Decimal::from_str("351750.00").unwrap()
        );
    }

    #[test]
    fn rejects_empty() {
        assert!(normalize_amount("   ").is_err());
    }

    #[test]
    fn card_last4_three_shapes() {
        assert_eq!(extract_card_last4("***4862").as_deref(), Some("4862"));
        assert_eq!(extract_card_last4("479091**6905").as_deref(), Some("6905"));
        assert_eq!(extract_card_last4("532154**1744").as_deref(), Some("1744"));
    }

    #[test]
    fn standard_date_two_digit_year() {
        let dt = parse_date_standard("05.04.25", "12:58").unwrap();
        assert_eq!(dt.to_string(), "2025-04-05 12:58:00");
    }

    #[test]
    fn semicolon_date() {
        let dt = parse_date_semicolon("25", "04", "05", "12:58").unwrap();
        assert_eq!(dt.to_string(), "2025-04-05 12:58:00");
    }
}
