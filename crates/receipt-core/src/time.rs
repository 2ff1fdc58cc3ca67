use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Convert a UTC instant to naive-local wall-clock time in `zone`, the way
/// every persisted timestamp in this pipeline is stored: naive-local in
/// one configured zone, never with an embedded offset.
pub fn to_naive_local(instant: DateTime<Utc>, zone: Tz) -> NaiveDateTime {
    instant.with_timezone(&zone).naive_local()
}

/// Interpret a wall-clock date/time as already being local to `zone` and
/// return the naive value unchanged (this is what the regex/LLM parsers
/// produce directly: a local date/time string with no embedded offset).
pub fn localize_naive(naive: NaiveDateTime, _zone: Tz) -> NaiveDateTime {
    naive
}

/// Parse a configured zone name (e.g. `Asia/Tashkent`), falling back to UTC
/// only if the name cannot be resolved — callers should treat that as a
/// configuration error, not silently continue.
pub fn parse_zone(name: &str) -> Option<Tz> {
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_zone() {
        assert!(parse_zone("Asia/Tashkent").is_some());
    }

    #[test]
    fn rejects_unknown_zone() {
        assert!(parse_zone("Not/AZone").is_none());
    }
}
