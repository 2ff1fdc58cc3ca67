use once_cell::sync::Lazy;
use regex::Regex;

/// Uppercase, collapse whitespace, drop any character outside `[A-Z0-9 ]`.
/// Grounded verbatim on
/// `original_source/backend/parsers/operator_mapper.py::normalize_operator`.
pub fn normalize_operator(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Z0-9 ]").unwrap());
    static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let upper = value.to_uppercase();
    let collapsed = WHITESPACE.replace_all(&upper, " ");
    let stripped = NON_ALNUM.replace_all(&collapsed, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_strips_punctuation() {
        assert_eq!(normalize_operator("  oq   p2p>tashkent  "), "OQ P2P TASHKENT");
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(normalize_operator(""), "");
    }
}
