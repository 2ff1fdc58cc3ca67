use once_cell::sync::Lazy;
use receipt_core::types::ChatKind;

use crate::monitor::MonitoredChat;

/// Default keyword set the group-chat gate falls back to: currency codes,
/// bank/wallet names, and "payment" in Russian/Uzbek/English. Grounded on
/// `original_source/backend/services/tg_auto_monitor_service.py`'s message
/// filter.
static DEFAULT_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "uzs", "usd", "eur", "humo", "uzcard", "visa", "mastercard", "click", "payme", "paynet",
        "apelsin", "oplata", "platezh", "pokupka", "popolnenie", "perevod", "to'lov", "to'lov",
        "pul", "chek", "kvitansiya", "payment", "receipt", "transfer",
    ]
});

const MIN_GROUP_TEXT_LEN: usize = 20;

/// Evaluate whether a candidate message should be enqueued. Attached PDF
/// always passes; otherwise applies the length/keyword gates from
/// §4.3. `text` and `has_pdf` describe the candidate message; `chat_kind`
/// and `monitor` describe the chat it arrived in.
pub fn should_process(
    text: &str,
    has_pdf: bool,
    chat_kind: ChatKind,
    monitor: &MonitoredChat,
) -> bool {
    if has_pdf {
        return true;
    }

    if text.trim().is_empty() {
        return false;
    }

    let is_group = chat_kind.is_group_style();
    if is_group && text.chars().count() < MIN_GROUP_TEXT_LEN {
        return false;
    }

    let custom_keywords = parse_keywords(monitor.filter_keywords.as_deref());
    let lower = text.to_lowercase();
    let custom_hit = custom_keywords.iter().any(|k| lower.contains(k.as_str()));
    let default_or_private = !is_group || default_keyword_hit(&lower);

    use receipt_core::types::FilterMode;
    match monitor.filter_mode {
        FilterMode::Whitelist => custom_hit && default_or_private,
        FilterMode::Blacklist => {
            if custom_hit {
                false
            } else {
                default_or_private
            }
        }
        FilterMode::All => {
            if custom_keywords.is_empty() {
                default_or_private
            } else {
                custom_hit || default_or_private
            }
        }
    }
}

fn default_keyword_hit(lower_text: &str) -> bool {
    DEFAULT_KEYWORDS.iter().any(|k| lower_text.contains(k))
}

/// Keywords parse as a JSON array first, falling back to a comma-separated
/// split, per §4.3.
fn parse_keywords(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list.into_iter().map(|s| s.to_lowercase()).collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipt_core::types::FilterMode;

    fn monitor(mode: FilterMode, keywords: Option<&str>) -> MonitoredChat {
        MonitoredChat {
            chat_id: receipt_core::types::ChatId(1),
            enabled: true,
            last_processed_message_id: 0,
            chat_type: "group".into(),
            filter_mode: mode,
            filter_keywords: keywords.map(|s| s.to_string()),
            chat_title: None,
            last_error: None,
        }
    }

    #[test]
    fn pdf_always_accepted() {
        let m = monitor(FilterMode::Blacklist, Some("[\"anything\"]"));
        assert!(should_process("", true, ChatKind::Group, &m));
    }

    #[test]
    fn empty_text_rejected() {
        let m = monitor(FilterMode::All, None);
        assert!(!should_process("", false, ChatKind::User, &m));
    }

    #[test]
    fn short_group_text_rejected() {
        let m = monitor(FilterMode::All, None);
        assert!(!should_process("short msg", false, ChatKind::Group, &m));
    }

    #[test]
    fn whitelist_with_no_keywords_always_false() {
        let m = monitor(FilterMode::Whitelist, None);
        assert!(!should_process(
            "a payment of 100000 UZS was made today at noon",
            false,
            ChatKind::Group,
            &m
        ));
    }

    #[test]
    fn blacklist_with_no_keywords_reduces_to_default() {
        let m = monitor(FilterMode::Blacklist, None);
        assert!(should_process(
            "a payment of 100000 UZS was made today at noon",
            false,
            ChatKind::Group,
            &m
        ));
    }

    #[test]
    fn private_chat_skips_default_keyword_gate() {
        let m = monitor(FilterMode::All, None);
        assert!(should_process(
            "this is just a long enough private message",
            false,
            ChatKind::User,
            &m
        ));
    }

    #[test]
    fn blacklist_keyword_hit_rejects() {
        let m = monitor(FilterMode::Blacklist, Some("spam"));
        assert!(!should_process(
            "this is spam about a UZS payment today",
            false,
            ChatKind::Group,
            &m
        ));
    }
}
