use std::sync::Mutex;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info};

use receipt_parsing::llm::LlmProvider;

use crate::db;
use crate::error::ResolverError;
use crate::normalize::normalize_operator;
use crate::types::{
    CachedMapping, CandidateExample, DictionaryMatch, MatchType, ResolveOutcome, SuggestedReference,
};

const CANDIDATE_LIMIT: usize = 10;

/// Normalized-string matcher against the dictionary, falling back to a
/// language model when no match is found. Match algorithm and candidate
/// scoring follow `operator_mapper.py::OperatorMapper` almost verbatim.
pub struct OperatorResolver {
    conn: Mutex<Connection>,
    cache: Mutex<Vec<CachedMapping>>,
    model_confidence_threshold: f64,
}

impl OperatorResolver {
    pub fn new(conn: Connection, model_confidence_threshold: f64) -> Result<Self, ResolverError> {
        db::init_schema(&conn)?;
        let resolver = Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(Vec::new()),
            model_confidence_threshold,
        };
        resolver.refresh_cache()?;
        Ok(resolver)
    }

    /// Reload the cache from `operator_reference` (active rows only).
    pub fn refresh_cache(&self) -> Result<(), ResolverError> {
        let conn = self.conn.lock().expect("resolver mutex poisoned");
        let rows = db::list_active(&conn)?;
        let mapped = rows
            .into_iter()
            .filter(|r| !r.operator_name.is_empty() && !r.application_name.is_empty())
            .map(|r| CachedMapping {
                reference_id: r.id,
                normalized_pattern: normalize_operator(&r.operator_name),
                application_name: r.application_name,
                is_p2p: r.is_p2p,
            })
            .collect();
        *self.cache.lock().expect("resolver cache mutex poisoned") = mapped;
        Ok(())
    }

    /// Exact normalized match first; else the substring pattern of
    /// greatest length contained in the input, ties broken by reference id.
    pub fn match_dictionary(&self, operator_raw: &str) -> Option<DictionaryMatch> {
        let normalized_input = normalize_operator(operator_raw);
        if normalized_input.is_empty() {
            return None;
        }

        let cache = self.cache.lock().expect("resolver cache mutex poisoned");

        if let Some(exact) = cache.iter().find(|m| m.normalized_pattern == normalized_input) {
            return Some(DictionaryMatch {
                reference_id: exact.reference_id,
                matched_operator_name: exact.normalized_pattern.clone(),
                application_name: exact.application_name.clone(),
                is_p2p: exact.is_p2p,
                match_type: MatchType::Exact,
            });
        }

        let mut best: Option<&CachedMapping> = None;
        let mut best_len = -1i64;
        for mapping in cache.iter() {
            if mapping.normalized_pattern.is_empty() {
                continue;
            }
            if normalized_input.contains(&mapping.normalized_pattern) {
                let len = mapping.normalized_pattern.len() as i64;
                let better = match best {
                    None => true,
                    Some(current) => {
                        len > best_len
                            || (len == best_len && mapping.reference_id < current.reference_id)
                    }
                };
                if better {
                    best = Some(mapping);
                    best_len = len;
                }
            }
        }

        best.map(|m| DictionaryMatch {
            reference_id: m.reference_id,
            matched_operator_name: m.normalized_pattern.clone(),
            application_name: m.application_name.clone(),
            is_p2p: m.is_p2p,
            match_type: MatchType::Substring,
        })
    }

    /// Top-N similar reference rows for model hinting: substring + token
    /// overlap score, grounded verbatim on
    /// `operator_mapper.py::get_candidate_examples`.
    pub fn candidate_examples(&self, operator_raw: &str, limit: usize) -> Vec<CandidateExample> {
        let normalized_input = normalize_operator(operator_raw);
        if normalized_input.is_empty() {
            return Vec::new();
        }
        let input_tokens: std::collections::HashSet<&str> = normalized_input.split(' ').collect();

        let cache = self.cache.lock().expect("resolver cache mutex poisoned");
        let mut scored: Vec<(f64, &CachedMapping)> = Vec::new();

        for mapping in cache.iter() {
            if mapping.normalized_pattern.is_empty() {
                continue;
            }
            let mut score = 0.0;
            if mapping.normalized_pattern == normalized_input {
                score += 100.0;
            }
            if mapping.normalized_pattern.contains(&normalized_input)
                || normalized_input.contains(&mapping.normalized_pattern)
            {
                score += mapping.normalized_pattern.len() as f64;
            }
            let pattern_tokens: std::collections::HashSet<&str> =
                mapping.normalized_pattern.split(' ').collect();
            let overlap = input_tokens.intersection(&pattern_tokens).count();
            score += overlap as f64 * 5.0;

            if score > 0.0 {
                scored.push((score, mapping));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap()
                .then_with(|| b.1.normalized_pattern.len().cmp(&a.1.normalized_pattern.len()))
                .then_with(|| a.1.reference_id.cmp(&b.1.reference_id))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(score, m)| CandidateExample {
                reference_id: m.reference_id,
                matched_operator_name: m.normalized_pattern.clone(),
                application_name: m.application_name.clone(),
                is_p2p: m.is_p2p,
                score,
            })
            .collect()
    }

    pub fn known_applications(&self) -> Vec<String> {
        let cache = self.cache.lock().expect("resolver cache mutex poisoned");
        let mut apps: Vec<String> = cache
            .iter()
            .map(|m| m.application_name.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        apps.sort();
        apps
    }

    /// Full resolution: dictionary match, else model fallback (when
    /// `model` is `Some`), else the `"P2P" in operator_upper` heuristic.
    /// Accepts the model's answer only when `application != "Unknown"`
    /// AND `confidence >= model_confidence_threshold` (default 0.75).
    pub async fn resolve(
        &self,
        operator_raw: &str,
        receipt_text_masked: &str,
        model: Option<&dyn LlmProvider>,
    ) -> Result<ResolveOutcome, ResolverError> {
        if let Some(hit) = self.match_dictionary(operator_raw) {
            debug!(operator_raw, application = %hit.application_name, "dictionary hit");
            return Ok(ResolveOutcome {
                application_mapped: Some(hit.application_name),
                is_p2p: hit.is_p2p,
                suggested_reference: None,
            });
        }

        if let Some(model) = model {
            let hints = self.candidate_examples(operator_raw, CANDIDATE_LIMIT);
            let known_apps = self.known_applications();
            match self
                .ask_model(model, operator_raw, receipt_text_masked, &known_apps, &hints)
                .await
            {
                Ok(Some(answer)) if answer.application_name != "Unknown"
                    && answer.confidence >= self.model_confidence_threshold =>
                {
                    let suggested = answer.recommended_operator_name.as_ref().map(|name| {
                        SuggestedReference {
                            operator_name: name.clone(),
                            application_name: answer.application_name.clone(),
                            is_p2p: answer.is_p2p,
                        }
                    });
                    if let Some(suggestion) = &suggested {
                        let conn = self.conn.lock().expect("resolver mutex poisoned");
                        match db::insert_suggestion(
                            &conn,
                            &suggestion.operator_name,
                            &suggestion.application_name,
                            suggestion.is_p2p,
                        ) {
                            Ok(true) => info!(operator = %suggestion.operator_name, "model suggested new inactive dictionary row"),
                            Ok(false) => {}
                            Err(e) => tracing::warn!(error = %e, "failed to persist model suggestion"),
                        }
                    }
                    return Ok(ResolveOutcome {
                        application_mapped: Some(answer.application_name),
                        is_p2p: answer.is_p2p,
                        suggested_reference: suggested,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "resolver model call failed, falling back to heuristic"),
            }
        }

        Ok(ResolveOutcome {
            application_mapped: None,
            is_p2p: operator_raw.to_uppercase().contains("P2P"),
            suggested_reference: None,
        })
    }

    async fn ask_model(
        &self,
        model: &dyn LlmProvider,
        operator_raw: &str,
        receipt_text_masked: &str,
        known_apps: &[String],
        hints: &[CandidateExample],
    ) -> Result<Option<ModelAnswer>, ResolverError> {
        const SYSTEM_PROMPT: &str = "You map merchant/operator strings to known applications and P2P \
status. P2P means person-to-person transfers, card-to-card, or wallet-to-wallet between individuals. \
If the operator clearly indicates transfers between people, set is_p2p=true. If it is a \
merchant/shop/service/provider, set is_p2p=false. Choose application_name from the provided known list \
if any matches well; if none fit, return 'Unknown'. Only invent a new application_name if the operator \
obviously represents a different app. Return ONLY a JSON object with keys: application_name, is_p2p, \
confidence, recommended_operator_name, reasoning.";

        let mut lines = vec![
            format!("Operator raw: {operator_raw}"),
            format!(
                "Known applications: {}",
                if known_apps.is_empty() {
                    "[]".to_string()
                } else {
                    known_apps.join(", ")
                }
            ),
        ];
        if !hints.is_empty() {
            lines.push("Dictionary hints:".to_string());
            for hint in hints {
                lines.push(format!(
                    "- {} -> {} (p2p={})",
                    hint.matched_operator_name, hint.application_name, hint.is_p2p
                ));
            }
        }
        let truncated_text: String = receipt_text_masked.chars().take(4000).collect();
        if !truncated_text.is_empty() {
            lines.push("Receipt text (masked):".to_string());
            lines.push(truncated_text);
        }
        let user = lines.join("\n");

        let reply = model
            .complete_json(SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| ResolverError::Provider(e.to_string()))?;

        Ok(extract_json(&reply))
    }
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    application_name: String,
    is_p2p: bool,
    confidence: f64,
    recommended_operator_name: Option<String>,
    #[allow(dead_code)]
    reasoning: Option<String>,
}

fn extract_json(content: &str) -> Option<ModelAnswer> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_resolver() -> OperatorResolver {
        let conn = Connection::open_in_memory().unwrap();
        OperatorResolver::new(conn, 0.75).unwrap()
    }

    fn seed(resolver: &OperatorResolver, operator: &str, app: &str) {
        let conn = resolver.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO operator_reference (operator_name, application_name, is_p2p, is_active) VALUES (?1, ?2, 0, 1)",
            rusqlite::params![operator, app],
        )
        .unwrap();
        drop(conn);
        resolver.refresh_cache().unwrap();
    }

    #[test]
    fn longest_substring_wins() {
        let resolver = fresh_resolver();
        seed(&resolver, "PAY", "Generic");
        seed(&resolver, "PAYNET", "PaynetApp");
        seed(&resolver, "PAYNET HUMO", "PaynetHumo");

        let hit = resolver.match_dictionary("PAYNET HUMO2UZC").unwrap();
        assert_eq!(hit.application_name, "PaynetHumo");
    }

    #[test]
    fn exact_match_beats_substring() {
        let resolver = fresh_resolver();
        seed(&resolver, "CLICK", "Click");
        let hit = resolver.match_dictionary("click").unwrap();
        assert_eq!(hit.match_type, MatchType::Exact);
    }

    #[test]
    fn unknown_operator_with_no_model_returns_none() {
        let resolver = fresh_resolver();
        seed(&resolver, "CLICK", "Click");
        assert!(resolver.match_dictionary("UNKNOWN X").is_none());
    }
}
