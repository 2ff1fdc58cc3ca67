/// Dictionary row. Grounded on `models.py::OperatorReference`.
#[derive(Debug, Clone)]
pub struct OperatorReference {
    pub id: i64,
    pub operator_name: String,
    pub application_name: String,
    pub is_p2p: bool,
    pub is_active: bool,
}

/// One cached, pre-normalized mapping entry. Cache layout mirrors
/// `OperatorMapper.mappings_cache`'s `(id, operator_name_normalized,
/// application_name, is_p2p)` tuple.
#[derive(Debug, Clone)]
pub(crate) struct CachedMapping {
    pub reference_id: i64,
    pub normalized_pattern: String,
    pub application_name: String,
    pub is_p2p: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Substring,
}

/// Result of a successful dictionary match.
#[derive(Debug, Clone)]
pub struct DictionaryMatch {
    pub reference_id: i64,
    pub matched_operator_name: String,
    pub application_name: String,
    pub is_p2p: bool,
    pub match_type: MatchType,
}

/// A dictionary row offered as a hint to the model fallback, scored by
/// `candidate_examples`'s substring + token-overlap formula.
#[derive(Debug, Clone)]
pub struct CandidateExample {
    pub reference_id: i64,
    pub matched_operator_name: String,
    pub application_name: String,
    pub is_p2p: bool,
    pub score: f64,
}

/// Final resolution outcome the worker consumes, per §4.6's
/// dictionary -> model -> heuristic order.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub application_mapped: Option<String>,
    pub is_p2p: bool,
    /// Set when the model suggested a new dictionary row; the pipeline
    /// inserts it `is_active=false` for human review (§4.6's side
    /// effect), never touching the active dictionary automatically.
    pub suggested_reference: Option<SuggestedReference>,
}

#[derive(Debug, Clone)]
pub struct SuggestedReference {
    pub operator_name: String,
    pub application_name: String,
    pub is_p2p: bool,
}
