use serde::Deserialize;

use super::MultiQueryError;

/// Bounds on the number of queries a single generator batch may hold.
pub const MIN_SUBQUERIES: usize = 2;
pub const MAX_SUBQUERIES: usize = 4;

/// One search query per analytical lens, in fixed order.
#[derive(Debug, Deserialize)]
pub struct AspectQueries {
    pub technical: String,
    pub safety: String,
    pub contractual: String,
    pub schedule: String,
}

impl AspectQueries {
    pub const LABELS: [&'static str; 4] = ["technical", "safety", "contractual", "schedule"];

    /// Parse a model response against the four-field schema.
    pub fn parse(text: &str) -> Result<Self, MultiQueryError> {
        let raw = extract_json(text)
            .ok_or_else(|| MultiQueryError::malformed("decomposition", "no JSON object found"))?;
        let parsed: Self = serde_json::from_str(raw)
            .map_err(|e| MultiQueryError::malformed("decomposition", e.to_string()))?;
        for (label, value) in Self::LABELS.iter().zip(parsed.as_list()) {
            if value.trim().is_empty() {
                return Err(MultiQueryError::malformed(
                    "decomposition",
                    format!("empty query for aspect '{label}'"),
                ));
            }
        }
        Ok(parsed)
    }

    fn as_list(&self) -> [&String; 4] {
        [
            &self.technical,
            &self.safety,
            &self.contractual,
            &self.schedule,
        ]
    }

    /// Aspect queries in fixed label order.
    pub fn into_list(self) -> Vec<String> {
        vec![self.technical, self.safety, self.contractual, self.schedule]
    }
}

/// An ordered batch of generated search queries for one aspect.
#[derive(Debug, Deserialize)]
pub struct SubQueries {
    pub queries: Vec<String>,
}

impl SubQueries {
    /// Parse a model response and enforce the batch bounds.
    pub fn parse(text: &str) -> Result<Vec<String>, MultiQueryError> {
        let raw = extract_json(text)
            .ok_or_else(|| MultiQueryError::malformed("sub-query generation", "no JSON object found"))?;
        let parsed: Self = serde_json::from_str(raw)
            .map_err(|e| MultiQueryError::malformed("sub-query generation", e.to_string()))?;
        let count = parsed.queries.len();
        if !(MIN_SUBQUERIES..=MAX_SUBQUERIES).contains(&count) {
            return Err(MultiQueryError::malformed(
                "sub-query generation",
                format!("expected {MIN_SUBQUERIES}-{MAX_SUBQUERIES} queries, got {count}"),
            ));
        }
        if parsed.queries.iter().any(|q| q.trim().is_empty()) {
            return Err(MultiQueryError::malformed(
                "sub-query generation",
                "empty query in batch",
            ));
        }
        Ok(parsed.queries)
    }
}

/// Locate the JSON object in a free-form model response.
/// Tolerates fenced code blocks and surrounding prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
