use std::collections::HashSet;

/// Hard cap on the final query list.
pub const MAX_QUERIES: usize = 10;
/// Padding target when sub-queries exist but the union came up short.
pub const MIN_QUERIES: usize = 5;
/// At most this many adjacent-pair conjunctions.
const MAX_PAIRS: usize = 3;

const RELATED_PREFIX: &str = "related document: ";

/// Conjoin adjacent sub-queries: up to `MAX_PAIRS` pairs of
/// `expanded[i] AND expanded[i+1]` in generation order.
pub fn combine_adjacent(expanded: &[String]) -> Vec<String> {
    if expanded.len() < 2 {
        return Vec::new();
    }
    let pairs = MAX_PAIRS.min(expanded.len() - 1);
    (0..pairs)
        .map(|i| format!("{} AND {}", expanded[i], expanded[i + 1]))
        .collect()
}

/// Assemble the final query list: original question, then expanded, then
/// combined; first-occurrence dedup; cap at `MAX_QUERIES`. When fewer than
/// `MIN_QUERIES` remain and sub-queries exist, pad with `related document:`
/// variants cycling over the expanded list (no re-dedup after padding).
pub fn assemble(original: &str, expanded: &[String], combined: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    let union = std::iter::once(original)
        .chain(expanded.iter().map(String::as_str))
        .chain(combined.iter().map(String::as_str));
    for query in union {
        if seen.insert(query) {
            queries.push(query.to_string());
        }
    }
    queries.truncate(MAX_QUERIES);

    while queries.len() < MIN_QUERIES && !expanded.is_empty() {
        let next = &expanded[queries.len() % expanded.len()];
        queries.push(format!("{RELATED_PREFIX}{next}"));
    }

    queries.truncate(MAX_QUERIES);
    queries
}
