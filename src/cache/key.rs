//! Deterministic cache keys.

use crate::backend::Params;

/// Build the cache key for a query: `action:k1=v1&k2=v2` with params sorted
/// by name and values rendered as JSON, so parameter order never matters.
pub fn cache_key(action: &str, params: &Params) -> String {
  let mut pairs: Vec<_> = params.iter().collect();
  pairs.sort_by(|a, b| a.0.cmp(b.0));

  let query = pairs
    .iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join("&");
  format!("{}:{}", action, query)
}

/// Does `key` belong to the resource named by `prefix_or_key`?
///
/// An action name matches every key built from it; a full key matches itself.
pub fn key_matches(key: &str, prefix_or_key: &str) -> bool {
  key == prefix_or_key
    || key
      .strip_prefix(prefix_or_key)
      .is_some_and(|rest| rest.starts_with(':'))
}
