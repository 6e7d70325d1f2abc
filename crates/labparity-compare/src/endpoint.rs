//! Endpoint comparison engine.
//!
//! Fetches every configured relative endpoint from a baseline app and a
//! target app, then diffs each pair with [`compare_payloads`]. Fetch
//! failures are tracked per side and never abort the remaining endpoints.

use crate::fetch::JsonSource;
use crate::payload::{PayloadDiff, PayloadVerdict, RowDelta, compare_payloads};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// The app's public read APIs compared when no override is configured.
pub const DEFAULT_COMPARE_ENDPOINTS: [&str; 4] = [
    "/api/moods/all",
    "/api/journal/entries/all",
    "/api/stats/overview",
    "/api/server/values/all",
];

/// Outcome for one relative endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointOutcome {
    Match,
    /// At least one side failed to fetch or decode. Errors are independent:
    /// exactly the failing side(s) carry a message.
    Error {
        baseline_error: Option<String>,
        target_error: Option<String>,
    },
    Mismatch(PayloadDiff),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub endpoint: String,
    pub outcome: EndpointOutcome,
}

impl EndpointResult {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, EndpointOutcome::Match)
    }

    pub fn status(&self) -> &'static str {
        match self.outcome {
            EndpointOutcome::Match => "match",
            EndpointOutcome::Error { .. } => "error",
            EndpointOutcome::Mismatch(_) => "mismatch",
        }
    }
}

#[derive(Serialize)]
struct ValueDiffView<'a> {
    baseline: &'a Value,
    target: &'a Value,
}

impl Serialize for EndpointResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("endpoint", &self.endpoint)?;
        map.serialize_entry("status", self.status())?;
        match &self.outcome {
            EndpointOutcome::Match => {}
            EndpointOutcome::Error {
                baseline_error,
                target_error,
            } => {
                map.serialize_entry("baseline_error", baseline_error)?;
                map.serialize_entry("target_error", target_error)?;
            }
            EndpointOutcome::Mismatch(PayloadDiff::Rows { missing, extra }) => {
                map.serialize_entry("missing", missing)?;
                map.serialize_entry("extra", extra)?;
                map.serialize_entry("missing_count", &missing.len())?;
                map.serialize_entry("extra_count", &extra.len())?;
            }
            EndpointOutcome::Mismatch(PayloadDiff::Value { baseline, target }) => {
                map.serialize_entry("detail", &ValueDiffView { baseline, target })?;
            }
        }
        map.end()
    }
}

/// Verdict for one (baseline, target) pair across all endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonVerdict {
    pub ok: bool,
    pub results: Vec<EndpointResult>,
}

impl ComparisonVerdict {
    pub fn mismatched(&self) -> impl Iterator<Item = &EndpointResult> {
        self.results.iter().filter(|r| !r.is_match())
    }
}

/// Parse a comma-separated endpoint override; empty or missing input means
/// the default endpoint set.
pub fn parse_endpoints(raw: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if parsed.is_empty() {
        DEFAULT_COMPARE_ENDPOINTS
            .iter()
            .map(|e| e.to_string())
            .collect()
    } else {
        parsed
    }
}

pub fn normalize_base_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

/// Trim and force a leading slash; blank entries yield `None`.
pub fn normalize_endpoint(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Compare every endpoint between `baseline_base_url` and `target_base_url`.
///
/// `ok` is true iff every endpoint matched. No retries happen here.
pub fn compare_endpoints<S>(
    source: &S,
    baseline_base_url: &str,
    target_base_url: &str,
    endpoints: &[String],
) -> ComparisonVerdict
where
    S: JsonSource + ?Sized,
{
    let baseline_base = normalize_base_url(baseline_base_url);
    let target_base = normalize_base_url(target_base_url);
    let mut results = Vec::with_capacity(endpoints.len());

    for raw in endpoints {
        let Some(endpoint) = normalize_endpoint(raw) else {
            continue;
        };
        let baseline = source.fetch_json(&format!("{baseline_base}{endpoint}"));
        let target = source.fetch_json(&format!("{target_base}{endpoint}"));

        let outcome = match (baseline, target) {
            (Ok(baseline), Ok(target)) => match compare_payloads(&baseline, &target) {
                PayloadVerdict::Equal => EndpointOutcome::Match,
                PayloadVerdict::Mismatch(diff) => EndpointOutcome::Mismatch(diff),
            },
            (baseline, target) => EndpointOutcome::Error {
                baseline_error: baseline.err().map(|e| e.to_string()),
                target_error: target.err().map(|e| e.to_string()),
            },
        };

        let result = EndpointResult { endpoint, outcome };
        debug!(
            endpoint = %result.endpoint,
            status = result.status(),
            target_url = target_base,
            "endpoint compared"
        );
        results.push(result);
    }

    ComparisonVerdict {
        ok: results.iter().all(EndpointResult::is_match),
        results,
    }
}

/// Row deltas of a mismatch, if it was a row-set mismatch.
pub fn row_deltas(result: &EndpointResult) -> Option<(&[RowDelta], &[RowDelta])> {
    match &result.outcome {
        EndpointOutcome::Mismatch(PayloadDiff::Rows { missing, extra }) => {
            Some((missing.as_slice(), extra.as_slice()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct StaticSource {
        responses: BTreeMap<String, Value>,
    }

    impl StaticSource {
        fn new(pairs: &[(&str, Value)]) -> Self {
            Self {
                responses: pairs
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.clone()))
                    .collect(),
            }
        }
    }

    impl JsonSource for StaticSource {
        fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Transport(format!("connection refused: {url}")))
        }
    }

    #[test]
    fn parse_endpoints_defaults_when_blank() {
        assert_eq!(parse_endpoints(None).len(), 4);
        assert_eq!(parse_endpoints(Some(" , ")).len(), 4);
        assert_eq!(
            parse_endpoints(Some("/a, b ,,")),
            vec!["/a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn normalize_endpoint_enforces_leading_slash() {
        assert_eq!(normalize_endpoint("api/x"), Some("/api/x".to_string()));
        assert_eq!(normalize_endpoint(" /api/x "), Some("/api/x".to_string()));
        assert_eq!(normalize_endpoint("   "), None);
    }

    #[test]
    fn base_urls_lose_trailing_slashes() {
        let source = StaticSource::new(&[
            ("http://base/api/x", json!({"rows": []})),
            ("http://target/api/x", json!({"rows": []})),
        ]);
        let verdict = compare_endpoints(
            &source,
            "http://base/",
            "http://target//",
            &["api/x".to_string(), "  ".to_string()],
        );
        assert!(verdict.ok);
        assert_eq!(verdict.results.len(), 1);
        assert_eq!(verdict.results[0].endpoint, "/api/x");
    }

    #[test]
    fn one_failing_side_does_not_hide_other_endpoints() {
        let source = StaticSource::new(&[
            ("http://base/a", json!({"rows": [1]})),
            ("http://base/b", json!({"v": 1})),
            ("http://target/b", json!({"v": 1})),
        ]);
        let verdict = compare_endpoints(
            &source,
            "http://base",
            "http://target",
            &["/a".to_string(), "/b".to_string()],
        );
        assert!(!verdict.ok);
        match &verdict.results[0].outcome {
            EndpointOutcome::Error {
                baseline_error,
                target_error,
            } => {
                assert!(baseline_error.is_none());
                assert!(
                    target_error
                        .as_deref()
                        .is_some_and(|e| e.contains("connection refused"))
                );
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
        assert!(verdict.results[1].is_match());
        assert_eq!(verdict.mismatched().count(), 1);
    }

    #[test]
    fn row_mismatch_exposes_row_deltas() {
        let source = StaticSource::new(&[
            ("http://base/r", json!({"rows": [{"id": 1}]})),
            ("http://target/r", json!({"rows": []})),
        ]);
        let verdict =
            compare_endpoints(&source, "http://base", "http://target", &["/r".to_string()]);
        let (missing, extra) = row_deltas(&verdict.results[0]).expect("row mismatch");
        assert_eq!(missing, &[RowDelta(r#"{"id":1}"#.to_string(), 1)]);
        assert!(extra.is_empty());
    }
}
