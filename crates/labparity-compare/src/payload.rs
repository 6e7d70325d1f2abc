//! Payload comparison: row-set multiset diff with a canonical-value fallback.

use crate::canonical::{canonical_text, canonicalize};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One distinct row key and how many copies are short (missing) or surplus
/// (extra) on the target side. Serializes as `[key, count]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDelta(pub String, pub usize);

impl RowDelta {
    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn count(&self) -> usize {
        self.1
    }
}

/// Why two payloads were judged different.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadDiff {
    /// Both payloads carried a `rows` array; the multisets differ.
    Rows {
        missing: Vec<RowDelta>,
        extra: Vec<RowDelta>,
    },
    /// Whole-payload comparison failed; both canonical values are kept.
    Value { baseline: Value, target: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadVerdict {
    Equal,
    Mismatch(PayloadDiff),
}

impl PayloadVerdict {
    pub fn is_equal(&self) -> bool {
        matches!(self, Self::Equal)
    }
}

/// Compare a baseline payload against a target payload.
///
/// Row-set mode applies when both sides are objects whose `rows` member is
/// an array; otherwise both payloads are canonicalized and compared whole.
pub fn compare_payloads(baseline: &Value, target: &Value) -> PayloadVerdict {
    if let (Some(baseline_rows), Some(target_rows)) = (rows_of(baseline), rows_of(target)) {
        let (missing, extra) = compare_rows(baseline_rows, target_rows);
        if missing.is_empty() && extra.is_empty() {
            return PayloadVerdict::Equal;
        }
        return PayloadVerdict::Mismatch(PayloadDiff::Rows { missing, extra });
    }

    let baseline = canonicalize(baseline);
    let target = canonicalize(target);
    if baseline == target {
        PayloadVerdict::Equal
    } else {
        PayloadVerdict::Mismatch(PayloadDiff::Value { baseline, target })
    }
}

/// Multiset difference of two row lists keyed by canonical row text.
///
/// Returns `(missing, extra)`: rows the target is short of and rows the
/// target has in surplus, each with the copy count difference. Both lists
/// are ordered by key.
pub fn compare_rows(baseline: &[Value], target: &[Value]) -> (Vec<RowDelta>, Vec<RowDelta>) {
    let baseline_counts = count_rows(baseline);
    let target_counts = count_rows(target);

    let missing = surplus(&baseline_counts, &target_counts);
    let extra = surplus(&target_counts, &baseline_counts);
    (missing, extra)
}

fn rows_of(payload: &Value) -> Option<&[Value]> {
    payload
        .as_object()?
        .get("rows")?
        .as_array()
        .map(Vec::as_slice)
}

fn count_rows(rows: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(canonical_text(row)).or_insert(0) += 1;
    }
    counts
}

fn surplus(
    from: &BTreeMap<String, usize>,
    against: &BTreeMap<String, usize>,
) -> Vec<RowDelta> {
    from.iter()
        .filter_map(|(key, &count)| {
            let other = against.get(key).copied().unwrap_or(0);
            (count > other).then(|| RowDelta(key.clone(), count - other))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reordered_rows_are_equal() {
        let baseline = json!({"rows": [{"id": 1}, {"id": 2}, {"id": 3}]});
        let target = json!({"rows": [{"id": 3}, {"id": 1}, {"id": 2}]});
        assert_eq!(compare_payloads(&baseline, &target), PayloadVerdict::Equal);
    }

    #[test]
    fn short_copy_counts_as_missing_not_extra() {
        let row = json!({"id": 7, "mood": "calm"});
        let baseline = json!({"rows": [row.clone(), row.clone(), row.clone()]});
        let target = json!({"rows": [row.clone(), row.clone()]});

        let verdict = compare_payloads(&baseline, &target);
        let key = canonical_text(&row);
        assert_eq!(
            verdict,
            PayloadVerdict::Mismatch(PayloadDiff::Rows {
                missing: vec![RowDelta(key, 1)],
                extra: vec![],
            })
        );
    }

    #[test]
    fn duplicate_target_row_counts_as_extra() {
        let baseline = json!({"rows": [{"id": 1}]});
        let target = json!({"rows": [{"id": 1}, {"id": 1}]});
        match compare_payloads(&baseline, &target) {
            PayloadVerdict::Mismatch(PayloadDiff::Rows { missing, extra }) => {
                assert!(missing.is_empty());
                assert_eq!(extra, vec![RowDelta(r#"{"id":1}"#.to_string(), 1)]);
            }
            other => panic!("expected row mismatch, got {other:?}"),
        }
    }

    #[test]
    fn rows_mode_requires_rows_array_on_both_sides() {
        let baseline = json!({"rows": [1, 2]});
        let target = json!({"rows": "not-a-list"});
        match compare_payloads(&baseline, &target) {
            PayloadVerdict::Mismatch(PayloadDiff::Value { baseline, target }) => {
                assert_eq!(baseline, json!({"rows": [1, 2]}));
                assert_eq!(target, json!({"rows": "not-a-list"}));
            }
            other => panic!("expected value mismatch, got {other:?}"),
        }
    }

    #[test]
    fn fallback_ignores_key_insertion_order() {
        let baseline: Value =
            serde_json::from_str(r#"{"total": 3, "by_mood": {"ok": 2, "sad": 1}}"#).expect("json");
        let target: Value =
            serde_json::from_str(r#"{"by_mood": {"sad": 1, "ok": 2}, "total": 3}"#).expect("json");
        assert!(compare_payloads(&baseline, &target).is_equal());
    }

    #[test]
    fn fallback_reports_canonical_values_on_mismatch() {
        let baseline = json!({"values": [2, 1]});
        let target = json!({"values": [3, 1]});
        assert_eq!(
            compare_payloads(&baseline, &target),
            PayloadVerdict::Mismatch(PayloadDiff::Value {
                baseline: json!({"values": [1, 2]}),
                target: json!({"values": [1, 3]}),
            })
        );
    }

    #[test]
    fn compare_rows_orders_deltas_by_key() {
        let (missing, extra) = compare_rows(
            &[json!({"id": 2}), json!({"id": 1})],
            &[json!({"id": 9}), json!({"id": 3})],
        );
        let missing_keys: Vec<&str> = missing.iter().map(RowDelta::key).collect();
        let extra_keys: Vec<&str> = extra.iter().map(RowDelta::key).collect();
        assert_eq!(missing_keys, vec![r#"{"id":1}"#, r#"{"id":2}"#]);
        assert_eq!(extra_keys, vec![r#"{"id":3}"#, r#"{"id":9}"#]);
    }
}
