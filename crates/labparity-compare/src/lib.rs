//! # labparity-compare
//!
//! Comparison core for baseline/target API parity.
//!
//! This crate provides:
//! - `canonicalize` (order-independent normal form for JSON values)
//! - `compare_payloads` (row-set multiset diff or canonical value diff)
//! - `compare_endpoints` (fetch a fixed endpoint list from two apps and diff)
//! - `JsonSource` (the fetch seam) with a blocking HTTP implementation
//!
//! Expected failures (unreachable app, bad JSON, mismatching rows) are
//! reported as values. Nothing here persists state or retries.
//!
//! ## Data flow
//!
//! ```text
//! (baseline base URL, target base URL, endpoints)
//!     │  JsonSource::fetch_json per side
//!     ▼
//! compare_payloads ──► EndpointResult per endpoint
//!     ▼
//! ComparisonVerdict { ok, results }
//! ```

pub mod canonical;
pub mod endpoint;
pub mod fetch;
pub mod payload;

pub use canonical::{canonical_text, canonicalize};
pub use endpoint::{
    ComparisonVerdict, DEFAULT_COMPARE_ENDPOINTS, EndpointOutcome, EndpointResult,
    compare_endpoints, normalize_base_url, normalize_endpoint, parse_endpoints, row_deltas,
};
pub use fetch::{DEFAULT_FETCH_TIMEOUT, FetchError, HttpJsonSource, JsonSource};
pub use payload::{PayloadDiff, PayloadVerdict, RowDelta, compare_payloads, compare_rows};
