//! Comparison targets and URL validation.

use labparity_store::Submission;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// A registered student app, as the scheduler sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonTarget {
    pub name: String,
    pub url: String,
}

impl From<Submission> for ComparisonTarget {
    fn from(submission: Submission) -> Self {
        Self {
            name: submission.name,
            url: submission.url,
        }
    }
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_valid_app_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}
