use serde::{Deserialize, Serialize};

/// Body of `GET progress/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    /// Server-side jobs (downloads, scans) not yet completed. A missing
    /// field counts as no pending work.
    #[serde(default)]
    pub pending_jobs: u64,
}
