use serde::{Deserialize, Serialize};

use playsort_infra::gateway::PublishReport;

// -------------------------
// Request DTOs
// -------------------------

/// Both fields are required; they are optional here so a missing one maps to 400.
#[derive(Debug, Default, Deserialize)]
pub struct ReorderRequest {
    pub playlist_id: Option<String>,
    pub criteria: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub message: String,
    pub new_playlist_id: String,
    pub videos_added: usize,
    pub videos_skipped: usize,
}

impl From<PublishReport> for ReorderResponse {
    fn from(report: PublishReport) -> Self {
        Self {
            message: "playlist reordered".to_string(),
            new_playlist_id: report.playlist_id.to_string(),
            videos_added: report.added,
            videos_skipped: report.skipped,
        }
    }
}
