//! Stored sample rows as the upload screen sees them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::upload::UploadStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub sample_id: String,
    pub session_id: String,
    pub action_label: String,
    pub performer_id: String,
    pub frame_count: u64,
    pub status: UploadStatus,
    pub attempts: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
