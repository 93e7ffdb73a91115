//! Completed capture units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::QualityMetrics;

use super::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetadata {
    pub action_label: String,
    pub performer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

/// One complete labeled capture of exactly `target_frame_count` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: String,
    pub session_id: String,
    pub metadata: SampleMetadata,
    pub frames: Vec<Frame>,
    pub metrics: QualityMetrics,
    pub created_at: DateTime<Utc>,
}

impl Sample {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
