//! Wire shapes for the two ingestion paths.

use serde::{Deserialize, Serialize};

use crate::models::{Frame, Landmark, Sample};

/// Captured-session body. Field names are what the ingestion API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedSessionPayload {
    pub user: String,
    pub label: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    pub frames: Vec<PayloadFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadFrame {
    /// Detection timestamp in milliseconds.
    pub timestamp: f64,
    pub landmarks: FrameLandmarks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameLandmarks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_hand: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_hand: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<Vec<Landmark>>,
}

fn non_empty(landmarks: &[Landmark]) -> Option<Vec<Landmark>> {
    if landmarks.is_empty() {
        None
    } else {
        Some(landmarks.to_vec())
    }
}

impl From<&Frame> for PayloadFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            timestamp: frame.timestamp_ms as f64,
            landmarks: FrameLandmarks {
                left_hand: non_empty(&frame.left_hand),
                right_hand: non_empty(&frame.right_hand),
                pose: non_empty(&frame.pose),
                face: non_empty(&frame.face),
            },
        }
    }
}

impl From<&Sample> for CapturedSessionPayload {
    fn from(sample: &Sample) -> Self {
        Self {
            user: sample.metadata.performer_id.clone(),
            label: sample.metadata.action_label.clone(),
            session_id: sample.session_id.clone(),
            dialect: sample.metadata.dialect.clone(),
            frames: sample.frames.iter().map(PayloadFrame::from).collect(),
        }
    }
}

/// Response to a captured-session upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(alias = "id")]
    pub sample_id: String,
}

/// Recorded video for server-side landmark extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUpload {
    pub file: Vec<u8>,
    pub filename: String,
    pub user: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoUploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QualityMetrics;
    use crate::models::SampleMetadata;
    use chrono::Utc;

    #[test]
    fn test_payload_omits_absent_groups() {
        let sample = Sample {
            id: "s1".into(),
            session_id: "batch".into(),
            metadata: SampleMetadata {
                action_label: "thanks".into(),
                performer_id: "p7".into(),
                dialect: None,
            },
            frames: vec![Frame {
                timestamp_ms: 1250,
                right_hand: vec![Landmark::new(0.1, 0.2)],
                ..Frame::default()
            }],
            metrics: QualityMetrics::default(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(CapturedSessionPayload::from(&sample)).unwrap();
        assert_eq!(json["user"], "p7");
        assert_eq!(json["label"], "thanks");
        assert!(json.get("dialect").is_none());
        let frame = &json["frames"][0];
        assert_eq!(frame["timestamp"], 1250.0);
        assert!(frame["landmarks"].get("left_hand").is_none());
        assert_eq!(frame["landmarks"]["right_hand"][0]["x"].as_f64().unwrap() as f32, 0.1);
    }

    #[test]
    fn test_receipt_accepts_id_alias() {
        let receipt: UploadReceipt = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(receipt.sample_id, "abc");
        let response: VideoUploadResponse =
            serde_json::from_str(r#"{"success":false,"detail":"too large"}"#).unwrap();
        assert!(!response.success);
        assert_eq!(response.detail.as_deref(), Some("too large"));
    }
}
