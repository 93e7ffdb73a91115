use serde::{Deserialize, Serialize};

/// Aggregate quality figures for one finished frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub frames_collected: usize,
    /// Frames with at least one hand landmark.
    pub frames_accepted: usize,
    pub avg_hand_landmarks_per_frame: f32,
    /// 0-100
    pub percent_frames_with_hands: f32,
    /// Only present when some landmark carried a visibility value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_confidence: Option<f32>,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            frames_collected: 0,
            frames_accepted: 0,
            avg_hand_landmarks_per_frame: 0.0,
            percent_frames_with_hands: 0.0,
            avg_confidence: None,
        }
    }
}
