//! Landmark and frame data models.
//!
//! Landmarks come straight from the external tracker and are never mutated;
//! filtering and interpolation derive new values from them.

use serde::{Deserialize, Serialize};

/// A single tracked point (e.g. a knuckle) in normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    /// Visibility / confidence in [0, 1] when the detector reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
        }
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Semantic side of a hand after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub fn opposite(self) -> Self {
        match self {
            HandSide::Left => HandSide::Right,
            HandSide::Right => HandSide::Left,
        }
    }

    /// Parses the detector's handedness label ("Left" / "Right").
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "left" => Some(HandSide::Left),
            "right" => Some(HandSide::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandSide::Left => "Left",
            HandSide::Right => "Right",
        }
    }

    pub fn group(self) -> LandmarkGroup {
        match self {
            HandSide::Left => LandmarkGroup::LeftHand,
            HandSide::Right => LandmarkGroup::RightHand,
        }
    }
}

/// Landmark set a point belongs to. Filter and interpolation state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkGroup {
    LeftHand,
    RightHand,
    Pose,
    Face,
}

/// Which optional landmark groups a capture tracks in addition to the hands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedGroups {
    #[serde(default)]
    pub pose: bool,
    #[serde(default)]
    pub face: bool,
}

/// One sampling instant as stored in a sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub timestamp_ms: u64,
    pub left_hand: Vec<Landmark>,
    pub right_hand: Vec<Landmark>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pose: Vec<Landmark>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub face: Vec<Landmark>,
}

impl Frame {
    pub fn hand_landmark_count(&self) -> usize {
        self.left_hand.len() + self.right_hand.len()
    }
}

/// A single hand group as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandDetection {
    pub landmarks: Vec<Landmark>,
    pub handedness_label: String,
    #[serde(default)]
    pub confidence: f32,
}

impl HandDetection {
    pub fn new(side: HandSide, landmarks: Vec<Landmark>, confidence: f32) -> Self {
        Self {
            landmarks,
            handedness_label: side.as_str().to_string(),
            confidence,
        }
    }
}

/// Everything the tracker hands over in one callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionFrame {
    pub timestamp_ms: u64,
    pub hands: Vec<HandDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<Vec<Landmark>>,
    /// Opaque handle to the source image; only the preview ever reads it.
    #[serde(skip)]
    pub image_ref: Option<u64>,
}
