use serde::{Deserialize, Serialize};

use crate::models::{Frame, SampleMetadata};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    Idle,
    Countdown,
    Record,
    Paused,
    /// Between two captures of a batch.
    Settling,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        CaptureStatus::Idle
    }
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Countdown => "counting down",
            CaptureStatus::Record => "recording",
            CaptureStatus::Paused => "paused",
            CaptureStatus::Settling => "settling",
        }
    }

    pub fn is_active(&self) -> bool {
        *self != CaptureStatus::Idle
    }
}

/// What the user asks for when pressing start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub action_label: String,
    pub performer_id: String,
    #[serde(default)]
    pub dialect: Option<String>,
    /// Falls back to the configured batch size.
    #[serde(default)]
    pub captures_requested: Option<u32>,
}

impl CaptureRequest {
    pub fn new(action_label: impl Into<String>, performer_id: impl Into<String>) -> Self {
        Self {
            action_label: action_label.into(),
            performer_id: performer_id.into(),
            ..Self::default()
        }
    }

    pub fn with_captures(mut self, captures: u32) -> Self {
        self.captures_requested = Some(captures);
        self
    }
}

/// Batch context from one start action until completion or abort.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    pub session_id: Option<String>,
    pub captures_requested: u32,
    pub captures_completed: u32,
    pub frames: Vec<Frame>,
}

impl CaptureSession {
    pub fn begin(&mut self, session_id: String, captures_requested: u32) {
        *self = Self {
            session_id: Some(session_id),
            captures_requested,
            captures_completed: 0,
            frames: Vec::new(),
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn batch_done(&self) -> bool {
        self.captures_completed >= self.captures_requested
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureState {
    pub status: CaptureStatus,
    pub action_label: String,
    pub performer_id: String,
    pub dialect: Option<String>,
    pub session: CaptureSession,
    pub countdown_remaining: u32,
    /// Gate clock: when the last eligible frame was evaluated.
    pub last_sample_at: Option<u64>,
    /// Recording time accumulated before the current running window.
    pub active_ms_baseline: u64,
    /// Start of the current running window; `None` while not recording.
    pub record_anchor: Option<u64>,
}

impl CaptureState {
    pub fn metadata(&self) -> SampleMetadata {
        SampleMetadata {
            action_label: self.action_label.clone(),
            performer_id: self.performer_id.clone(),
            dialect: self.dialect.clone(),
        }
    }

    pub fn current_active_ms(&self, now_ms: u64) -> u64 {
        match self.record_anchor {
            Some(anchor) => self
                .active_ms_baseline
                .saturating_add(now_ms.saturating_sub(anchor)),
            None => self.active_ms_baseline,
        }
    }

    pub fn begin_recording(&mut self, now_ms: u64) {
        self.status = CaptureStatus::Record;
        self.countdown_remaining = 0;
        self.last_sample_at = None;
        self.active_ms_baseline = 0;
        self.record_anchor = Some(now_ms);
    }

    pub fn freeze_clock(&mut self, now_ms: u64) {
        self.active_ms_baseline = self.current_active_ms(now_ms);
        self.record_anchor = None;
    }

    pub fn stop_clock(&mut self) {
        self.last_sample_at = None;
        self.active_ms_baseline = 0;
        self.record_anchor = None;
    }
}

/// Observer-facing view of the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub status: CaptureStatus,
    pub action_label: String,
    pub performer_id: String,
    pub session_id: Option<String>,
    pub captures_requested: u32,
    pub captures_completed: u32,
    pub countdown_remaining: u32,
    pub buffered_frames: usize,
    pub target_frame_count: usize,
    pub active_ms: u64,
}
