use thiserror::Error;

use super::CaptureStatus;

/// User-facing rejections. Returned inside `anyhow::Error`; callers that need
/// to branch on the kind use `downcast_ref::<CaptureError>()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// Missing or malformed identifiers at start.
    #[error("{0}")]
    Validation(String),
    /// Manual stop before the sample reached its target length.
    #[error("only {buffered} of {target} frames recorded; keep signing until the capture completes")]
    PrematureStop { buffered: usize, target: usize },
    /// Camera / tracker not available; start stays disabled.
    #[error("hand tracker is not ready: {0}")]
    DetectorUnavailable(String),
    #[error("cannot {action} while {}", .state.as_str())]
    InvalidState {
        action: &'static str,
        state: CaptureStatus,
    },
    /// Closing would discard an in-progress capture without confirmation.
    #[error("a capture is in progress ({buffered} frames buffered); confirm to discard it")]
    UnsavedCapture { buffered: usize },
}
