pub mod classifier;
pub mod controller;
mod error;
pub mod pipeline;
pub mod preview;
pub mod sequencer;
mod state;

pub use controller::{CaptureController, CaptureEvent, DetectorReadiness};
pub use error::CaptureError;
pub use preview::{PreviewFrame, PreviewRenderer};
pub use sequencer::{CaptureSequencer, Effect, Timer};
pub use state::{CaptureRequest, CaptureSession, CaptureSnapshot, CaptureState, CaptureStatus};
