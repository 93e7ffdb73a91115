//! Detection sources: the external hand tracker the capture core consumes.

mod synthetic;

pub use synthetic::SyntheticSource;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::models::DetectionFrame;

/// A camera + tracker pair. Exclusively owned by one capture controller, which
/// starts it when attached and stops it when the capture closes.
pub trait DetectionSource: Send {
    fn name(&self) -> &str;

    /// Begins streaming detections into `sink`. An error means the tracker is
    /// unavailable (permission denied, init failure).
    fn start(&mut self, sink: mpsc::Sender<DetectionFrame>) -> Result<()>;

    /// True once `start` succeeded and until `stop`.
    fn is_ready(&self) -> bool;

    /// Releases the camera. Safe to call more than once.
    fn stop(&mut self);
}
