//! Hand-off of finished captures to the ingestion backend.

mod backend;
mod payload;
mod relay;

pub use backend::{SpoolBackend, UploadBackend};
pub use payload::{
    CapturedSessionPayload, FrameLandmarks, PayloadFrame, UploadReceipt, VideoUpload,
    VideoUploadResponse,
};
pub use relay::{UploadItem, UploadKind, UploadRelay, UploadStatus};
