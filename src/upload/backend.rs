use std::future::Future;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::fs;
use uuid::Uuid;

use super::payload::{CapturedSessionPayload, UploadReceipt, VideoUpload, VideoUploadResponse};

/// Where finished captures go. One call per item; the relay handles
/// concurrency and status, implementations only move bytes.
pub trait UploadBackend: Send + Sync + 'static {
    fn upload_session(
        &self,
        payload: CapturedSessionPayload,
    ) -> impl Future<Output = Result<UploadReceipt>> + Send;

    fn upload_video(
        &self,
        upload: VideoUpload,
    ) -> impl Future<Output = Result<VideoUploadResponse>> + Send;
}

/// Offline backend: every item becomes a file in a spool directory, to be
/// shipped by whatever syncs that directory.
#[derive(Debug, Clone)]
pub struct SpoolBackend {
    dir: PathBuf,
}

impl SpoolBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl UploadBackend for SpoolBackend {
    async fn upload_session(&self, payload: CapturedSessionPayload) -> Result<UploadReceipt> {
        if payload.frames.is_empty() {
            bail!("refusing to spool an empty capture");
        }
        let sessions = self.dir.join("sessions");
        fs::create_dir_all(&sessions)
            .await
            .with_context(|| format!("failed to create spool directory {}", sessions.display()))?;

        let stem = Uuid::new_v4().to_string();
        let path = sessions.join(format!("{stem}.json"));
        let body = serde_json::to_vec_pretty(&payload).context("failed to encode capture")?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(UploadReceipt { sample_id: stem })
    }

    async fn upload_video(&self, upload: VideoUpload) -> Result<VideoUploadResponse> {
        if upload.file.is_empty() {
            return Ok(VideoUploadResponse {
                success: false,
                detail: Some("video file is empty".into()),
                ..VideoUploadResponse::default()
            });
        }
        let videos = self.dir.join("videos");
        fs::create_dir_all(&videos)
            .await
            .with_context(|| format!("failed to create spool directory {}", videos.display()))?;

        let task_id = Uuid::new_v4().to_string();
        let filename = sanitize(&upload.filename);
        let path = videos.join(format!("{task_id}-{filename}"));
        fs::write(&path, &upload.file)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        let meta = serde_json::json!({
            "user": upload.user,
            "label": upload.label,
            "filename": upload.filename,
            "bytes": upload.file.len(),
        });
        let meta_path = videos.join(format!("{task_id}.json"));
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .await
            .with_context(|| format!("failed to write {}", meta_path.display()))?;

        Ok(VideoUploadResponse {
            success: true,
            task_id: Some(task_id),
            status: Some("queued".into()),
            filename: Some(filename),
            total_frames: None,
            detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::payload::{FrameLandmarks, PayloadFrame};

    fn spool_dir() -> PathBuf {
        std::env::temp_dir().join(format!("signcap-spool-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize("clip 1/../x.mp4"), "clip_1_.._x.mp4");
    }

    #[tokio::test]
    async fn test_spool_writes_session_file() {
        let dir = spool_dir();
        let backend = SpoolBackend::new(&dir);
        let payload = CapturedSessionPayload {
            user: "p1".into(),
            label: "wave".into(),
            session_id: "s".into(),
            dialect: None,
            frames: vec![PayloadFrame {
                timestamp: 0.0,
                landmarks: FrameLandmarks::default(),
            }],
        };

        let receipt = backend.upload_session(payload.clone()).await.unwrap();
        let path = dir.join("sessions").join(format!("{}.json", receipt.sample_id));
        let written: CapturedSessionPayload =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, payload);

        let empty = CapturedSessionPayload {
            frames: Vec::new(),
            ..payload
        };
        assert!(backend.upload_session(empty).await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_spool_rejects_empty_video() {
        let dir = spool_dir();
        let backend = SpoolBackend::new(&dir);
        let response = backend
            .upload_video(VideoUpload {
                file: Vec::new(),
                filename: "a.webm".into(),
                user: "p1".into(),
                label: "wave".into(),
            })
            .await
            .unwrap();
        assert!(!response.success);

        let response = backend
            .upload_video(VideoUpload {
                file: vec![1, 2, 3],
                filename: "a.webm".into(),
                user: "p1".into(),
                label: "wave".into(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.filename.as_deref(), Some("a.webm"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
