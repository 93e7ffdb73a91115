//! Bounded-concurrency upload pool with per-item status.
//!
//! Every submitted item gets its own task; a shared semaphore caps how many
//! talk to the backend at once. Items never wait on each other and a failure
//! only marks that item. Nothing is retried unless the user asks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::Database;
use crate::models::Sample;

use super::backend::UploadBackend;
use super::payload::{CapturedSessionPayload, VideoUpload};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum UploadStatus {
    Queued,
    InFlight,
    #[serde(rename_all = "camelCase")]
    Succeeded {
        remote_id: String,
    },
    Failed {
        reason: String,
    },
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Queued => "queued",
            UploadStatus::InFlight => "in_flight",
            UploadStatus::Succeeded { .. } => "succeeded",
            UploadStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            UploadStatus::Succeeded { .. } | UploadStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadKind {
    Session,
    Video,
}

/// Status row shown per item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub id: String,
    pub kind: UploadKind,
    pub label: String,
    pub user: String,
    pub status: UploadStatus,
    pub attempts: u32,
}

enum Job {
    Session(CapturedSessionPayload),
    Video(VideoUpload),
}

struct Entry {
    item: UploadItem,
    job: Arc<Job>,
}

struct RelayInner<B> {
    backend: Arc<B>,
    store: Option<Database>,
    semaphore: Arc<Semaphore>,
    concurrency: StdMutex<usize>,
    entries: StdMutex<HashMap<String, Entry>>,
    /// Submission order for status listings.
    order: StdMutex<Vec<String>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

pub struct UploadRelay<B> {
    inner: Arc<RelayInner<B>>,
}

impl<B> Clone for UploadRelay<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<B: UploadBackend> UploadRelay<B> {
    pub fn new(backend: B, concurrency: usize) -> Self {
        Self::build(backend, concurrency, None)
    }

    /// Persists captured-session items and their status transitions.
    pub fn with_store(backend: B, concurrency: usize, store: Database) -> Self {
        Self::build(backend, concurrency, Some(store))
    }

    fn build(backend: B, concurrency: usize, store: Option<Database>) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner: Arc::new(RelayInner {
                backend: Arc::new(backend),
                store,
                semaphore: Arc::new(Semaphore::new(concurrency)),
                concurrency: StdMutex::new(concurrency),
                entries: StdMutex::new(HashMap::new()),
                order: StdMutex::new(Vec::new()),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        *lock(&self.inner.concurrency)
    }

    /// Resizes the pool. Shrinking takes effect as in-flight uploads finish.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        let mut current = lock(&self.inner.concurrency);
        if concurrency > *current {
            self.inner.semaphore.add_permits(concurrency - *current);
        } else if concurrency < *current {
            let surplus = (*current - concurrency) as u32;
            let semaphore = self.inner.semaphore.clone();
            tokio::spawn(async move {
                if let Ok(permits) = semaphore.acquire_many_owned(surplus).await {
                    permits.forget();
                }
            });
        }
        log_info!("upload concurrency {} -> {}", *current, concurrency);
        *current = concurrency;
    }

    /// Queues a finished capture. The sample is stored before the upload is
    /// attempted so a crash never loses it.
    pub async fn submit_sample(&self, sample: &Sample) -> Result<String> {
        if sample.frames.is_empty() {
            bail!("sample {} has no frames", sample.id);
        }
        if let Some(store) = &self.inner.store {
            store.insert_sample(sample).await?;
        }

        let payload = CapturedSessionPayload::from(sample);
        self.enqueue(sample.id.clone(), Job::Session(payload), UploadStatus::Queued);
        Ok(sample.id.clone())
    }

    /// Queues a recorded video. Video items live in memory only.
    pub fn submit_video(&self, upload: VideoUpload) -> Result<String> {
        if upload.user.trim().is_empty() || upload.label.trim().is_empty() {
            bail!("video uploads need a performer id and an action label");
        }
        if upload.filename.trim().is_empty() {
            bail!("video uploads need a file name");
        }
        let id = Uuid::new_v4().to_string();
        self.enqueue(id.clone(), Job::Video(upload), UploadStatus::Queued);
        Ok(id)
    }

    /// User-triggered retry of a failed item.
    pub async fn retry(&self, item_id: &str) -> Result<()> {
        let (job, kind) = {
            let mut entries = lock(&self.inner.entries);
            let entry = entries
                .get_mut(item_id)
                .ok_or_else(|| anyhow!("unknown upload item {item_id}"))?;
            if !matches!(entry.item.status, UploadStatus::Failed { .. }) {
                bail!(
                    "upload {item_id} is {} and cannot be retried",
                    entry.item.status.as_str()
                );
            }
            entry.item.status = UploadStatus::Queued;
            (entry.job.clone(), entry.item.kind)
        };

        if kind == UploadKind::Session {
            self.inner.persist(item_id, &UploadStatus::Queued).await;
        }
        log_info!("retrying upload {item_id}");
        self.dispatch(item_id.to_string(), job);
        Ok(())
    }

    /// Reloads stored samples: queued ones are sent again, failed ones come
    /// back as failed so they can be retried. Returns how many were queued.
    pub async fn resume_pending(&self) -> Result<usize> {
        let Some(store) = &self.inner.store else {
            return Ok(0);
        };
        let pending = store.pending_samples().await?;
        let mut queued = 0;
        for (sample, status) in pending {
            let payload = CapturedSessionPayload::from(&sample);
            if status == UploadStatus::Queued {
                queued += 1;
            }
            self.enqueue(sample.id, Job::Session(payload), status);
        }
        if queued > 0 {
            log_info!("resuming {queued} pending uploads");
        }
        Ok(queued)
    }

    pub fn status(&self, item_id: &str) -> Option<UploadStatus> {
        lock(&self.inner.entries)
            .get(item_id)
            .map(|entry| entry.item.status.clone())
    }

    pub fn statuses(&self) -> Vec<UploadItem> {
        let entries = lock(&self.inner.entries);
        lock(&self.inner.order)
            .iter()
            .filter_map(|id| entries.get(id).map(|entry| entry.item.clone()))
            .collect()
    }

    /// Waits for every upload started so far, including retries issued while
    /// waiting.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    log_error!("upload task panicked: {err}");
                }
            }
        }
    }

    fn enqueue(&self, id: String, job: Job, status: UploadStatus) {
        let (label, user, kind) = match &job {
            Job::Session(payload) => (payload.label.clone(), payload.user.clone(), UploadKind::Session),
            Job::Video(upload) => (upload.label.clone(), upload.user.clone(), UploadKind::Video),
        };
        let job = Arc::new(job);
        let dispatch = status == UploadStatus::Queued;

        {
            let mut entries = lock(&self.inner.entries);
            if entries.contains_key(&id) {
                log_warn!("upload {id} already tracked; ignoring duplicate submission");
                return;
            }
            entries.insert(
                id.clone(),
                Entry {
                    item: UploadItem {
                        id: id.clone(),
                        kind,
                        label,
                        user,
                        status,
                        attempts: 0,
                    },
                    job: job.clone(),
                },
            );
            lock(&self.inner.order).push(id.clone());
        }

        if dispatch {
            self.dispatch(id, job);
        }
    }

    fn dispatch(&self, id: String, job: Arc<Job>) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let permit = match inner.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            inner.mark_in_flight(&id).await;

            let outcome = match job.as_ref() {
                Job::Session(payload) => inner
                    .backend
                    .upload_session(payload.clone())
                    .await
                    .map(|receipt| receipt.sample_id),
                Job::Video(upload) => match inner.backend.upload_video(upload.clone()).await {
                    Ok(response) if response.success => {
                        Ok(response.task_id.or(response.filename).unwrap_or_default())
                    }
                    Ok(response) => Err(anyhow!(response
                        .detail
                        .unwrap_or_else(|| "video upload rejected".to_string()))),
                    Err(err) => Err(err),
                },
            };
            drop(permit);

            let status = match outcome {
                Ok(remote_id) => {
                    log_info!("upload {id} succeeded ({remote_id})");
                    UploadStatus::Succeeded { remote_id }
                }
                Err(err) => {
                    log_warn!("upload {id} failed: {err:#}");
                    UploadStatus::Failed {
                        reason: format!("{err:#}"),
                    }
                }
            };
            inner.set_status(&id, status).await;
        });

        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

impl<B> RelayInner<B> {
    async fn mark_in_flight(&self, id: &str) {
        let persist = {
            let mut entries = lock(&self.entries);
            match entries.get_mut(id) {
                Some(entry) => {
                    entry.item.status = UploadStatus::InFlight;
                    entry.item.attempts += 1;
                    entry.item.kind == UploadKind::Session
                }
                None => false,
            }
        };
        if persist {
            self.persist(id, &UploadStatus::InFlight).await;
        }
    }

    async fn set_status(&self, id: &str, status: UploadStatus) {
        let persist = {
            let mut entries = lock(&self.entries);
            match entries.get_mut(id) {
                Some(entry) => {
                    entry.item.status = status.clone();
                    entry.item.kind == UploadKind::Session
                }
                None => false,
            }
        };
        if persist {
            self.persist(id, &status).await;
        }
    }

    async fn persist(&self, id: &str, status: &UploadStatus) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.update_upload_status(id, status).await {
            log_error!("failed to record upload status for {id}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QualityMetrics;
    use crate::models::{Frame, Landmark, SampleMetadata};
    use crate::upload::{UploadReceipt, VideoUploadResponse};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct MockBackend {
        fail_labels: StdMutex<HashSet<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn failing(label: &str) -> Self {
            let backend = Self::default();
            lock(&backend.fail_labels).insert(label.to_string());
            backend
        }

        async fn work(&self, label: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if lock(&self.fail_labels).contains(label) {
                bail!("server returned 503");
            }
            Ok(())
        }
    }

    impl UploadBackend for MockBackend {
        async fn upload_session(&self, payload: CapturedSessionPayload) -> Result<UploadReceipt> {
            self.work(&payload.label).await?;
            Ok(UploadReceipt {
                sample_id: format!("remote-{}", payload.label),
            })
        }

        async fn upload_video(&self, upload: VideoUpload) -> Result<VideoUploadResponse> {
            self.work(&upload.label).await?;
            Ok(VideoUploadResponse {
                success: true,
                task_id: Some("task-1".into()),
                ..VideoUploadResponse::default()
            })
        }
    }

    fn sample(label: &str) -> Sample {
        Sample {
            id: Uuid::new_v4().to_string(),
            session_id: "batch".into(),
            metadata: SampleMetadata {
                action_label: label.into(),
                performer_id: "p1".into(),
                dialect: None,
            },
            frames: vec![Frame {
                timestamp_ms: 0,
                right_hand: vec![Landmark::new(0.5, 0.5); 21],
                ..Frame::default()
            }],
            metrics: QualityMetrics::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_caps_concurrency() {
        let relay = UploadRelay::new(MockBackend::default(), 2);
        for i in 0..6 {
            relay.submit_sample(&sample(&format!("a{i}"))).await.unwrap();
        }
        relay.drain().await;

        assert_eq!(relay.inner.backend.peak.load(Ordering::SeqCst), 2);
        let items = relay.statuses();
        assert_eq!(items.len(), 6);
        assert!(items
            .iter()
            .all(|item| matches!(item.status, UploadStatus::Succeeded { .. })));
        assert_eq!(items[0].label, "a0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_and_retryable() {
        let relay = UploadRelay::new(MockBackend::failing("bad"), 3);
        let good = relay.submit_sample(&sample("good")).await.unwrap();
        let bad = relay.submit_sample(&sample("bad")).await.unwrap();
        relay.drain().await;

        assert_eq!(
            relay.status(&good),
            Some(UploadStatus::Succeeded {
                remote_id: "remote-good".into()
            })
        );
        assert!(matches!(
            relay.status(&bad),
            Some(UploadStatus::Failed { ref reason }) if reason.contains("503")
        ));
        // No automatic retry.
        assert_eq!(relay.inner.backend.calls.load(Ordering::SeqCst), 2);

        assert!(relay.retry(&good).await.is_err());
        lock(&relay.inner.backend.fail_labels).clear();
        relay.retry(&bad).await.unwrap();
        relay.drain().await;
        assert!(matches!(
            relay.status(&bad),
            Some(UploadStatus::Succeeded { .. })
        ));
        let attempts = relay
            .statuses()
            .into_iter()
            .find(|item| item.id == bad)
            .map(|item| item.attempts);
        assert_eq!(attempts, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_pool() {
        let relay = UploadRelay::new(MockBackend::default(), 1);
        relay.set_concurrency(4);
        assert_eq!(relay.concurrency(), 4);
        for i in 0..8 {
            relay.submit_sample(&sample(&format!("b{i}"))).await.unwrap();
        }
        relay.drain().await;
        assert_eq!(relay.inner.backend.peak.load(Ordering::SeqCst), 4);
        relay.set_concurrency(0);
        assert_eq!(relay.concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_validation_and_upload() {
        let relay = UploadRelay::new(MockBackend::default(), 1);
        let missing_user = VideoUpload {
            file: vec![0; 4],
            filename: "clip.webm".into(),
            user: " ".into(),
            label: "wave".into(),
        };
        assert!(relay.submit_video(missing_user.clone()).is_err());

        let id = relay
            .submit_video(VideoUpload {
                user: "p1".into(),
                ..missing_user
            })
            .unwrap();
        relay.drain().await;
        assert_eq!(
            relay.status(&id),
            Some(UploadStatus::Succeeded {
                remote_id: "task-1".into()
            })
        );
    }

    #[tokio::test]
    async fn test_store_tracks_status_and_resumes() {
        let path = std::env::temp_dir().join(format!("signcap-relay-{}.sqlite", Uuid::new_v4()));
        let db = Database::new(path.clone()).unwrap();

        let relay = UploadRelay::with_store(MockBackend::failing("bad"), 2, db.clone());
        let bad = sample("bad");
        relay.submit_sample(&bad).await.unwrap();
        relay.drain().await;

        let records = db.list_uploads().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].status, UploadStatus::Failed { .. }));
        assert_eq!(records[0].attempts, 1);

        // A fresh relay picks the failed item back up for a manual retry.
        let restarted = UploadRelay::with_store(MockBackend::default(), 2, db.clone());
        assert_eq!(restarted.resume_pending().await.unwrap(), 0);
        restarted.retry(&bad.id).await.unwrap();
        restarted.drain().await;
        let records = db.list_uploads().await.unwrap();
        assert!(matches!(records[0].status, UploadStatus::Succeeded { .. }));

        drop(relay);
        drop(restarted);
        drop(db);
        let _ = std::fs::remove_file(path);
    }
}
