pub mod capture;
pub mod db;
pub mod detection;
pub mod filters;
pub mod metrics;
pub mod models;
pub mod settings;
pub mod upload;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::{self, Duration, MissedTickBehavior};

use capture::{CaptureController, CaptureEvent, CaptureRequest};
use db::Database;
use detection::SyntheticSource;
use settings::SettingsStore;
use upload::{SpoolBackend, UploadRelay, UploadStatus};

const ENABLE_LOGS: bool = true;

const DEFAULT_LABEL: &str = "hello";
const DEFAULT_PERFORMER: &str = "demo";

fn data_dir() -> PathBuf {
    std::env::var_os("SIGNCAP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("signcap-data"))
}

fn debug_enabled() -> bool {
    std::env::var("SIGNCAP_DEBUG")
        .map(|value| !value.is_empty() && value != "0")
        .unwrap_or(false)
}

/// Runs one capture batch against the synthetic tracker and spools the
/// results. Usage: `signcap [action-label] [performer-id]`.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log_info!("signcap starting up...");

    let mut args = std::env::args().skip(1);
    let label = args.next().unwrap_or_else(|| DEFAULT_LABEL.to_string());
    let performer = args.next().unwrap_or_else(|| DEFAULT_PERFORMER.to_string());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(capture_batch(data_dir(), CaptureRequest::new(label, performer)))
}

async fn capture_batch(data_dir: PathBuf, request: CaptureRequest) -> Result<()> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.capture();

    let database = Database::new(data_dir.join("signcap.sqlite3"))?;

    // Uploads that were mid-flight when the app last died go back in the queue.
    let requeued = database.requeue_interrupted_uploads().await?;
    if requeued > 0 {
        log_warn!("Recovered {requeued} interrupted uploads");
    }

    let relay = UploadRelay::with_store(
        SpoolBackend::new(data_dir.join("spool")),
        settings.upload_concurrency,
        database.clone(),
    );
    relay.resume_pending().await?;

    let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
    let controller = CaptureController::new(settings.clone(), sample_tx);

    let forwarder = {
        let relay = relay.clone();
        tokio::spawn(async move {
            while let Some(sample) = sample_rx.recv().await {
                if let Err(err) = relay.submit_sample(&sample).await {
                    log_error!("failed to queue sample {}: {err:#}", sample.id);
                }
            }
        })
    };

    let mut events = controller.subscribe();
    controller
        .attach_source(Box::new(SyntheticSource::new(
            settings.detection_interval_ms(),
        )))
        .await?;
    controller.start_capture(request).await?;

    let debug = debug_enabled();
    let mut heartbeat = time::interval(Duration::from_secs(1));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CaptureEvent::BatchCompleted { session_id, captures }) => {
                    log_info!("batch {session_id} finished with {captures} captures");
                    break;
                }
                Ok(CaptureEvent::RecordingStalled { buffered_frames }) => {
                    log_warn!("capture stalled with {buffered_frames} frames; giving up");
                    break;
                }
                Ok(CaptureEvent::Countdown { remaining }) => log_info!("starting in {remaining}..."),
                Ok(event) => {
                    if debug {
                        log_debug!("{}", serde_json::to_string(&event)?);
                    }
                }
                Err(RecvError::Lagged(skipped)) => log_warn!("missed {skipped} capture events"),
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat.tick(), if debug => {
                let snapshot = controller.snapshot().await;
                log_info!(
                    "{} {}/{} frames, capture {}/{}",
                    snapshot.status.as_str(),
                    snapshot.buffered_frames,
                    snapshot.target_frame_count,
                    snapshot.captures_completed + 1,
                    snapshot.captures_requested
                );
            }
        }
    }

    controller.close(true).await?;
    forwarder.await.context("sample forwarder panicked")?;
    relay.drain().await;

    for item in relay.statuses() {
        match &item.status {
            UploadStatus::Succeeded { remote_id } => {
                println!("{} '{}' by {}: uploaded as {remote_id}", item.id, item.label, item.user)
            }
            UploadStatus::Failed { reason } => {
                println!("{} '{}' by {}: failed ({reason})", item.id, item.label, item.user)
            }
            status => println!("{} '{}' by {}: {}", item.id, item.label, item.user, status.as_str()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_batch_needs_writable_data_dir() {
        let blocker =
            std::env::temp_dir().join(format!("signcap-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = capture_batch(blocker.clone(), CaptureRequest::new("wave", "p1"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to create data directory"));

        let _ = std::fs::remove_file(blocker);
    }
}
