use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant},
};

use crate::detection::DetectionSource;
use crate::metrics::QualityMetrics;
use crate::models::{DetectionFrame, HandSide, Sample};
use crate::settings::CaptureSettings;

use super::preview::{PreviewFrame, PreviewRenderer};
use super::sequencer::{CaptureSequencer, Effect, Timer};
use super::{CaptureError, CaptureRequest, CaptureSnapshot};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;
const DETECTION_QUEUE: usize = 8;

/// Notifications for whatever presents the capture to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CaptureEvent {
    StateChanged(CaptureSnapshot),
    Countdown {
        remaining: u32,
    },
    RecordingStarted {
        capture_index: u32,
        captures_requested: u32,
    },
    SampleCompleted {
        sample_id: String,
        metrics: QualityMetrics,
    },
    BatchCompleted {
        session_id: String,
        captures: u32,
    },
    RecordingStalled {
        buffered_frames: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum DetectorReadiness {
    Ready,
    NotReady(String),
}

/// Owns the sequencer and the detection source; turns sequencer effects into
/// tokio timers, observer events and sample hand-offs.
#[derive(Clone)]
pub struct CaptureController {
    sequencer: Arc<Mutex<CaptureSequencer>>,
    preview: Arc<Mutex<PreviewRenderer>>,
    timers: Arc<StdMutex<Vec<JoinHandle<()>>>>,
    source: Arc<Mutex<Option<Box<dyn DetectionSource>>>>,
    pump: Arc<StdMutex<Option<JoinHandle<()>>>>,
    readiness: Arc<StdMutex<DetectorReadiness>>,
    events: broadcast::Sender<CaptureEvent>,
    preview_tx: Arc<watch::Sender<Option<PreviewFrame>>>,
    samples: Arc<StdMutex<Option<mpsc::UnboundedSender<Sample>>>>,
    origin: Instant,
}

impl CaptureController {
    pub fn new(settings: CaptureSettings, samples: mpsc::UnboundedSender<Sample>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (preview_tx, _) = watch::channel(None);
        let preview = PreviewRenderer::new(settings.preview_alpha, settings.mirror_preview);

        Self {
            sequencer: Arc::new(Mutex::new(CaptureSequencer::new(settings))),
            preview: Arc::new(Mutex::new(preview)),
            timers: Arc::new(StdMutex::new(Vec::new())),
            source: Arc::new(Mutex::new(None)),
            pump: Arc::new(StdMutex::new(None)),
            readiness: Arc::new(StdMutex::new(DetectorReadiness::NotReady(
                "no detection source attached".into(),
            ))),
            events,
            preview_tx: Arc::new(preview_tx),
            samples: Arc::new(StdMutex::new(Some(samples))),
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Latest smoothed frame for on-screen feedback.
    pub fn preview(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.preview_tx.subscribe()
    }

    pub fn readiness(&self) -> DetectorReadiness {
        lock(&self.readiness).clone()
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        let now = self.now_ms();
        self.sequencer.lock().await.snapshot(now)
    }

    /// Takes ownership of the tracker and starts streaming from it.
    pub async fn attach_source(&self, mut source: Box<dyn DetectionSource>) -> Result<()> {
        let mut slot = self.source.lock().await;
        if slot.is_some() {
            return Err(anyhow!("a detection source is already attached"));
        }

        let (tx, mut rx) = mpsc::channel::<DetectionFrame>(DETECTION_QUEUE);
        let started = source.start(tx).and_then(|_| {
            if source.is_ready() {
                Ok(())
            } else {
                Err(anyhow!("tracker reported not ready"))
            }
        });
        if let Err(err) = started {
            source.stop();
            let reason = format!("{} failed to start: {err:#}", source.name());
            log_warn!("{reason}");
            *lock(&self.readiness) = DetectorReadiness::NotReady(reason.clone());
            return Err(CaptureError::DetectorUnavailable(reason).into());
        }

        log_info!("detection source '{}' attached", source.name());
        *slot = Some(source);
        *lock(&self.readiness) = DetectorReadiness::Ready;

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                controller.on_detection(frame).await;
            }
        });
        if let Some(previous) = lock(&self.pump).replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    pub async fn start_capture(&self, request: CaptureRequest) -> Result<CaptureSnapshot> {
        if let DetectorReadiness::NotReady(reason) = self.readiness() {
            return Err(CaptureError::DetectorUnavailable(reason).into());
        }

        let now = self.now_ms();
        let mut sequencer = self.sequencer.lock().await;
        let effects = sequencer.start(request, now)?;
        self.apply(effects);
        Ok(sequencer.snapshot(now))
    }

    /// Detection callback; frames are serialized through the sequencer lock.
    /// Effects are applied before the lock is released so observers see
    /// transitions in the order the sequencer made them.
    pub async fn on_detection(&self, frame: DetectionFrame) {
        let now = self.now_ms();
        let (hands, presence) = {
            let mut sequencer = self.sequencer.lock().await;
            let effects = sequencer.on_detection(&frame, now);
            self.apply(effects);
            let presence = [
                sequencer.is_present(HandSide::Left),
                sequencer.is_present(HandSide::Right),
            ];
            (sequencer.latest_hands().clone(), presence)
        };

        let rendered = self
            .preview
            .lock()
            .await
            .render(&hands, presence, frame.image_ref);
        self.preview_tx.send_replace(Some(rendered));
    }

    pub async fn pause(&self) -> Result<CaptureSnapshot> {
        self.transition(|seq, now| seq.pause(now)).await
    }

    pub async fn resume(&self) -> Result<CaptureSnapshot> {
        self.transition(|seq, now| seq.resume(now)).await
    }

    pub async fn restart(&self) -> Result<CaptureSnapshot> {
        self.transition(|seq, now| seq.restart(now)).await
    }

    pub async fn finish(&self) -> Result<CaptureSnapshot> {
        self.transition(|seq, now| seq.finish(now)).await
    }

    pub async fn abort(&self) -> Result<CaptureSnapshot> {
        self.transition(|seq, now| Ok(seq.abort(now))).await
    }

    async fn transition<F>(&self, action: F) -> Result<CaptureSnapshot>
    where
        F: FnOnce(&mut CaptureSequencer, u64) -> Result<Vec<Effect>>,
    {
        let now = self.now_ms();
        let mut sequencer = self.sequencer.lock().await;
        let effects = action(&mut sequencer, now)?;
        self.apply(effects);
        Ok(sequencer.snapshot(now))
    }

    /// Tears the capture down and releases the tracker. Refuses to drop an
    /// in-progress capture unless `confirm_discard` is set.
    pub async fn close(&self, confirm_discard: bool) -> Result<()> {
        {
            let now = self.now_ms();
            let mut sequencer = self.sequencer.lock().await;
            if sequencer.has_unsaved_capture() && !confirm_discard {
                return Err(CaptureError::UnsavedCapture {
                    buffered: sequencer.buffered_frames(),
                }
                .into());
            }
            let effects = sequencer.abort(now);
            self.apply(effects);
        }

        self.cancel_timers();
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        if let Some(mut source) = self.source.lock().await.take() {
            source.stop();
            log_info!("detection source '{}' released", source.name());
        }
        *lock(&self.readiness) = DetectorReadiness::NotReady("capture closed".into());
        lock(&self.samples).take();
        self.preview.lock().await.reset();
        self.preview_tx.send_replace(None);
        Ok(())
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Schedule {
                    timer,
                    epoch,
                    delay_ms,
                } => self.schedule(timer, epoch, delay_ms),
                Effect::CancelTimers => self.cancel_timers(),
                Effect::Countdown { remaining } => {
                    self.emit(CaptureEvent::Countdown { remaining });
                }
                Effect::RecordingStarted {
                    capture_index,
                    captures_requested,
                } => self.emit(CaptureEvent::RecordingStarted {
                    capture_index,
                    captures_requested,
                }),
                Effect::SampleCompleted(sample) => {
                    let event = CaptureEvent::SampleCompleted {
                        sample_id: sample.id.clone(),
                        metrics: sample.metrics.clone(),
                    };
                    match lock(&self.samples).as_ref() {
                        Some(sink) => {
                            if sink.send(sample).is_err() {
                                log_error!("sample sink closed; completed sample dropped");
                            }
                        }
                        None => log_error!("capture closed; completed sample dropped"),
                    }
                    self.emit(event);
                }
                Effect::BatchCompleted {
                    session_id,
                    captures,
                } => self.emit(CaptureEvent::BatchCompleted {
                    session_id,
                    captures,
                }),
                Effect::RecordingStalled { buffered_frames } => {
                    self.emit(CaptureEvent::RecordingStalled { buffered_frames });
                }
                Effect::StateChanged(snapshot) => self.emit(CaptureEvent::StateChanged(snapshot)),
            }
        }
    }

    fn emit(&self, event: CaptureEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn schedule(&self, timer: Timer, epoch: u64, delay_ms: u64) {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            time::sleep(Duration::from_millis(delay_ms)).await;
            let mut sequencer = controller.sequencer.lock().await;
            let effects = sequencer.fire_timer(timer, epoch, controller.now_ms());
            controller.apply(effects);
        });

        let mut timers = lock(&self.timers);
        timers.retain(|h| !h.is_finished());
        timers.push(handle);
    }

    fn cancel_timers(&self) {
        for handle in lock(&self.timers).drain(..) {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
