use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{DetectionFrame, HandDetection, HandSide, Landmark};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const HAND_LANDMARKS: usize = 21;

/// Offsets of the 21 hand landmarks from the wrist for an open palm.
fn open_palm_offset(index: usize) -> (f32, f32) {
    if index == 0 {
        return (0.0, 0.0);
    }
    let finger = (index - 1) / 4;
    let joint = ((index - 1) % 4 + 1) as f32;
    let spread = (finger as f32 - 2.0) * 0.035;
    (spread * joint * 0.6, -0.04 * joint)
}

/// Generates a jittery, slowly swaying hand at a fixed rate. Stands in for a
/// camera when running headless or in demos.
pub struct SyntheticSource {
    interval: Duration,
    jitter: f32,
    dropout: f64,
    seed: Option<u64>,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            jitter: 0.004,
            dropout: 0.05,
            seed: None,
            cancel_token: None,
            handle: None,
        }
    }

    /// Probability that a frame reports no hand at all.
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn synthesize(rng: &mut StdRng, side: HandSide, jitter: f32, elapsed_ms: u64) -> HandDetection {
    let phase = elapsed_ms as f32 / 1000.0;
    let wrist_x = 0.5 + 0.1 * (phase * 1.7).sin();
    let wrist_y = 0.7 + 0.05 * (phase * 2.3).cos();

    let landmarks = (0..HAND_LANDMARKS)
        .map(|index| {
            let (dx, dy) = open_palm_offset(index);
            Landmark::new(
                wrist_x + dx + rng.gen_range(-jitter..=jitter),
                wrist_y + dy + rng.gen_range(-jitter..=jitter),
            )
            .with_z(rng.gen_range(-0.02..=0.02))
            .with_visibility(rng.gen_range(0.7..=1.0))
        })
        .collect();

    HandDetection::new(side, landmarks, rng.gen_range(0.85..=0.99))
}

async fn feed_loop(
    sink: mpsc::Sender<DetectionFrame>,
    source: SyntheticConfig,
    cancel_token: CancellationToken,
) {
    let mut rng = match source.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut ticker = tokio::time::interval(source.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let hands = if rng.gen_bool(source.dropout) {
                    Vec::new()
                } else {
                    vec![synthesize(&mut rng, HandSide::Right, source.jitter, elapsed_ms)]
                };
                let frame = DetectionFrame {
                    timestamp_ms: elapsed_ms,
                    hands,
                    ..DetectionFrame::default()
                };
                if sink.send(frame).await.is_err() {
                    log_warn!("synthetic detection sink closed; stopping feed");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("synthetic detection feed shutting down");
                break;
            }
        }
    }
}

#[derive(Clone, Copy)]
struct SyntheticConfig {
    interval: Duration,
    jitter: f32,
    dropout: f64,
    seed: Option<u64>,
}

impl super::DetectionSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(&mut self, sink: mpsc::Sender<DetectionFrame>) -> Result<()> {
        if self.handle.is_some() {
            bail!("synthetic source already streaming");
        }

        let config = SyntheticConfig {
            interval: self.interval,
            jitter: self.jitter,
            dropout: self.dropout,
            seed: self.seed,
        };
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(feed_loop(sink, config, cancel_token.clone()));

        self.cancel_token = Some(cancel_token);
        self.handle = Some(handle);
        log_info!("synthetic detection feed started every {:?}", self.interval);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take();
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
