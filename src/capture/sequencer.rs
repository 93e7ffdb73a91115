//! Countdown / record / pause state machine with multi-capture batches.
//!
//! The sequencer never sleeps and never reads a clock. Every entry point takes
//! the current monotonic time in milliseconds and returns the [`Effect`]s the
//! caller must carry out: timers to arm, samples to hand off, observers to
//! notify. Timers carry the epoch they were armed in; a callback whose epoch
//! no longer matches is ignored, so aborts never race stale timers.

use std::mem;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::filters::FilterBank;
use crate::metrics::{self, QualityMetrics};
use crate::models::{DetectionFrame, Frame, HandSide, Landmark, LandmarkGroup, Sample};
use crate::settings::CaptureSettings;

use super::classifier::{classify, ClassifiedHands};
use super::pipeline::HandPipeline;
use super::{CaptureError, CaptureRequest, CaptureSnapshot, CaptureState, CaptureStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    CountdownTick,
    Settle,
    BackupTimeout,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Schedule {
        timer: Timer,
        epoch: u64,
        delay_ms: u64,
    },
    /// Every armed timer is obsolete.
    CancelTimers,
    Countdown {
        remaining: u32,
    },
    RecordingStarted {
        capture_index: u32,
        captures_requested: u32,
    },
    SampleCompleted(Sample),
    BatchCompleted {
        session_id: String,
        captures: u32,
    },
    /// Backup timeout fired: the capture was dropped without a sample.
    RecordingStalled {
        buffered_frames: usize,
    },
    StateChanged(CaptureSnapshot),
}

pub struct CaptureSequencer {
    settings: CaptureSettings,
    state: CaptureState,
    pipeline: HandPipeline,
    filters: FilterBank,
    latest_hands: ClassifiedHands,
    epoch: u64,
}

impl CaptureSequencer {
    pub fn new(settings: CaptureSettings) -> Self {
        let filters = FilterBank::new(settings.filter.clone());
        Self {
            settings,
            state: CaptureState::default(),
            pipeline: HandPipeline::new(),
            filters,
            latest_hands: ClassifiedHands::default(),
            epoch: 0,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn status(&self) -> CaptureStatus {
        self.state.status
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn buffered_frames(&self) -> usize {
        self.state.session.frames.len()
    }

    /// Hands from the most recent detection, for the preview consumer.
    pub fn latest_hands(&self) -> &ClassifiedHands {
        &self.latest_hands
    }

    pub fn is_present(&self, side: HandSide) -> bool {
        self.pipeline.is_present(side)
    }

    /// True while closing would throw away capture progress.
    pub fn has_unsaved_capture(&self) -> bool {
        self.state.status.is_active()
    }

    pub fn snapshot(&self, now_ms: u64) -> CaptureSnapshot {
        let state = &self.state;
        CaptureSnapshot {
            status: state.status,
            action_label: state.action_label.clone(),
            performer_id: state.performer_id.clone(),
            session_id: state.session.session_id.clone(),
            captures_requested: state.session.captures_requested,
            captures_completed: state.session.captures_completed,
            countdown_remaining: state.countdown_remaining,
            buffered_frames: state.session.frames.len(),
            target_frame_count: self.settings.target_frame_count,
            active_ms: state.current_active_ms(now_ms),
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    fn changed(&self, now_ms: u64) -> Effect {
        Effect::StateChanged(self.snapshot(now_ms))
    }

    pub fn start(&mut self, request: CaptureRequest, now_ms: u64) -> Result<Vec<Effect>> {
        if self.state.status != CaptureStatus::Idle {
            return Err(CaptureError::InvalidState {
                action: "start",
                state: self.state.status,
            }
            .into());
        }

        let action_label = request.action_label.trim();
        let performer_id = request.performer_id.trim();
        if action_label.is_empty() {
            return Err(CaptureError::Validation("an action label is required".into()).into());
        }
        if performer_id.is_empty() {
            return Err(CaptureError::Validation("a performer id is required".into()).into());
        }
        let captures = request
            .captures_requested
            .unwrap_or(self.settings.captures_per_batch);
        if captures == 0 {
            return Err(
                CaptureError::Validation("at least one capture must be requested".into()).into(),
            );
        }

        let session_id = Uuid::new_v4().to_string();
        self.state.action_label = action_label.to_string();
        self.state.performer_id = performer_id.to_string();
        self.state.dialect = request
            .dialect
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.state.session.begin(session_id.clone(), captures);
        self.state.stop_clock();
        self.filters.reset();

        log_info!(
            "capture session {} started: '{}' by {} x{}",
            session_id,
            self.state.action_label,
            self.state.performer_id,
            captures
        );

        Ok(self.begin_countdown(now_ms))
    }

    fn begin_countdown(&mut self, now_ms: u64) -> Vec<Effect> {
        let steps = self.settings.countdown_steps;
        if steps == 0 {
            return self.begin_recording(now_ms);
        }

        self.state.status = CaptureStatus::Countdown;
        self.state.countdown_remaining = steps;
        let epoch = self.next_epoch();

        vec![
            Effect::Countdown { remaining: steps },
            self.changed(now_ms),
            Effect::Schedule {
                timer: Timer::CountdownTick,
                epoch,
                delay_ms: self.settings.countdown_tick_ms,
            },
        ]
    }

    fn countdown_tick(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.state.status != CaptureStatus::Countdown {
            return Vec::new();
        }

        self.state.countdown_remaining = self.state.countdown_remaining.saturating_sub(1);
        if self.state.countdown_remaining == 0 {
            return self.begin_recording(now_ms);
        }

        let remaining = self.state.countdown_remaining;
        vec![
            Effect::Countdown { remaining },
            self.changed(now_ms),
            Effect::Schedule {
                timer: Timer::CountdownTick,
                epoch: self.epoch,
                delay_ms: self.settings.countdown_tick_ms,
            },
        ]
    }

    fn begin_recording(&mut self, now_ms: u64) -> Vec<Effect> {
        self.state.begin_recording(now_ms);
        self.state.session.frames.clear();
        let epoch = self.next_epoch();

        let session = &self.state.session;
        let capture_index = session.captures_completed + 1;
        let captures_requested = session.captures_requested;
        log_info!("recording capture {capture_index}/{captures_requested}");

        vec![
            Effect::RecordingStarted {
                capture_index,
                captures_requested,
            },
            self.changed(now_ms),
            Effect::Schedule {
                timer: Timer::BackupTimeout,
                epoch,
                delay_ms: self.settings.backup_timeout_ms,
            },
        ]
    }

    /// Entry point for timer callbacks armed through [`Effect::Schedule`].
    pub fn fire_timer(&mut self, timer: Timer, epoch: u64, now_ms: u64) -> Vec<Effect> {
        if epoch != self.epoch {
            log_debug!("ignoring stale {timer:?} timer (epoch {epoch}, current {})", self.epoch);
            return Vec::new();
        }

        match timer {
            Timer::CountdownTick => self.countdown_tick(now_ms),
            Timer::Settle => self.settle_elapsed(now_ms),
            Timer::BackupTimeout => self.backup_timeout(now_ms),
        }
    }

    /// Detection callback. Never fails: a frame that cannot be used is skipped.
    pub fn on_detection(&mut self, detection: &DetectionFrame, now_ms: u64) -> Vec<Effect> {
        let hands = classify(&detection.hands, self.settings.swap_handedness);
        self.pipeline.observe(&hands);
        self.latest_hands = hands;

        if self.state.status != CaptureStatus::Record {
            return Vec::new();
        }

        let interval = self.settings.sampling_interval_ms();
        if let Some(last) = self.state.last_sample_at {
            if now_ms.saturating_sub(last) < interval {
                return Vec::new();
            }
        }
        // Rejected frames still consume this slot.
        self.state.last_sample_at = Some(now_ms);

        let resolved = self
            .pipeline
            .resolve(&self.latest_hands, &self.settings.acceptance);
        if resolved.is_empty() {
            log_debug!("frame at {}ms rejected: no usable hand", detection.timestamp_ms);
            return Vec::new();
        }
        if !resolved.substituted.is_empty() {
            log_debug!(
                "frame at {}ms filled from last-known {:?}",
                detection.timestamp_ms, resolved.substituted
            );
        }

        let frame = self.filtered_frame(detection, resolved.left, resolved.right);
        self.state.session.frames.push(frame);

        if self.state.session.frames.len() >= self.settings.target_frame_count {
            return self.complete_capture(now_ms);
        }
        Vec::new()
    }

    fn filtered_frame(
        &mut self,
        detection: &DetectionFrame,
        left: Vec<Landmark>,
        right: Vec<Landmark>,
    ) -> Frame {
        let ts = detection.timestamp_ms;
        let tracked = self.settings.tracked_groups;

        let pose = match (&detection.pose, tracked.pose) {
            (Some(pose), true) => self.filters.filter_landmarks(LandmarkGroup::Pose, pose, ts),
            _ => Vec::new(),
        };
        let face = match (&detection.face, tracked.face) {
            (Some(face), true) => self.filters.filter_landmarks(LandmarkGroup::Face, face, ts),
            _ => Vec::new(),
        };

        Frame {
            timestamp_ms: ts,
            left_hand: self.filters.filter_landmarks(LandmarkGroup::LeftHand, &left, ts),
            right_hand: self.filters.filter_landmarks(LandmarkGroup::RightHand, &right, ts),
            pose,
            face,
        }
    }

    fn complete_capture(&mut self, now_ms: u64) -> Vec<Effect> {
        let frames = mem::take(&mut self.state.session.frames);
        let metrics: QualityMetrics = metrics::summarize(&frames);
        let session_id = self.state.session.session_id.clone().unwrap_or_default();

        let sample = Sample {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            metadata: self.state.metadata(),
            frames,
            metrics,
            created_at: Utc::now(),
        };

        self.state.stop_clock();
        self.state.session.captures_completed += 1;
        self.next_epoch();

        let completed = self.state.session.captures_completed;
        let requested = self.state.session.captures_requested;
        log_info!(
            "capture {completed}/{requested} complete: sample {} ({} frames, {:.1}% with hands)",
            sample.id,
            sample.frames.len(),
            sample.metrics.percent_frames_with_hands
        );

        let mut effects = vec![Effect::CancelTimers, Effect::SampleCompleted(sample)];

        if !self.state.session.batch_done() {
            self.state.status = CaptureStatus::Settling;
            effects.push(self.changed(now_ms));
            effects.push(Effect::Schedule {
                timer: Timer::Settle,
                epoch: self.epoch,
                delay_ms: self.settings.settle_delay_ms,
            });
            return effects;
        }

        log_info!("capture session {session_id} finished ({completed} samples)");
        self.state.status = CaptureStatus::Idle;
        self.state.session.clear();
        // Same performer, next action.
        self.state.action_label.clear();
        self.state.dialect = None;

        effects.push(Effect::BatchCompleted {
            session_id,
            captures: completed,
        });
        effects.push(self.changed(now_ms));
        effects
    }

    fn settle_elapsed(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.state.status != CaptureStatus::Settling {
            return Vec::new();
        }
        self.begin_countdown(now_ms)
    }

    fn backup_timeout(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.state.status != CaptureStatus::Record {
            return Vec::new();
        }

        let buffered_frames = self.state.session.frames.len();
        log_warn!(
            "recording stalled after {}ms with {}/{} frames; stopping capture",
            self.state.current_active_ms(now_ms),
            buffered_frames,
            self.settings.target_frame_count
        );

        let mut effects = self.reset_to_idle(now_ms);
        effects.insert(1, Effect::RecordingStalled { buffered_frames });
        effects
    }

    pub fn pause(&mut self, now_ms: u64) -> Result<Vec<Effect>> {
        if self.state.status != CaptureStatus::Record {
            return Err(CaptureError::InvalidState {
                action: "pause",
                state: self.state.status,
            }
            .into());
        }

        self.state.freeze_clock(now_ms);
        self.state.status = CaptureStatus::Paused;
        self.next_epoch();
        log_info!(
            "capture paused with {}/{} frames",
            self.buffered_frames(),
            self.settings.target_frame_count
        );

        Ok(vec![Effect::CancelTimers, self.changed(now_ms)])
    }

    pub fn resume(&mut self, now_ms: u64) -> Result<Vec<Effect>> {
        if self.state.status != CaptureStatus::Paused {
            return Err(CaptureError::InvalidState {
                action: "resume",
                state: self.state.status,
            }
            .into());
        }

        self.state.status = CaptureStatus::Record;
        self.state.record_anchor = Some(now_ms);
        // The pause must not read as elapsed sampling time.
        self.state.last_sample_at = Some(now_ms);
        let epoch = self.next_epoch();
        let remaining = self
            .settings
            .backup_timeout_ms
            .saturating_sub(self.state.active_ms_baseline);
        log_info!("capture resumed");

        Ok(vec![
            self.changed(now_ms),
            Effect::Schedule {
                timer: Timer::BackupTimeout,
                epoch,
                delay_ms: remaining,
            },
        ])
    }

    /// Drops the current capture and returns to idle, keeping the identity
    /// fields so the user can start over right away.
    pub fn restart(&mut self, now_ms: u64) -> Result<Vec<Effect>> {
        match self.state.status {
            CaptureStatus::Idle => Ok(Vec::new()),
            CaptureStatus::Countdown | CaptureStatus::Record | CaptureStatus::Paused => {
                log_info!("capture restarted; {} frames discarded", self.buffered_frames());
                Ok(self.reset_to_idle(now_ms))
            }
            state => Err(CaptureError::InvalidState {
                action: "restart",
                state,
            }
            .into()),
        }
    }

    /// Cancels whatever is active. No-op when idle.
    pub fn abort(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.state.status == CaptureStatus::Idle {
            return Vec::new();
        }
        log_info!(
            "capture aborted in state {}; {} frames discarded",
            self.state.status.as_str(),
            self.buffered_frames()
        );
        self.reset_to_idle(now_ms)
    }

    /// Manual stop. Only ever succeeds once the buffer is full, which the
    /// automatic path normally handles first.
    pub fn finish(&mut self, now_ms: u64) -> Result<Vec<Effect>> {
        match self.state.status {
            CaptureStatus::Record | CaptureStatus::Paused => {
                let buffered = self.buffered_frames();
                let target = self.settings.target_frame_count;
                if buffered < target {
                    return Err(CaptureError::PrematureStop { buffered, target }.into());
                }
                Ok(self.complete_capture(now_ms))
            }
            state => Err(CaptureError::InvalidState {
                action: "finish",
                state,
            }
            .into()),
        }
    }

    fn reset_to_idle(&mut self, now_ms: u64) -> Vec<Effect> {
        self.state.status = CaptureStatus::Idle;
        self.state.countdown_remaining = 0;
        self.state.stop_clock();
        self.state.session.clear();
        self.filters.reset();
        self.next_epoch();

        vec![Effect::CancelTimers, self.changed(now_ms)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HandDetection;

    fn settings(target: usize) -> CaptureSettings {
        CaptureSettings {
            target_frame_count: target,
            ..CaptureSettings::default()
        }
    }

    fn right_hand_frame(ts: u64) -> DetectionFrame {
        let landmarks = (0..21)
            .map(|i| Landmark::new(0.4 + i as f32 * 0.01, 0.5).with_visibility(0.9))
            .collect();
        DetectionFrame {
            timestamp_ms: ts,
            hands: vec![HandDetection::new(HandSide::Right, landmarks, 0.95)],
            ..DetectionFrame::default()
        }
    }

    fn empty_frame(ts: u64) -> DetectionFrame {
        DetectionFrame {
            timestamp_ms: ts,
            ..DetectionFrame::default()
        }
    }

    /// Runs timers the way the controller would, jumping the clock forward.
    struct Harness {
        seq: CaptureSequencer,
        now: u64,
        pending: Vec<(Timer, u64, u64)>,
        samples: Vec<Sample>,
        events: Vec<Effect>,
    }

    impl Harness {
        fn new(settings: CaptureSettings) -> Self {
            Self {
                seq: CaptureSequencer::new(settings),
                now: 0,
                pending: Vec::new(),
                samples: Vec::new(),
                events: Vec::new(),
            }
        }

        fn absorb(&mut self, effects: Vec<Effect>) {
            for effect in effects {
                match effect {
                    Effect::Schedule {
                        timer,
                        epoch,
                        delay_ms,
                    } => self.pending.push((timer, epoch, self.now + delay_ms)),
                    Effect::CancelTimers => self.pending.clear(),
                    Effect::SampleCompleted(sample) => self.samples.push(sample),
                    other => self.events.push(other),
                }
            }
        }

        /// Fires every timer except the backup timeout until recording starts.
        fn run_until_recording(&mut self) {
            while self.seq.status() != CaptureStatus::Record {
                let idx = self
                    .pending
                    .iter()
                    .position(|(timer, _, _)| *timer != Timer::BackupTimeout)
                    .expect("no timer pending before recording");
                let (timer, epoch, due) = self.pending.remove(idx);
                self.now = self.now.max(due);
                let effects = self.seq.fire_timer(timer, epoch, self.now);
                self.absorb(effects);
            }
        }

        fn feed(&mut self, frame: DetectionFrame) {
            self.now = self.now.max(frame.timestamp_ms);
            let effects = self.seq.on_detection(&frame, self.now);
            self.absorb(effects);
        }

        /// Feeds right-hand detections every `spacing` ms starting now.
        fn feed_hands(&mut self, count: u64, spacing: u64) {
            let start = self.now;
            for i in 0..count {
                self.feed(right_hand_frame(start + i * spacing));
            }
        }
    }

    fn start(h: &mut Harness, captures: u32) {
        let effects = h
            .seq
            .start(CaptureRequest::new("wave", "p1").with_captures(captures), h.now)
            .unwrap();
        h.absorb(effects);
    }

    #[test]
    fn test_start_requires_identity() {
        let mut seq = CaptureSequencer::new(settings(5));
        let err = seq.start(CaptureRequest::new("  ", "p1"), 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptureError>(),
            Some(CaptureError::Validation(_))
        ));
        let err = seq.start(CaptureRequest::new("wave", ""), 0).unwrap_err();
        assert!(err.downcast_ref::<CaptureError>().is_some());
        assert_eq!(seq.status(), CaptureStatus::Idle);
    }

    #[test]
    fn test_countdown_then_record() {
        let mut h = Harness::new(settings(5));
        start(&mut h, 1);
        assert_eq!(h.seq.status(), CaptureStatus::Countdown);
        assert_eq!(h.seq.state().countdown_remaining, 3);

        h.run_until_recording();
        assert_eq!(h.now, 3000);
        let countdowns: Vec<u32> = h
            .events
            .iter()
            .filter_map(|e| match e {
                Effect::Countdown { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, vec![3, 2, 1]);
        assert!(h
            .pending
            .iter()
            .any(|(timer, _, due)| *timer == Timer::BackupTimeout && *due == 33_000));
    }

    #[test]
    fn test_detections_ignored_outside_record() {
        let mut h = Harness::new(settings(5));
        start(&mut h, 1);
        h.feed_hands(10, 100);
        assert_eq!(h.seq.buffered_frames(), 0);
    }

    #[test]
    fn test_sample_has_exact_frame_count() {
        let mut h = Harness::new(settings(12));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(50, 100);

        assert_eq!(h.samples.len(), 1);
        assert_eq!(h.samples[0].frames.len(), 12);
        assert_eq!(h.seq.buffered_frames(), 0);
        assert_eq!(h.seq.status(), CaptureStatus::Idle);
    }

    #[test]
    fn test_end_to_end_single_capture() {
        let mut settings = settings(60);
        settings.captures_per_batch = 1;
        settings.sampling_rate_hz = 10.0;
        let mut h = Harness::new(settings);
        let effects = h
            .seq
            .start(CaptureRequest::new("wave", "p1"), h.now)
            .unwrap();
        h.absorb(effects);
        h.run_until_recording();

        // 10ms detector spacing against a 100ms gate: every 10th frame is stored.
        h.feed_hands(600, 10);

        assert_eq!(h.samples.len(), 1);
        let sample = &h.samples[0];
        assert_eq!(sample.frames.len(), 60);
        assert_eq!(sample.metadata.action_label, "wave");
        assert_eq!(sample.metadata.performer_id, "p1");
        let spacing: Vec<u64> = sample
            .frames
            .windows(2)
            .map(|w| w[1].timestamp_ms - w[0].timestamp_ms)
            .collect();
        assert!(spacing.iter().all(|&gap| gap == 100));
        assert_eq!(sample.metrics.frames_accepted, 60);

        let payload = crate::upload::CapturedSessionPayload::from(sample);
        assert_eq!(payload.user, "p1");
        assert_eq!(payload.label, "wave");
        assert_eq!(payload.frames.len(), 60);
    }

    #[test]
    fn test_gate_spacing_with_short_stream() {
        let mut h = Harness::new(settings(60));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(200, 10);
        assert!(h.samples.is_empty());
        assert_eq!(h.seq.buffered_frames(), 20);
    }

    #[test]
    fn test_first_frame_after_countdown_is_eligible() {
        let mut h = Harness::new(settings(5));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed(right_hand_frame(h.now));
        assert_eq!(h.seq.buffered_frames(), 1);
    }

    #[test]
    fn test_rejected_frames_advance_clock() {
        let mut h = Harness::new(settings(5));
        start(&mut h, 1);
        h.run_until_recording();
        let t0 = h.now;

        h.feed(empty_frame(t0));
        h.feed(right_hand_frame(t0 + 50));
        assert_eq!(h.seq.buffered_frames(), 0);
        h.feed(right_hand_frame(t0 + 100));
        assert_eq!(h.seq.buffered_frames(), 1);
    }

    #[test]
    fn test_transient_loss_uses_last_known_hand() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        // Presence builds up during the countdown.
        h.feed_hands(5, 100);
        h.run_until_recording();
        let t0 = h.now;

        h.feed(empty_frame(t0));
        assert_eq!(h.seq.buffered_frames(), 1);
        assert_eq!(h.seq.state().session.frames[0].right_hand.len(), 21);
    }

    #[test]
    fn test_manual_stop_rejected_when_short() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(4, 100);

        let err = h.seq.finish(h.now).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CaptureError>(),
            Some(&CaptureError::PrematureStop {
                buffered: 4,
                target: 10
            })
        );
        assert_eq!(h.seq.status(), CaptureStatus::Record);
        assert_eq!(h.seq.buffered_frames(), 4);

        let effects = h.seq.pause(h.now).unwrap();
        h.absorb(effects);
        assert!(h.seq.finish(h.now).is_err());
        assert_eq!(h.seq.status(), CaptureStatus::Paused);
        assert!(h.samples.is_empty());
    }

    #[test]
    fn test_batch_of_three() {
        let mut h = Harness::new(settings(8));
        start(&mut h, 3);

        for round in 1..=3 {
            h.run_until_recording();
            h.feed_hands(8, 100);
            assert_eq!(h.samples.len(), round);
        }

        assert_eq!(h.samples.len(), 3);
        assert!(h.samples.iter().all(|s| s.frames.len() == 8));
        assert!(h
            .samples
            .iter()
            .all(|s| s.metadata.action_label == "wave" && s.metadata.performer_id == "p1"));
        assert_eq!(h.seq.status(), CaptureStatus::Idle);
        assert_eq!(h.seq.state().session.captures_completed, 0);
        assert!(h.events.iter().any(|e| matches!(
            e,
            Effect::BatchCompleted { captures: 3, .. }
        )));

        // Performer kept, action cleared.
        assert_eq!(h.seq.state().performer_id, "p1");
        assert!(h.seq.state().action_label.is_empty());
    }

    #[test]
    fn test_settle_between_captures() {
        let mut h = Harness::new(settings(3));
        start(&mut h, 2);
        h.run_until_recording();
        h.feed_hands(3, 100);

        assert_eq!(h.seq.status(), CaptureStatus::Settling);
        assert_eq!(h.seq.state().session.captures_completed, 1);
        assert_eq!(h.pending.len(), 1);
        let (timer, _, due) = h.pending[0];
        assert_eq!(timer, Timer::Settle);
        assert_eq!(due, h.now + 2000);

        // Frames during the settle delay are not stored.
        h.feed(right_hand_frame(h.now + 500));
        assert_eq!(h.seq.buffered_frames(), 0);
    }

    #[test]
    fn test_pause_resume_resets_gate() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(3, 100);
        let effects = h.seq.pause(h.now).unwrap();
        h.absorb(effects);
        assert!(h.pending.is_empty());

        // Ignored while paused
        h.feed(right_hand_frame(h.now + 1000));
        assert_eq!(h.seq.buffered_frames(), 3);

        let effects = h.seq.resume(h.now).unwrap();
        h.absorb(effects);
        h.feed(right_hand_frame(h.now + 10));
        assert_eq!(h.seq.buffered_frames(), 3);
        h.feed(right_hand_frame(h.now + 100));
        assert_eq!(h.seq.buffered_frames(), 4);
    }

    #[test]
    fn test_resume_rearms_remaining_backup_budget() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        h.run_until_recording();
        h.now += 4000;
        let effects = h.seq.pause(h.now).unwrap();
        h.absorb(effects);
        h.now += 60_000;
        let effects = h.seq.resume(h.now).unwrap();
        h.absorb(effects);

        assert_eq!(h.pending.len(), 1);
        let (timer, _, due) = h.pending[0];
        assert_eq!(timer, Timer::BackupTimeout);
        assert_eq!(due, h.now + 26_000);
    }

    #[test]
    fn test_restart_discards_buffer() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 2);
        h.run_until_recording();
        h.feed_hands(4, 100);
        let effects = h.seq.pause(h.now).unwrap();
        h.absorb(effects);

        let effects = h.seq.restart(h.now).unwrap();
        h.absorb(effects);
        assert_eq!(h.seq.status(), CaptureStatus::Idle);
        assert_eq!(h.seq.buffered_frames(), 0);
        assert!(h.pending.is_empty());
        assert_eq!(h.seq.state().action_label, "wave");

        // Idempotent
        assert!(h.seq.restart(h.now).unwrap().is_empty());
    }

    #[test]
    fn test_abort_ignores_stale_timers() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        let stale = h.pending.clone();
        let effects = h.seq.abort(h.now);
        h.absorb(effects);
        assert_eq!(h.seq.status(), CaptureStatus::Idle);

        for (timer, epoch, due) in stale {
            assert!(h.seq.fire_timer(timer, epoch, due).is_empty());
        }
        assert_eq!(h.seq.status(), CaptureStatus::Idle);
        assert!(h.seq.abort(h.now).is_empty());
    }

    #[test]
    fn test_backup_timeout_forces_stop() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(2, 100);

        let (timer, epoch, due) = h.pending[0];
        assert_eq!(timer, Timer::BackupTimeout);
        h.now = due;
        let effects = h.seq.fire_timer(timer, epoch, h.now);
        h.absorb(effects);

        assert_eq!(h.seq.status(), CaptureStatus::Idle);
        assert!(h.samples.is_empty());
        assert!(h.events.iter().any(|e| matches!(
            e,
            Effect::RecordingStalled { buffered_frames: 2 }
        )));
    }

    #[test]
    fn test_swap_applies_to_stored_frames() {
        let mut s = settings(1);
        s.swap_handedness = true;
        let mut h = Harness::new(s);
        start(&mut h, 1);
        h.run_until_recording();
        h.feed(right_hand_frame(h.now));

        let frame = &h.samples[0].frames[0];
        assert_eq!(frame.left_hand.len(), 21);
        assert!(frame.right_hand.is_empty());
    }

    fn frame_with_pose(ts: u64) -> DetectionFrame {
        DetectionFrame {
            pose: Some(vec![Landmark::new(0.5, 0.4).with_visibility(0.8); 33]),
            face: Some(vec![Landmark::new(0.5, 0.2); 468]),
            ..right_hand_frame(ts)
        }
    }

    #[test]
    fn test_pose_stored_only_when_tracked() {
        let mut h = Harness::new(settings(1));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed(frame_with_pose(h.now));
        let frame = &h.samples[0].frames[0];
        assert!(frame.pose.is_empty());
        assert!(frame.face.is_empty());

        let mut s = settings(1);
        s.tracked_groups.pose = true;
        let mut h = Harness::new(s);
        start(&mut h, 1);
        h.run_until_recording();
        h.feed(frame_with_pose(h.now));
        let frame = &h.samples[0].frames[0];
        assert_eq!(frame.pose.len(), 33);
        assert!(frame.face.is_empty());
        assert_eq!(frame.right_hand.len(), 21);
    }

    #[test]
    fn test_abort_mid_record_discards_buffer() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 2);
        h.run_until_recording();
        h.feed_hands(4, 100);
        assert_eq!(h.seq.buffered_frames(), 4);

        let effects = h.seq.abort(h.now);
        h.absorb(effects);
        assert_eq!(h.seq.status(), CaptureStatus::Idle);
        assert_eq!(h.seq.buffered_frames(), 0);
        assert!(h.pending.is_empty());
        assert!(h.samples.is_empty());

        // Late detections are not stored.
        h.feed(right_hand_frame(h.now + 200));
        assert_eq!(h.seq.buffered_frames(), 0);
    }

    #[test]
    fn test_abort_while_paused() {
        let mut h = Harness::new(settings(10));
        start(&mut h, 1);
        h.run_until_recording();
        h.feed_hands(3, 100);
        let effects = h.seq.pause(h.now).unwrap();
        h.absorb(effects);

        let effects = h.seq.abort(h.now);
        assert!(matches!(
            effects.last(),
            Some(Effect::StateChanged(snapshot)) if snapshot.status == CaptureStatus::Idle
        ));
        h.absorb(effects);
        assert_eq!(h.seq.buffered_frames(), 0);
        assert!(h.samples.is_empty());
        assert!(h.seq.resume(h.now).is_err());
    }
}
