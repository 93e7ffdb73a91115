use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::models::TrackedGroups;

/// One Euro parameters shared by every landmark coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub sample_rate_hz: f64,
    pub min_cutoff: f64,
    pub beta: f64,
    pub derivative_cutoff: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30.0,
            min_cutoff: 1.0,
            beta: 0.007,
            derivative_cutoff: 1.0,
        }
    }
}

/// Which hands make a frame acceptable for storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AcceptancePolicy {
    /// A hand counts when it has any landmark or any landmark with
    /// visibility at or above the threshold.
    Permissive { min_visibility: f32 },
    /// A hand counts only when some landmark reaches the threshold.
    /// Landmarks without a visibility value are treated as visible.
    Visibility { min_visibility: f32 },
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        AcceptancePolicy::Permissive {
            min_visibility: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub target_frame_count: usize,
    pub captures_per_batch: u32,
    /// Rate at which stored frames are sampled.
    pub sampling_rate_hz: f64,
    /// Rate at which the tracker is polled for live detections.
    pub detection_rate_hz: f64,
    pub filter: FilterParams,
    pub swap_handedness: bool,
    /// Display-only.
    pub mirror_preview: bool,
    pub tracked_groups: TrackedGroups,
    pub acceptance: AcceptancePolicy,
    pub countdown_steps: u32,
    pub countdown_tick_ms: u64,
    pub settle_delay_ms: u64,
    pub backup_timeout_ms: u64,
    pub preview_alpha: f32,
    pub upload_concurrency: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_frame_count: 60,
            captures_per_batch: 1,
            sampling_rate_hz: 10.0,
            detection_rate_hz: 30.0,
            filter: FilterParams::default(),
            swap_handedness: false,
            mirror_preview: true,
            tracked_groups: TrackedGroups::default(),
            acceptance: AcceptancePolicy::default(),
            countdown_steps: 3,
            countdown_tick_ms: 1000,
            settle_delay_ms: 2000,
            backup_timeout_ms: 30_000,
            preview_alpha: 0.6,
            upload_concurrency: 3,
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<()> {
        if self.target_frame_count == 0 {
            bail!("target_frame_count must be greater than zero");
        }
        if self.captures_per_batch == 0 {
            bail!("captures_per_batch must be at least 1");
        }
        if !(self.sampling_rate_hz > 0.0) {
            bail!("sampling_rate_hz must be positive");
        }
        if !(self.detection_rate_hz > 0.0) {
            bail!("detection_rate_hz must be positive");
        }
        let f = &self.filter;
        if !(f.sample_rate_hz > 0.0 && f.min_cutoff > 0.0 && f.beta > 0.0 && f.derivative_cutoff > 0.0)
        {
            bail!("filter parameters must all be positive");
        }
        if !(0.0..=1.0).contains(&self.preview_alpha) {
            bail!("preview_alpha must be within [0, 1]");
        }
        if self.upload_concurrency == 0 {
            bail!("upload_concurrency must be at least 1");
        }
        Ok(())
    }

    /// Minimum spacing between stored frames.
    pub fn sampling_interval_ms(&self) -> u64 {
        (1000.0 / self.sampling_rate_hz).round() as u64
    }

    pub fn detection_interval_ms(&self) -> u64 {
        (1000.0 / self.detection_rate_hz).round().max(1.0) as u64
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<CaptureSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<CaptureSettings>(&contents) {
                Ok(settings) if settings.validate().is_ok() => settings,
                Ok(_) | Err(_) => {
                    log::warn!(
                        "Ignoring invalid settings at {}; using defaults",
                        path.display()
                    );
                    CaptureSettings::default()
                }
            }
        } else {
            CaptureSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn capture(&self) -> CaptureSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_capture(&self, settings: CaptureSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &CaptureSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
