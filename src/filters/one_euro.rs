//! One Euro Filter - adaptive low-pass filter for landmark jitter
//!
//! Smooth when the hand is still, responsive when it moves. One filter per
//! landmark coordinate; `FilterBank` owns them keyed by group/index/axis.
//!
//! NaN input is not guarded: it propagates through the filter state and the
//! affected key keeps returning NaN until the bank is reset.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::models::{Landmark, LandmarkGroup};
use crate::settings::FilterParams;

/// Adaptive low-pass filter for a single scalar signal.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    /// Expected sampling rate (Hz), used when timestamps do not advance
    nominal_rate_hz: f64,
    /// Current sampling rate estimate (Hz), refreshed from timestamps
    rate_hz: f64,
    /// Minimum cutoff frequency (Hz) - lower = smoother at rest
    min_cutoff: f64,
    /// Speed coefficient - higher = less lag during fast motion
    beta: f64,
    /// Derivative cutoff frequency (Hz)
    d_cutoff: f64,

    // State
    x_prev: f64,
    dx_prev: f64,
    t_prev_ms: u64,
    initialized: bool,
}

impl OneEuroFilter {
    pub fn new(sample_rate_hz: f64, min_cutoff: f64, beta: f64, derivative_cutoff: f64) -> Self {
        Self {
            nominal_rate_hz: sample_rate_hz,
            rate_hz: sample_rate_hz,
            min_cutoff,
            beta,
            d_cutoff: derivative_cutoff,
            x_prev: 0.0,
            dx_prev: 0.0,
            t_prev_ms: 0,
            initialized: false,
        }
    }

    pub fn from_params(params: &FilterParams) -> Self {
        Self::new(
            params.sample_rate_hz,
            params.min_cutoff,
            params.beta,
            params.derivative_cutoff,
        )
    }

    fn smoothing_factor(rate_hz: f64, cutoff: f64) -> f64 {
        let tau = 1.0 / (2.0 * PI * cutoff);
        let te = 1.0 / rate_hz;
        1.0 / (1.0 + tau / te)
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Filter one value observed at `timestamp_ms`.
    pub fn filter(&mut self, raw: f32, timestamp_ms: u64) -> f32 {
        let x = f64::from(raw);
        if !self.initialized {
            self.x_prev = x;
            self.dx_prev = 0.0;
            self.t_prev_ms = timestamp_ms;
            self.initialized = true;
            return raw;
        }

        self.rate_hz = if timestamp_ms > self.t_prev_ms {
            1000.0 / (timestamp_ms - self.t_prev_ms) as f64
        } else {
            self.nominal_rate_hz
        };

        // 1. Estimate derivative (velocity)
        let dx = (x - self.x_prev) * self.rate_hz;
        let a_d = Self::smoothing_factor(self.rate_hz, self.d_cutoff);
        let dx_hat = a_d * dx + (1.0 - a_d) * self.dx_prev;

        // 2. Adaptive cutoff
        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let a = Self::smoothing_factor(self.rate_hz, cutoff);

        // 3. Apply filter
        let x_hat = a * x + (1.0 - a) * self.x_prev;

        self.x_prev = x_hat;
        self.dx_prev = dx_hat;
        self.t_prev_ms = timestamp_ms;

        x_hat as f32
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterKey {
    pub group: LandmarkGroup,
    pub index: usize,
    pub axis: Axis,
}

/// Lazily-populated set of filters, one per landmark coordinate.
#[derive(Debug, Clone)]
pub struct FilterBank {
    params: FilterParams,
    filters: HashMap<FilterKey, OneEuroFilter>,
}

impl FilterBank {
    pub fn new(params: FilterParams) -> Self {
        Self {
            params,
            filters: HashMap::new(),
        }
    }

    pub fn filter_value(&mut self, key: FilterKey, raw: f32, timestamp_ms: u64) -> f32 {
        let params = &self.params;
        self.filters
            .entry(key)
            .or_insert_with(|| OneEuroFilter::from_params(params))
            .filter(raw, timestamp_ms)
    }

    /// Filters x, y and (when present) z; visibility passes through untouched.
    pub fn filter_landmarks(
        &mut self,
        group: LandmarkGroup,
        landmarks: &[Landmark],
        timestamp_ms: u64,
    ) -> Vec<Landmark> {
        landmarks
            .iter()
            .enumerate()
            .map(|(index, landmark)| {
                let key = |axis| FilterKey { group, index, axis };
                Landmark {
                    x: self.filter_value(key(Axis::X), landmark.x, timestamp_ms),
                    y: self.filter_value(key(Axis::Y), landmark.y, timestamp_ms),
                    z: landmark
                        .z
                        .map(|z| self.filter_value(key(Axis::Z), z, timestamp_ms)),
                    visibility: landmark.visibility,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn reset(&mut self) {
        self.filters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> OneEuroFilter {
        OneEuroFilter::new(30.0, 1.0, 0.007, 1.0)
    }

    #[test]
    fn test_first_call_is_identity() {
        let mut f = filter();
        assert_eq!(f.filter(0.4321, 1000), 0.4321);
    }

    #[test]
    fn test_constant_signal_converges() {
        let mut f = filter();
        f.filter(0.0, 0);

        let target = 1.0f32;
        let mut last_gap = f32::INFINITY;
        for step in 1..=10u64 {
            let out = f.filter(target, step * 33);
            let gap = (target - out).abs();
            assert!(gap < last_gap, "step {step}: gap {gap} did not shrink from {last_gap}");
            last_gap = gap;
        }
        assert!(last_gap < 0.5);
    }

    #[test]
    fn test_repeated_constant_is_stable() {
        let mut f = filter();
        for step in 0..6u64 {
            assert!((f.filter(0.25, step * 33) - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_increasing_timestamp_does_not_blow_up() {
        let mut f = filter();
        f.filter(0.5, 100);
        let out = f.filter(0.6, 100);
        assert!(out.is_finite());
        assert!((0.5..=0.6).contains(&out));
        let out = f.filter(0.6, 50);
        assert!(out.is_finite());
    }

    #[test]
    fn test_stalled_clock_uses_nominal_rate() {
        let mut slow = OneEuroFilter::new(10.0, 1.0, 0.0, 1.0);
        let mut fast = OneEuroFilter::new(1000.0, 1.0, 0.0, 1.0);
        slow.filter(0.0, 500);
        fast.filter(0.0, 500);

        let slow_out = slow.filter(1.0, 500);
        let fast_out = fast.filter(1.0, 500);
        assert_eq!(slow.rate_hz(), 10.0);
        assert_eq!(fast.rate_hz(), 1000.0);
        // A longer assumed gap lets the value move further.
        assert!(slow_out > fast_out);

        slow.filter(1.0, 600);
        assert!((slow.rate_hz() - 10.0).abs() < 1e-9);
        slow.filter(1.0, 625);
        assert!((slow.rate_hz() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_propagates() {
        let mut f = filter();
        f.filter(0.5, 0);
        assert!(f.filter(f32::NAN, 33).is_nan());
    }

    #[test]
    fn test_bank_keys_are_independent() {
        let mut bank = FilterBank::new(FilterParams::default());
        let left = vec![Landmark::new(0.1, 0.2).with_z(0.0)];
        let right = vec![Landmark::new(0.9, 0.8)];

        let out_left = bank.filter_landmarks(LandmarkGroup::LeftHand, &left, 0);
        let out_right = bank.filter_landmarks(LandmarkGroup::RightHand, &right, 0);

        assert_eq!(out_left, left);
        assert_eq!(out_right, right);
        // x, y, z for the left hand plus x, y for the right hand
        assert_eq!(bank.len(), 5);

        bank.reset();
        assert!(bank.is_empty());
    }

    #[test]
    fn test_bank_keeps_visibility() {
        let mut bank = FilterBank::new(FilterParams::default());
        let raw = vec![Landmark::new(0.3, 0.3).with_visibility(0.7)];
        bank.filter_landmarks(LandmarkGroup::RightHand, &raw, 0);
        let moved = vec![Landmark::new(0.5, 0.5).with_visibility(0.9)];
        let out = bank.filter_landmarks(LandmarkGroup::RightHand, &moved, 100);
        assert_eq!(out[0].visibility, Some(0.9));
        assert!(out[0].x > 0.3 && out[0].x < 0.5);
    }
}
