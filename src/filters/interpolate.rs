//! Display-only landmark interpolation.
//!
//! State here is never shared with the capture filter bank; what the preview
//! shows has no influence on stored frames.

use std::collections::HashMap;

use crate::models::{Landmark, LandmarkGroup};

fn lerp(previous: f32, raw: f32, alpha: f32) -> f32 {
    previous * (1.0 - alpha) + raw * alpha
}

fn lerp_optional(previous: Option<f32>, raw: Option<f32>, alpha: f32) -> Option<f32> {
    match (previous, raw) {
        (Some(prev), Some(value)) => Some(lerp(prev, value, alpha)),
        (_, raw) => raw,
    }
}

/// Moves `previous` toward `raw` by `alpha`; returns `raw` when there is no history.
pub fn interpolate(previous: Option<&Landmark>, raw: &Landmark, alpha: f32) -> Landmark {
    let Some(prev) = previous else {
        return *raw;
    };
    let alpha = alpha.clamp(0.0, 1.0);

    Landmark {
        x: lerp(prev.x, raw.x, alpha),
        y: lerp(prev.y, raw.y, alpha),
        z: lerp_optional(prev.z, raw.z, alpha),
        visibility: lerp_optional(prev.visibility, raw.visibility, alpha),
    }
}

#[derive(Debug, Clone)]
pub struct RenderInterpolator {
    alpha: f32,
    rendered: HashMap<(LandmarkGroup, usize), Landmark>,
}

impl RenderInterpolator {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            rendered: HashMap::new(),
        }
    }

    pub fn smooth(&mut self, group: LandmarkGroup, raw: &[Landmark]) -> Vec<Landmark> {
        raw.iter()
            .enumerate()
            .map(|(index, landmark)| {
                let key = (group, index);
                let next = interpolate(self.rendered.get(&key), landmark, self.alpha);
                self.rendered.insert(key, next);
                next
            })
            .collect()
    }

    /// Drops history for a group, e.g. once its hand has left the frame.
    pub fn forget(&mut self, group: LandmarkGroup) {
        self.rendered.retain(|(g, _), _| *g != group);
    }

    pub fn clear(&mut self) {
        self.rendered.clear();
    }
}
