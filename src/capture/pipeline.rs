//! Per-frame hand bookkeeping shared by every detection, recording or not:
//! presence votes, last-known landmark sets and the acceptance policy.

use crate::filters::PresenceVoter;
use crate::models::{HandSide, Landmark};
use crate::settings::AcceptancePolicy;

use super::classifier::ClassifiedHands;

#[derive(Debug, Clone, Default)]
struct HandTrack {
    voter: PresenceVoter,
    last_known: Option<Vec<Landmark>>,
}

/// Hands chosen for one stored frame, after fallback and acceptance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedHands {
    pub left: Vec<Landmark>,
    pub right: Vec<Landmark>,
    /// Sides filled from the last-known set instead of this frame's detection.
    pub substituted: Vec<HandSide>,
}

impl ResolvedHands {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandPipeline {
    left: HandTrack,
    right: HandTrack,
}

impl HandPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, side: HandSide) -> &HandTrack {
        match side {
            HandSide::Left => &self.left,
            HandSide::Right => &self.right,
        }
    }

    fn track_mut(&mut self, side: HandSide) -> &mut HandTrack {
        match side {
            HandSide::Left => &mut self.left,
            HandSide::Right => &mut self.right,
        }
    }

    /// Feeds one frame's detections into the presence history.
    pub fn observe(&mut self, hands: &ClassifiedHands) {
        for side in [HandSide::Left, HandSide::Right] {
            let detected = hands.get(side).filter(|landmarks| !landmarks.is_empty());
            let track = self.track_mut(side);
            track.voter.push(detected.is_some());
            if let Some(landmarks) = detected {
                track.last_known = Some(landmarks.clone());
            }
        }
    }

    pub fn is_present(&self, side: HandSide) -> bool {
        self.track(side).voter.is_present()
    }

    /// Applies the last-known fallback and the acceptance policy. Sides that
    /// fail the policy come back empty.
    pub fn resolve(&self, hands: &ClassifiedHands, policy: &AcceptancePolicy) -> ResolvedHands {
        let mut resolved = ResolvedHands::default();

        for side in [HandSide::Left, HandSide::Right] {
            let track = self.track(side);
            let (landmarks, substituted) = match hands.get(side) {
                Some(landmarks) if !landmarks.is_empty() => (landmarks.clone(), false),
                _ => match (&track.last_known, track.voter.is_present()) {
                    (Some(last), true) => (last.clone(), true),
                    _ => (Vec::new(), false),
                },
            };

            if !hand_accepted(&landmarks, policy) {
                continue;
            }
            if substituted {
                resolved.substituted.push(side);
            }
            match side {
                HandSide::Left => resolved.left = landmarks,
                HandSide::Right => resolved.right = landmarks,
            }
        }

        resolved
    }
}

pub fn hand_accepted(landmarks: &[Landmark], policy: &AcceptancePolicy) -> bool {
    let visible = |threshold: f32| {
        landmarks
            .iter()
            .any(|landmark| landmark.visibility.map_or(true, |v| v >= threshold))
    };

    match *policy {
        AcceptancePolicy::Permissive { min_visibility } => {
            !landmarks.is_empty() || visible(min_visibility)
        }
        AcceptancePolicy::Visibility { min_visibility } => visible(min_visibility),
    }
}
