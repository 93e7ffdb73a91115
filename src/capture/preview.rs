//! Live preview consumer. Reads classified hands and presence flags, keeps its
//! own interpolation state, and produces a frame for on-screen feedback only.

use serde::Serialize;

use crate::filters::RenderInterpolator;
use crate::models::{HandSide, Landmark};

use super::classifier::ClassifiedHands;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFrame {
    pub left_hand: Vec<Landmark>,
    pub right_hand: Vec<Landmark>,
    pub left_present: bool,
    pub right_present: bool,
    #[serde(skip)]
    pub image_ref: Option<u64>,
}

pub struct PreviewRenderer {
    interpolator: RenderInterpolator,
    mirror: bool,
}

impl PreviewRenderer {
    pub fn new(alpha: f32, mirror: bool) -> Self {
        Self {
            interpolator: RenderInterpolator::new(alpha),
            mirror,
        }
    }

    pub fn render(
        &mut self,
        hands: &ClassifiedHands,
        presence: [bool; 2],
        image_ref: Option<u64>,
    ) -> PreviewFrame {
        let [left_present, right_present] = presence;
        PreviewFrame {
            left_hand: self.smooth_side(HandSide::Left, hands),
            right_hand: self.smooth_side(HandSide::Right, hands),
            left_present,
            right_present,
            image_ref,
        }
    }

    fn smooth_side(&mut self, side: HandSide, hands: &ClassifiedHands) -> Vec<Landmark> {
        let group = side.group();
        match hands.get(side) {
            Some(raw) if !raw.is_empty() => {
                let mut smoothed = self.interpolator.smooth(group, raw);
                if self.mirror {
                    for landmark in &mut smoothed {
                        landmark.x = 1.0 - landmark.x;
                    }
                }
                smoothed
            }
            _ => {
                self.interpolator.forget(group);
                Vec::new()
            }
        }
    }

    pub fn reset(&mut self) {
        self.interpolator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_only_affects_display() {
        let raw = vec![Landmark::new(0.2, 0.3)];
        let hands = ClassifiedHands {
            left: Some(raw.clone()),
            right: None,
        };
        let mut renderer = PreviewRenderer::new(0.5, true);
        let frame = renderer.render(&hands, [true, false], Some(7));

        assert!((frame.left_hand[0].x - 0.8).abs() < 1e-6);
        assert!(frame.right_hand.is_empty());
        assert!(frame.left_present && !frame.right_present);
        assert_eq!(frame.image_ref, Some(7));
        // Input untouched
        assert_eq!(hands.left.as_deref(), Some(raw.as_slice()));
    }

    #[test]
    fn test_smoothing_restarts_after_hand_leaves() {
        let mut renderer = PreviewRenderer::new(0.5, false);
        let at = |x: f32| ClassifiedHands {
            left: None,
            right: Some(vec![Landmark::new(x, x)]),
        };

        renderer.render(&at(0.0), [false, true], None);
        let moved = renderer.render(&at(1.0), [false, true], None);
        assert!((moved.right_hand[0].x - 0.5).abs() < 1e-6);

        renderer.render(&ClassifiedHands::default(), [false, false], None);
        let back = renderer.render(&at(1.0), [false, true], None);
        assert_eq!(back.right_hand[0].x, 1.0);
    }
}
