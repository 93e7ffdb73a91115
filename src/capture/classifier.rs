//! Left/right routing of one frame's hand detections.

use log::debug;

use crate::models::{HandDetection, HandSide, Landmark};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedHands {
    pub left: Option<Vec<Landmark>>,
    pub right: Option<Vec<Landmark>>,
}

impl ClassifiedHands {
    pub fn get(&self, side: HandSide) -> Option<&Vec<Landmark>> {
        match side {
            HandSide::Left => self.left.as_ref(),
            HandSide::Right => self.right.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: HandSide) -> &mut Option<Vec<Landmark>> {
        match side {
            HandSide::Left => &mut self.left,
            HandSide::Right => &mut self.right,
        }
    }
}

/// First detection per side wins; later same-side detections are dropped.
pub fn classify(detections: &[HandDetection], swap_enabled: bool) -> ClassifiedHands {
    let mut hands = ClassifiedHands::default();

    for detection in detections {
        let Some(side) = HandSide::from_label(&detection.handedness_label) else {
            debug!(
                "skipping detection with unknown handedness '{}'",
                detection.handedness_label
            );
            continue;
        };
        let side = if swap_enabled { side.opposite() } else { side };

        let slot = hands.slot_mut(side);
        if slot.is_none() {
            *slot = Some(detection.landmarks.clone());
        }
    }

    hands
}
