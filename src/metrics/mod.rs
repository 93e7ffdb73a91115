//! Post-hoc quality summary over a captured frame sequence.

mod types;

pub use types::QualityMetrics;

use crate::models::Frame;

pub fn summarize(frames: &[Frame]) -> QualityMetrics {
    if frames.is_empty() {
        return QualityMetrics::default();
    }

    let collected = frames.len();
    let mut accepted = 0usize;
    let mut hand_landmarks = 0usize;
    let mut confidence_sum = 0.0f64;
    let mut confidence_count = 0usize;

    for frame in frames {
        let count = frame.hand_landmark_count();
        hand_landmarks += count;
        if count > 0 {
            accepted += 1;
        }

        for landmark in frame.left_hand.iter().chain(frame.right_hand.iter()) {
            if let Some(visibility) = landmark.visibility {
                confidence_sum += f64::from(visibility);
                confidence_count += 1;
            }
        }
    }

    let avg_confidence = if confidence_count > 0 {
        Some((confidence_sum / confidence_count as f64) as f32)
    } else {
        None
    };

    QualityMetrics {
        frames_collected: collected,
        frames_accepted: accepted,
        avg_hand_landmarks_per_frame: hand_landmarks as f32 / collected as f32,
        percent_frames_with_hands: accepted as f32 / collected as f32 * 100.0,
        avg_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Landmark;

    fn frame_with_hand(count: usize, visibility: Option<f32>) -> Frame {
        let landmark = Landmark {
            visibility,
            ..Landmark::new(0.5, 0.5)
        };
        Frame {
            right_hand: vec![landmark; count],
            ..Frame::default()
        }
    }

    #[test]
    fn test_partial_hand_coverage() {
        let mut frames: Vec<Frame> = (0..7).map(|_| frame_with_hand(21, None)).collect();
        frames.extend((0..3).map(|_| Frame::default()));

        let metrics = summarize(&frames);
        assert_eq!(metrics.frames_collected, 10);
        assert_eq!(metrics.frames_accepted, 7);
        assert!((metrics.percent_frames_with_hands - 70.0).abs() < 1e-4);
        assert!((metrics.avg_hand_landmarks_per_frame - 14.7).abs() < 1e-4);
    }

    #[test]
    fn test_confidence_omitted_without_visibility() {
        let frames = vec![frame_with_hand(21, None); 4];
        assert_eq!(summarize(&frames).avg_confidence, None);
    }

    #[test]
    fn test_confidence_only_counts_visible_landmarks() {
        let mut frame = frame_with_hand(2, Some(0.8));
        frame.left_hand = vec![Landmark::new(0.1, 0.1), Landmark::new(0.2, 0.2).with_visibility(0.2)];

        let metrics = summarize(&[frame]);
        let confidence = metrics.avg_confidence.unwrap();
        assert!((confidence - 0.6).abs() < 1e-5, "got {confidence}");
    }

    #[test]
    fn test_empty_sequence() {
        let metrics = summarize(&[]);
        assert_eq!(metrics, QualityMetrics::default());
    }
}
