pub mod landmark;
pub mod sample;

pub use landmark::{
    DetectionFrame, Frame, HandDetection, HandSide, Landmark, LandmarkGroup, TrackedGroups,
};
pub use sample::{Sample, SampleMetadata};
