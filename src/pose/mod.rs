pub mod blazepose;
pub mod crop;
#[cfg(feature = "desktop")]
pub mod detector;
pub mod landmark;
pub mod smooth;

pub use blazepose::{BlazePoseEstimator, LandmarkModel, ModelOutput};
pub use crop::{CropRegion, RoiTracker};
#[cfg(feature = "desktop")]
pub use detector::{BlazePoseDetector, OrtLandmarkModel};
pub use landmark::{
    average_visibility, joint_name, visibility_percent, LandmarkPoint, LandmarkSet, PoseLandmark,
};
pub use smooth::{LandmarkSmoother, SmoothingParams};

use anyhow::Result;

use crate::camera::VideoFrame;

/// One frame in, at most one landmark set out. Called synchronously by the
/// feed loop, so only one inference is ever pending.
pub trait PoseEstimator {
    fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<LandmarkSet>>;
}
