//! BlazePose landmark model: input tensor layout, output decoding and the
//! per-frame tracking around it.
//!
//! Kept free of the inference runtime so it can be tested on any host; the
//! ONNX Runtime side only implements [`LandmarkModel`].

use std::time::Instant;

use anyhow::Result;
use ndarray::Array4;
use tracing::{debug, trace};

use super::crop::{CropRegion, RoiTracker};
use super::landmark::{LandmarkPoint, LandmarkSet, PoseLandmark};
use super::smooth::{LandmarkSmoother, SmoothingParams};
use super::PoseEstimator;
use crate::camera::VideoFrame;
use crate::config::ModelConfig;

/// 33 body landmarks + 6 auxiliary points
pub const OUTPUT_POINTS: usize = 39;
/// x, y, z, visibility, presence
pub const VALUES_PER_POINT: usize = 5;
pub const OUTPUT_LEN: usize = OUTPUT_POINTS * VALUES_PER_POINT;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// VideoFrame の `region` 部分を [1, size, size, 3] の RGB テンソル (0.0〜1.0) に変換
///
/// フレーム外にはみ出した部分は黒。最近傍サンプリング。
pub fn preprocess(frame: &VideoFrame, region: &CropRegion, size: usize) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    if frame.width == 0 || frame.height == 0 || size == 0 {
        return tensor;
    }

    let fw = frame.width as usize;
    let fh = frame.height as usize;
    let step = 1.0 / size as f32;
    for y in 0..size {
        let ny = region.y + (y as f32 + 0.5) * step * region.height;
        let sy = (ny * fh as f32).floor();
        if sy < 0.0 || sy >= fh as f32 {
            continue;
        }
        let sy = sy as usize;
        for x in 0..size {
            let nx = region.x + (x as f32 + 0.5) * step * region.width;
            let sx = (nx * fw as f32).floor();
            if sx < 0.0 || sx >= fw as f32 {
                continue;
            }
            let pixel = frame.pixels[sy * fw + sx as usize];
            tensor[[0, y, x, 0]] = ((pixel >> 16) & 0xFF) as f32 / 255.0;
            tensor[[0, y, x, 1]] = ((pixel >> 8) & 0xFF) as f32 / 255.0;
            tensor[[0, y, x, 2]] = (pixel & 0xFF) as f32 / 255.0;
        }
    }
    tensor
}

/// モデル出力 (入力画素座標) をフレームの正規化座標の 33 点に変換
///
/// 出力が短すぎる場合は None (姿勢なし扱い)。
pub fn decode_landmarks(raw: &[f32], input_size: usize, region: &CropRegion) -> Option<LandmarkSet> {
    if raw.len() < PoseLandmark::COUNT * VALUES_PER_POINT || input_size == 0 {
        return None;
    }
    let scale = input_size as f32;
    let points = raw
        .chunks_exact(VALUES_PER_POINT)
        .take(PoseLandmark::COUNT)
        .map(|v| {
            let in_crop = LandmarkPoint::new(
                v[0] / scale,
                v[1] / scale,
                v[2] / scale,
                Some(sigmoid(v[3])),
            );
            region.to_frame(&in_crop)
        })
        .collect();
    Some(LandmarkSet::new(points))
}

/// One forward pass of the landmark network.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Raw `OUTPUT_LEN` values in input pixels.
    pub landmarks: Vec<f32>,
    /// Pose presence score in [0, 1].
    pub presence: f32,
}

/// The inference runtime behind [`BlazePoseEstimator`].
pub trait LandmarkModel {
    fn infer(&mut self, input: Array4<f32>) -> Result<ModelOutput>;
}

/// Crop → infer → map back → smooth, with the crop following the person.
pub struct BlazePoseEstimator<M> {
    model: M,
    input_size: usize,
    min_presence: f32,
    roi: RoiTracker,
    smoother: Option<LandmarkSmoother>,
}

impl<M: LandmarkModel> BlazePoseEstimator<M> {
    pub fn with_model(model: M, config: &ModelConfig) -> Self {
        let smoother = config.smooth_landmarks.then(|| {
            LandmarkSmoother::new(SmoothingParams::new(
                config.smoothing_min_cutoff,
                config.smoothing_beta,
            ))
        });
        Self {
            model,
            input_size: config.input_size,
            min_presence: config.min_presence,
            roi: RoiTracker::new(config.min_tracking_confidence),
            smoother,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Whether the next frame is cropped around the last pose.
    pub fn is_tracking(&self) -> bool {
        self.roi.is_tracking()
    }

    fn lose_track(&mut self) {
        if self.roi.is_tracking() {
            debug!("pose lost, searching whole frame");
        }
        self.roi.reset();
        if let Some(smoother) = &mut self.smoother {
            smoother.reset();
        }
    }

    fn run(&mut self, frame: &VideoFrame, now: Instant) -> Result<Option<LandmarkSet>> {
        let region = self.roi.region(frame.width, frame.height);
        let input = preprocess(frame, &region, self.input_size);
        let output = match self.model.infer(input) {
            Ok(output) => output,
            Err(e) => {
                self.lose_track();
                return Err(e);
            }
        };

        if output.presence < self.min_presence {
            trace!(presence = output.presence, "no pose");
            self.lose_track();
            return Ok(None);
        }
        let Some(set) = decode_landmarks(&output.landmarks, self.input_size, &region) else {
            self.lose_track();
            return Ok(None);
        };

        self.roi.update(Some(&set), frame.width, frame.height);
        let set = match &mut self.smoother {
            Some(smoother) => smoother.apply(set, now),
            None => set,
        };
        Ok(Some(set))
    }
}

impl<M: LandmarkModel> PoseEstimator for BlazePoseEstimator<M> {
    fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<LandmarkSet>> {
        self.run(frame, Instant::now())
    }
}
