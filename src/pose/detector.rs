use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::blazepose::{BlazePoseEstimator, LandmarkModel, ModelOutput};
use crate::config::ModelConfig;

/// BlazePose (full) の ONNX Runtime セッション
pub struct OrtLandmarkModel {
    session: Session,
    input_name: String,
    landmarks_output: String,
    presence_output: String,
}

impl OrtLandmarkModel {
    /// ONNXモデルを読み込んで初期化
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.path)
            .with_context(|| format!("Failed to load ONNX model {}", config.path))?;
        info!("Pose model loaded: {}", config.path);

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            landmarks_output: config.landmarks_output.clone(),
            presence_output: config.presence_output.clone(),
        })
    }
}

impl LandmarkModel for OrtLandmarkModel {
    /// 入力: [1, S, S, 3] / 出力: 195 値 + presence
    fn infer(&mut self, input: Array4<f32>) -> Result<ModelOutput> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let presence: ndarray::ArrayViewD<f32> = outputs[self.presence_output.as_str()]
            .try_extract_array()
            .context("Failed to extract presence tensor")?;
        let presence = presence.iter().next().copied().unwrap_or(0.0);

        let landmarks: ndarray::ArrayViewD<f32> = outputs[self.landmarks_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        Ok(ModelOutput {
            landmarks: landmarks.iter().copied().collect(),
            presence,
        })
    }
}

/// ROI 追跡と平滑化込みの BlazePose 検出器
pub type BlazePoseDetector = BlazePoseEstimator<OrtLandmarkModel>;

impl BlazePoseEstimator<OrtLandmarkModel> {
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let model = OrtLandmarkModel::new(config)?;
        Ok(Self::with_model(model, config))
    }
}
