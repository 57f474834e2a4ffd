use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::bridge::TransportConfig;
use crate::camera::Resolution;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// OSC送信先と受信用ローカルポート
#[derive(Debug, Deserialize, Clone)]
pub struct OscConfig {
    #[serde(default = "default_local_address")]
    pub local_address: String,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_remote_address")]
    pub remote_address: String,
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    #[serde(default = "default_true")]
    pub metadata: bool,
}

fn default_local_address() -> String { "0.0.0.0".to_string() }
fn default_local_port() -> u16 { 57121 }
fn default_remote_address() -> String { "127.0.0.1".to_string() }
fn default_remote_port() -> u16 { 8000 }
fn default_true() -> bool { true }

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            local_address: default_local_address(),
            local_port: default_local_port(),
            remote_address: default_remote_address(),
            remote_port: default_remote_port(),
            metadata: default_true(),
        }
    }
}

impl OscConfig {
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            local_address: self.local_address.clone(),
            local_port: self.local_port,
            remote_address: self.remote_address.clone(),
            remote_port: self.remote_port,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// 起動時に使うデバイスID (未指定なら列挙結果の先頭)
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
    /// 列挙時にプローブするindexの上限
    #[serde(default = "default_max_probe_index")]
    pub max_probe_index: i32,
    #[serde(default = "default_first_frame_timeout_ms")]
    pub first_frame_timeout_ms: u64,
}

fn default_camera_width() -> u32 { 1280 }
fn default_camera_height() -> u32 { 720 }
fn default_camera_fps() -> u32 { 30 }
fn default_max_probe_index() -> i32 { 8 }
fn default_first_frame_timeout_ms() -> u64 { 3000 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
            max_probe_index: default_max_probe_index(),
            first_frame_timeout_ms: default_first_frame_timeout_ms(),
        }
    }
}

impl CameraConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.first_frame_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    #[serde(default = "default_presence_output")]
    pub presence_output: String,
    /// これ未満のpresenceは「姿勢なし」
    #[serde(default = "default_min_presence")]
    pub min_presence: f32,
    /// 平均可視度がこれ以上なら次フレームは前回の人物周辺だけを推論
    #[serde(default = "default_min_tracking_confidence")]
    pub min_tracking_confidence: f32,
    #[serde(default = "default_true")]
    pub smooth_landmarks: bool,
    /// One Euro Filter: 静止時のカットオフ [Hz]
    #[serde(default = "default_smoothing_min_cutoff")]
    pub smoothing_min_cutoff: f32,
    /// One Euro Filter: 速度係数
    #[serde(default = "default_smoothing_beta")]
    pub smoothing_beta: f32,
}

fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_size() -> usize { 256 }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmarks_output() -> String { "Identity".to_string() }
fn default_presence_output() -> String { "Identity_1".to_string() }
fn default_min_presence() -> f32 { 0.5 }
fn default_min_tracking_confidence() -> f32 { 0.5 }
fn default_smoothing_min_cutoff() -> f32 { 1.0 }
fn default_smoothing_beta() -> f32 { 10.0 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_size: default_input_size(),
            input_name: default_input_name(),
            landmarks_output: default_landmarks_output(),
            presence_output: default_presence_output(),
            min_presence: default_min_presence(),
            min_tracking_confidence: default_min_tracking_confidence(),
            smooth_landmarks: default_true(),
            smoothing_min_cutoff: default_smoothing_min_cutoff(),
            smoothing_beta: default_smoothing_beta(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_true")]
    pub draw_skeleton: bool,
    #[serde(default = "default_true")]
    pub draw_landmarks: bool,
    #[serde(default = "default_target_fps")]
    pub target_fps: usize,
    #[serde(default = "default_window_width")]
    pub window_width: usize,
    #[serde(default = "default_window_height")]
    pub window_height: usize,
}

fn default_target_fps() -> usize { 60 }
fn default_window_width() -> usize { 1280 }
fn default_window_height() -> usize { 900 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            draw_skeleton: true,
            draw_landmarks: true,
            target_fps: default_target_fps(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_request_timeout_ms() -> u64 { 2000 }
fn default_queue_capacity() -> usize { 1024 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// ログファイルの出力先。空文字ならファイル出力なし
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_directory() -> String { "logs".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// ファイルがなければデフォルト、壊れていれば警告してデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                // logging is not up yet at this point
                eprintln!("{e}; using defaults");
                Self::default()
            }
        }
    }
}
