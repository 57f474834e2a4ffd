use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{CameraBackend, CameraDescriptor, CameraError, Resolution, VideoFrame, VideoSource};

/// OpenCVを使用したカメラキャプチャ
struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度とFPSを指定してカメラを開く
    fn open(index: i32, preferred: Resolution) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, preferred.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, preferred.height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, preferred.fps as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        info!("Camera {}: {}x{} @ {} fps", index, width, height, fps);

        Ok(Self {
            capture,
            width,
            height,
        })
    }

    /// フレームを読み込む（BGR形式）
    fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// BGR Mat を 0x00RRGGBB の VideoFrame に変換
fn mat_to_frame(mat: &Mat) -> Result<VideoFrame> {
    let width = mat.cols() as usize;
    let height = mat.rows() as usize;
    let mut pixels = vec![0u32; width * height];

    for y in 0..height {
        for x in 0..width {
            let pixel = mat.at_2d::<opencv::core::Vec3b>(y as i32, x as i32)?;
            let r = pixel[2] as u32;
            let g = pixel[1] as u32;
            let b = pixel[0] as u32;
            pixels[y * width + x] = (r << 16) | (g << 8) | b;
        }
    }

    Ok(VideoFrame::new(width as u32, height as u32, pixels))
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
///
/// drop でキャプチャスレッドが停止し、デバイスが解放される。
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    frame_id: Arc<AtomicU64>,
    last_read: u64,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(index: i32, preferred: Resolution) -> Result<Self> {
        let mut camera = OpenCvCamera::open(index, preferred)?;
        let (width, height) = (camera.width, camera.height);
        let latest = Arc::new(Mutex::new(None::<VideoFrame>));
        let latest_ref = Arc::clone(&latest);
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = Arc::clone(&frame_id);
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while running_ref.load(Ordering::Relaxed) {
                match camera.read_frame().and_then(|m| mat_to_frame(&m)) {
                    Ok(frame) => {
                        if let Ok(mut slot) = latest_ref.lock() {
                            *slot = Some(frame);
                        }
                        frame_id_ref.fetch_add(1, Ordering::Release);
                    }
                    Err(e) => {
                        debug!("[cam{}] read error: {}", index, e);
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
            debug!("[cam{}] capture thread stopped", index);
        });

        Ok(Self {
            latest,
            frame_id,
            last_read: 0,
            running,
            width,
            height,
            handle: Some(handle),
        })
    }

    /// 現在のフレームID。新フレームが到着するたびにインクリメントされる。
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }
}

impl VideoSource for ThreadedCamera {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 前回から新しいフレームが届いていなければ None
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let current = self.frame_id();
        if current == self.last_read {
            return Ok(None);
        }
        let guard = self
            .latest
            .lock()
            .map_err(|_| CameraError::Backend("capture thread panicked".to_string()))?;
        self.last_read = current;
        Ok(guard.clone())
    }

    fn has_frame(&self) -> bool {
        self.frame_id() > 0
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// OpenCV camera access. Device ids are capture indices as strings.
pub struct OpenCvBackend {
    max_index: i32,
    open_timeout: Duration,
}

impl OpenCvBackend {
    pub fn new(max_index: i32) -> Self {
        Self {
            max_index,
            open_timeout: Duration::from_secs(3),
        }
    }
}

impl CameraBackend for OpenCvBackend {
    type Source = ThreadedCamera;

    fn open(&mut self, device_id: Option<&str>, preferred: Resolution) -> Result<ThreadedCamera, CameraError> {
        let index = match device_id {
            None => 0,
            Some(id) => id
                .parse::<i32>()
                .map_err(|_| CameraError::DeviceUnavailable(id.to_string()))?,
        };
        ThreadedCamera::start(index, preferred).map_err(|e| {
            warn!("camera {} failed to start: {:#}", index, e);
            CameraError::DeviceUnavailable(index.to_string())
        })
    }

    fn list_devices(&mut self) -> Result<Vec<CameraDescriptor>, CameraError> {
        let labels = system_camera_labels();
        let devices = responding_indices(self.max_index, self.open_timeout, index_opens)
            .into_iter()
            .map(|index| descriptor(index, &labels))
            .collect();
        Ok(devices)
    }
}

const OPEN_POLL: Duration = Duration::from_millis(20);

fn index_opens(index: i32) -> bool {
    VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
        .and_then(|cap| cap.is_opened())
        .unwrap_or(false)
}

/// Tries every capture index below `max_index` at once and returns, in
/// index order, those that opened within `timeout`.
///
/// A driver can block inside `VideoCapture::new` for seconds; such an
/// attempt is abandoned to its thread and the index is not listed.
fn responding_indices<F>(max_index: i32, timeout: Duration, opens: F) -> Vec<i32>
where
    F: Fn(i32) -> bool + Send + Copy + 'static,
{
    let attempts: Vec<(i32, thread::JoinHandle<bool>)> = (0..max_index)
        .map(|index| (index, thread::spawn(move || opens(index))))
        .collect();

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline && !attempts.iter().all(|(_, h)| h.is_finished()) {
        thread::sleep(OPEN_POLL);
    }

    attempts
        .into_iter()
        .filter(|(_, attempt)| attempt.is_finished())
        .filter_map(|(index, attempt)| match attempt.join() {
            Ok(true) => Some(index),
            _ => None,
        })
        .collect()
}

/// Descriptor for a capture index; the label falls back to `Camera <n>`
/// (1-based) when the system report has no entry for it.
fn descriptor(index: i32, labels: &[String]) -> CameraDescriptor {
    let label = usize::try_from(index)
        .ok()
        .and_then(|i| labels.get(i))
        .cloned()
        .unwrap_or_else(|| format!("Camera {}", index + 1));
    CameraDescriptor::new(index.to_string(), label)
}

/// macOS のカメラ名 (AVFoundation の index 順)。他の OS では空
fn system_camera_labels() -> Vec<String> {
    match Command::new("system_profiler").arg("SPCameraDataType").output() {
        Ok(out) if out.status.success() => device_labels(&String::from_utf8_lossy(&out.stdout)),
        Ok(_) | Err(_) => Vec::new(),
    }
}

/// `system_profiler SPCameraDataType` の見出し行からラベルを取り出す
///
/// インデント 0 がセクション名、4 がデバイス、6 以上がその属性。
fn device_labels(report: &str) -> Vec<String> {
    report
        .lines()
        .filter_map(|line| {
            let body = line.trim_start_matches(' ');
            let indent = line.len() - body.len();
            let heading = body.trim_end().strip_suffix(':')?;
            (indent == 4).then(|| visible_text(heading))
        })
        .filter(|label| !label.is_empty())
        .collect()
}

/// 連携カメラ (iPhone) の名前に入る方向制御文字を除く
fn visible_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && !matches!(c, '\u{200e}' | '\u{200f}' | '\u{feff}'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_labels_from_system_report() {
        let report = "Camera:\n\n    FaceTime HD Camera:\n\n      Model ID: FaceTime HD Camera\n      Unique ID: 1234\n\n    \u{200e}iPhone Camera:\n\n      Model ID: iPhone\n";
        assert_eq!(device_labels(report), vec!["FaceTime HD Camera", "iPhone Camera"]);
    }

    #[test]
    fn test_device_labels_ignore_properties_and_empty_report() {
        assert!(device_labels("").is_empty());
        assert!(device_labels("Camera:\n      Model ID: X:\n").is_empty());
    }

    #[test]
    fn test_descriptor_label_fallback() {
        let labels = vec!["FaceTime HD Camera".to_string()];
        assert_eq!(descriptor(0, &labels).label, "FaceTime HD Camera");
        let other = descriptor(2, &labels);
        assert_eq!(other.device_id, "2");
        assert_eq!(other.label, "Camera 3");
    }

    #[test]
    fn test_responding_indices_in_order() {
        let found = responding_indices(6, Duration::from_secs(2), |i| i % 2 == 0);
        assert_eq!(found, vec![0, 2, 4]);
    }

    #[test]
    fn test_responding_indices_skips_hung_device() {
        let found = responding_indices(3, Duration::from_millis(200), |i| {
            if i == 1 {
                thread::sleep(Duration::from_secs(2));
            }
            true
        });
        assert_eq!(found, vec![0, 2]);
    }
}
