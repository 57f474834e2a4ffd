#[cfg(feature = "desktop")]
pub mod capture;
pub mod selector;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvBackend, ThreadedCamera};
pub use selector::CameraSelector;

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera {0} is not available")]
    DeviceUnavailable(String),
    #[error("no camera found")]
    NoDevice,
    #[error("camera {device} produced no frame within {timeout:?}")]
    NoFrame { device: String, timeout: Duration },
    #[error("camera backend error: {0}")]
    Backend(String),
}

/// 列挙されたカメラ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    pub device_id: String,
    pub label: String,
}

impl CameraDescriptor {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// 0x00RRGGBB 形式のフレーム
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        Self::new(width, height, vec![color; width as usize * height as usize])
    }
}

/// An open camera stream. Dropping it releases the device.
pub trait VideoSource {
    fn resolution(&self) -> (u32, u32);

    /// Newest frame not yet returned, or `None` when nothing new has arrived.
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Block until the first frame is available.
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), CameraError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_frame() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CameraError::NoFrame {
                    device: "stream".to_string(),
                    timeout,
                });
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Whether at least one frame has arrived since the stream opened.
    fn has_frame(&self) -> bool;
}

/// Platform camera access.
pub trait CameraBackend {
    type Source: VideoSource;

    /// `None` opens the system default device.
    fn open(&mut self, device_id: Option<&str>, preferred: Resolution) -> Result<Self::Source, CameraError>;

    /// Video input devices in platform order.
    fn list_devices(&mut self) -> Result<Vec<CameraDescriptor>, CameraError>;

    /// Open and immediately release a stream so the platform grants access
    /// and exposes device labels.
    fn request_access(&mut self) -> Result<(), CameraError> {
        self.open(None, Resolution::default()).map(drop)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory camera used by session and selector tests.

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Default)]
    pub struct FakeLog {
        pub opened: Vec<Option<String>>,
        pub dropped: usize,
    }

    pub struct FakeSource {
        pub device: Option<String>,
        pub width: u32,
        pub height: u32,
        pub pending: bool,
        log: Rc<RefCell<FakeLog>>,
    }

    impl VideoSource for FakeSource {
        fn resolution(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            if self.pending {
                Ok(Some(VideoFrame::filled(self.width, self.height, 0x202020)))
            } else {
                Ok(None)
            }
        }

        fn has_frame(&self) -> bool {
            true
        }
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            self.log.borrow_mut().dropped += 1;
        }
    }

    pub struct FakeBackend {
        pub devices: Vec<CameraDescriptor>,
        pub fail_open: Option<CameraError>,
        pub deliver_frames: bool,
        pub log: Rc<RefCell<FakeLog>>,
    }

    impl FakeBackend {
        pub fn with_devices(ids: &[&str]) -> Self {
            Self {
                devices: ids
                    .iter()
                    .map(|id| CameraDescriptor::new(*id, format!("Camera {}", id)))
                    .collect(),
                fail_open: None,
                deliver_frames: true,
                log: Rc::new(RefCell::new(FakeLog::default())),
            }
        }
    }

    impl CameraBackend for FakeBackend {
        type Source = FakeSource;

        fn open(&mut self, device_id: Option<&str>, preferred: Resolution) -> Result<FakeSource, CameraError> {
            if let Some(err) = &self.fail_open {
                return Err(err.clone());
            }
            if self.devices.is_empty() {
                return Err(CameraError::NoDevice);
            }
            if let Some(id) = device_id {
                if !self.devices.iter().any(|d| d.device_id == id) {
                    return Err(CameraError::DeviceUnavailable(id.to_string()));
                }
            }
            self.log.borrow_mut().opened.push(device_id.map(str::to_string));
            Ok(FakeSource {
                device: device_id.map(str::to_string),
                width: preferred.width,
                height: preferred.height,
                pending: self.deliver_frames,
                log: Rc::clone(&self.log),
            })
        }

        fn list_devices(&mut self) -> Result<Vec<CameraDescriptor>, CameraError> {
            Ok(self.devices.clone())
        }
    }
}
