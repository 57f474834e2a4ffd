//! Capture & inference loop.
//!
//! `stopped -> camera active -> tracking -> camera active -> stopped`.
//! The window loop calls [`CaptureSession::tick`] once per animation frame;
//! each tick reads at most one frame, runs the estimator on it to
//! completion, draws it and, while tracking, hands the encoded messages to
//! the bridge. Nothing overlaps, so only one landmark set is ever in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::bridge::MessageSink;
use crate::camera::{CameraBackend, CameraError, Resolution, VideoSource};
use crate::encoder::{encode_landmarks, message_count};
use crate::pose::PoseEstimator;
use crate::render::{draw_overlay, Canvas, OverlayFlags};
use crate::telemetry::{Telemetry, TelemetrySnapshot};

const FLASH_DURATION: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    CameraReady,
    Tracking,
}

impl TrackingState {
    pub fn from_flags(camera_active: bool, tracking: bool) -> Self {
        match (camera_active, tracking) {
            (false, _) => TrackingState::Idle,
            (true, false) => TrackingState::CameraReady,
            (true, true) => TrackingState::Tracking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Idle,
    Initializing,
    Active,
    Stopped,
    Error(String),
}

/// Operator-facing status text with an optional short-lived override.
#[derive(Debug)]
struct StatusLine {
    status: Status,
    flash: Option<(String, Instant)>,
}

impl StatusLine {
    fn new() -> Self {
        Self {
            status: Status::Idle,
            flash: None,
        }
    }

    fn text(&self, state: TrackingState, now: Instant) -> String {
        if let Some((message, until)) = &self.flash {
            if now < *until {
                return message.clone();
            }
        }
        match &self.status {
            Status::Idle => "Ready to start".to_string(),
            Status::Initializing => "Initializing camera...".to_string(),
            Status::Stopped => "Camera stopped".to_string(),
            Status::Error(message) => format!("Error: {}", message),
            Status::Active => match state {
                TrackingState::Tracking => "Tracking active - Sending OSC data".to_string(),
                _ => "Camera ready - press T to start tracking".to_string(),
            },
        }
    }
}

/// Cancels the feed loop. May be set from any thread; checked every tick.
#[derive(Debug, Clone, Default)]
pub struct FeedCancel(Arc<AtomicBool>);

impl FeedCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Guard for the single feed loop.
#[derive(Debug, Default)]
struct FeedLoop {
    running: bool,
    started: u32,
    cancel: FeedCancel,
}

impl FeedLoop {
    /// Returns true only when a loop was actually (re)started.
    fn ensure_running(&mut self) -> bool {
        if self.is_live() {
            return false;
        }
        self.cancel.reset();
        self.running = true;
        self.started += 1;
        true
    }

    fn is_live(&mut self) -> bool {
        if self.running && self.cancel.is_cancelled() {
            debug!("feed loop cancelled");
            self.running = false;
        }
        self.running
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Feed loop not running.
    Stopped,
    /// No stream, or no new frame since the last tick.
    NoFrame,
    /// Frame processed, model found nobody.
    NoPose,
    /// Frame processed with a pose; `messages` were queued for sending.
    Pose { messages: usize },
}

pub struct CaptureSession<B: CameraBackend> {
    backend: B,
    source: Option<B::Source>,
    device: Option<String>,
    tracking: bool,
    feed: FeedLoop,
    preferred: Resolution,
    first_frame_timeout: Duration,
    canvas: Canvas,
    overlay: OverlayFlags,
    telemetry: Telemetry,
    status: StatusLine,
}

impl<B: CameraBackend> CaptureSession<B> {
    pub fn new(
        backend: B,
        preferred: Resolution,
        first_frame_timeout: Duration,
        overlay: OverlayFlags,
        now: Instant,
    ) -> Self {
        Self {
            backend,
            source: None,
            device: None,
            tracking: false,
            feed: FeedLoop::default(),
            preferred,
            first_frame_timeout,
            canvas: Canvas::default(),
            overlay,
            telemetry: Telemetry::new(now),
            status: StatusLine::new(),
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// (Re)open the stream on `device` (system default for `None`).
    ///
    /// Any current stream is released first. On failure the camera stays
    /// inactive and the error is shown in the status line.
    pub fn start(&mut self, device: Option<&str>) -> Result<(), CameraError> {
        if self.source.take().is_some() {
            info!("Stopping existing video stream...");
        }
        self.status.status = Status::Initializing;
        self.device = device.map(str::to_string);
        info!("Starting camera with device: {}", device.unwrap_or("default"));

        match self.open_stream(device) {
            Ok(source) => {
                let (w, h) = source.resolution();
                info!("Camera started: {}x{}", w, h);
                self.source = Some(source);
            }
            Err(e) => {
                warn!("Error starting camera: {}", e);
                self.status.status = Status::Error(e.to_string());
                return Err(e);
            }
        }

        if self.feed.ensure_running() {
            info!("Starting frame processing loop...");
        }
        self.status.status = Status::Active;
        Ok(())
    }

    fn open_stream(&mut self, device: Option<&str>) -> Result<B::Source, CameraError> {
        let mut source = self.backend.open(device, self.preferred)?;
        source
            .wait_ready(self.first_frame_timeout)
            .map_err(|e| match e {
                CameraError::NoFrame { timeout, .. } => CameraError::NoFrame {
                    device: device.unwrap_or("default").to_string(),
                    timeout,
                },
                other => other,
            })?;
        Ok(source)
    }

    /// Release the stream, disarm tracking and cancel the feed loop.
    pub fn stop(&mut self) {
        if self.source.take().is_some() {
            info!("Camera stopped");
        }
        self.tracking = false;
        self.feed.cancel.cancel();
        self.canvas.clear();
        self.status.status = Status::Stopped;
    }

    /// Always restarts the stream, even when already running.
    pub fn switch_device(&mut self, device: Option<&str>) -> Result<(), CameraError> {
        info!(
            "Camera selection changed: {} -> {}",
            self.device.as_deref().unwrap_or("default"),
            device.unwrap_or("default")
        );
        self.start(device)
    }

    /// Start sending landmarks, starting the camera first if needed.
    pub fn arm_tracking(&mut self) -> Result<(), CameraError> {
        if self.source.is_none() {
            let device = self.device.clone();
            self.start(device.as_deref())?;
        } else if self.feed.ensure_running() {
            info!("Starting frame processing loop...");
        }
        if !self.tracking {
            info!("Tracking started");
        }
        self.tracking = true;
        self.status.status = Status::Active;
        Ok(())
    }

    /// Stop sending; the camera and rendering keep running.
    pub fn disarm_tracking(&mut self) {
        if self.tracking {
            info!("Tracking stopped");
        }
        self.tracking = false;
        self.canvas.clear();
        if self.source.is_some() {
            self.status.status = Status::Active;
        }
    }

    pub fn toggle_tracking(&mut self) -> Result<(), CameraError> {
        if self.tracking {
            self.disarm_tracking();
            Ok(())
        } else {
            self.arm_tracking()
        }
    }

    /// One animation frame.
    pub fn tick<P, S>(&mut self, estimator: &mut P, sink: &S, now: Instant) -> TickOutcome
    where
        P: PoseEstimator + ?Sized,
        S: MessageSink + ?Sized,
    {
        if !self.feed.is_live() {
            return TickOutcome::Stopped;
        }
        let Some(source) = self.source.as_mut() else {
            return TickOutcome::NoFrame;
        };

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.telemetry.record_skipped();
                return TickOutcome::NoFrame;
            }
            Err(e) => {
                warn!("frame read failed: {}", e);
                self.telemetry.record_skipped();
                return TickOutcome::NoFrame;
            }
        };

        let landmarks = match estimator.estimate(&frame) {
            Ok(result) => result,
            Err(e) => {
                debug!("inference failed, treating as no pose: {:#}", e);
                None
            }
        };

        self.canvas.draw_frame(&frame);
        if let Some(set) = &landmarks {
            draw_overlay(&mut self.canvas, set, self.overlay);
        }

        let (messages, counted) = match (&landmarks, self.tracking) {
            (Some(set), true) => {
                let commands = encode_landmarks(set);
                let count = commands.len();
                for command in commands {
                    sink.send_data(command);
                }
                (count, message_count(set))
            }
            _ => (0, 0),
        };

        self.telemetry.record_inference(landmarks.as_ref(), counted, now);

        match landmarks {
            Some(_) => TickOutcome::Pose { messages },
            None => TickOutcome::NoPose,
        }
    }

    pub fn cancel_handle(&self) -> FeedCancel {
        self.feed.cancel.clone()
    }

    /// Number of times a feed loop has been started.
    pub fn loops_started(&self) -> u32 {
        self.feed.started
    }

    pub fn is_camera_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn tracking_state(&self) -> TrackingState {
        TrackingState::from_flags(self.is_camera_active(), self.tracking)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn overlay(&self) -> OverlayFlags {
        self.overlay
    }

    pub fn toggle_skeleton(&mut self) -> bool {
        self.overlay.skeleton = !self.overlay.skeleton;
        self.overlay.skeleton
    }

    pub fn toggle_landmarks(&mut self) -> bool {
        self.overlay.landmarks = !self.overlay.landmarks;
        self.overlay.landmarks
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn status_text(&self, now: Instant) -> String {
        self.status.text(self.tracking_state(), now)
    }

    /// Show `message` instead of the regular status for a couple of seconds.
    pub fn flash_status(&mut self, message: impl Into<String>, now: Instant) {
        self.status.flash = Some((message.into(), now + FLASH_DURATION));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::fake::FakeBackend;
    use crate::camera::VideoFrame;
    use crate::osc::OscCommand;
    use crate::pose::{LandmarkPoint, LandmarkSet, PoseLandmark};
    use anyhow::Result;
    use std::cell::RefCell;

    struct FixedEstimator {
        result: Option<LandmarkSet>,
        fail: bool,
        calls: usize,
    }

    impl FixedEstimator {
        fn pose() -> Self {
            let points = vec![LandmarkPoint::new(0.5, 0.5, 0.0, Some(0.9)); PoseLandmark::COUNT];
            Self {
                result: Some(LandmarkSet::new(points)),
                fail: false,
                calls: 0,
            }
        }

        fn nobody() -> Self {
            Self {
                result: None,
                fail: false,
                calls: 0,
            }
        }
    }

    impl PoseEstimator for FixedEstimator {
        fn estimate(&mut self, _frame: &VideoFrame) -> Result<Option<LandmarkSet>> {
            self.calls += 1;
            if self.fail {
                anyhow::bail!("model exploded");
            }
            Ok(self.result.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<OscCommand>>,
    }

    impl MessageSink for RecordingSink {
        fn send_data(&self, command: OscCommand) {
            self.sent.borrow_mut().push(command);
        }
    }

    fn session(backend: FakeBackend) -> CaptureSession<FakeBackend> {
        let preferred = Resolution {
            width: 64,
            height: 48,
            fps: 30,
        };
        CaptureSession::new(
            backend,
            preferred,
            Duration::from_millis(100),
            OverlayFlags::default(),
            Instant::now(),
        )
    }

    #[test]
    fn test_start_makes_camera_ready() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        assert_eq!(s.tracking_state(), TrackingState::Idle);
        s.start(Some("0")).unwrap();
        assert_eq!(s.tracking_state(), TrackingState::CameraReady);
        assert_eq!(
            s.status_text(Instant::now()),
            "Camera ready - press T to start tracking"
        );
    }

    #[test]
    fn test_camera_without_tracking_renders_but_sends_nothing() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();
        s.start(None).unwrap();

        let outcome = s.tick(&mut est, &sink, Instant::now());
        assert_eq!(outcome, TickOutcome::Pose { messages: 0 });
        assert!(sink.sent.borrow().is_empty());
        assert_eq!((s.canvas().width(), s.canvas().height()), (64, 48));
        assert_eq!(s.telemetry().landmark_count, 33);
        assert_eq!(s.telemetry().visibility_percent, 90);
    }

    #[test]
    fn test_arm_tracking_starts_camera_and_sends() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();

        s.arm_tracking().unwrap();
        assert!(s.is_camera_active());
        assert_eq!(s.tracking_state(), TrackingState::Tracking);

        let outcome = s.tick(&mut est, &sink, Instant::now());
        assert_eq!(outcome, TickOutcome::Pose { messages: 67 });
        assert_eq!(sink.sent.borrow().len(), 67);
        // one per landmark plus /pose/all
        assert_eq!(s.telemetry().messages_sent, 34);
        assert_eq!(
            s.status_text(Instant::now()),
            "Tracking active - Sending OSC data"
        );
    }

    #[test]
    fn test_disarm_stops_emissions_until_rearmed() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();
        s.arm_tracking().unwrap();
        s.tick(&mut est, &sink, Instant::now());
        s.disarm_tracking();

        for _ in 0..5 {
            assert_eq!(
                s.tick(&mut est, &sink, Instant::now()),
                TickOutcome::Pose { messages: 0 }
            );
        }
        assert_eq!(sink.sent.borrow().len(), 67);
        assert!(s.is_camera_active());
        assert_eq!(est.calls, 6);

        s.arm_tracking().unwrap();
        s.tick(&mut est, &sink, Instant::now());
        assert_eq!(sink.sent.borrow().len(), 134);
        assert_eq!(s.telemetry().messages_sent, 68);
        // camera was already running: still one stream, one loop
        assert_eq!(s.backend_mut().log.borrow().opened.len(), 1);
        assert_eq!(s.loops_started(), 1);
    }

    #[test]
    fn test_switch_device_keeps_tracking() {
        let mut s = session(FakeBackend::with_devices(&["0", "1"]));
        s.start(Some("0")).unwrap();
        s.arm_tracking().unwrap();

        s.switch_device(Some("1")).unwrap();
        assert_eq!(s.tracking_state(), TrackingState::Tracking);
        assert_eq!(s.device(), Some("1"));
        let log = s.backend_mut().log.borrow();
        assert_eq!(log.opened, vec![Some("0".to_string()), Some("1".to_string())]);
        assert_eq!(log.dropped, 1);
    }

    #[test]
    fn test_switch_to_same_device_restarts_stream() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        s.start(Some("0")).unwrap();
        s.switch_device(Some("0")).unwrap();
        assert_eq!(s.backend_mut().log.borrow().opened.len(), 2);
        assert_eq!(s.loops_started(), 1);
    }

    #[test]
    fn test_start_failure_reports_and_stays_inactive() {
        let mut backend = FakeBackend::with_devices(&["0"]);
        backend.fail_open = Some(CameraError::PermissionDenied);
        let mut s = session(backend);
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();

        assert_eq!(s.start(None), Err(CameraError::PermissionDenied));
        assert!(!s.is_camera_active());
        assert_eq!(s.tracking_state(), TrackingState::Idle);
        assert_eq!(s.status_text(Instant::now()), "Error: camera permission denied");
        assert_eq!(s.tick(&mut est, &sink, Instant::now()), TickOutcome::Stopped);

        assert!(s.arm_tracking().is_err());
        assert!(!s.is_tracking());
    }

    #[test]
    fn test_failed_switch_releases_old_stream() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        s.start(Some("0")).unwrap();
        assert!(s.switch_device(Some("9")).is_err());
        assert!(!s.is_camera_active());
        assert_eq!(s.backend_mut().log.borrow().dropped, 1);
    }

    #[test]
    fn test_repeated_start_keeps_single_loop() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        s.start(None).unwrap();
        s.start(None).unwrap();
        s.start(None).unwrap();
        assert_eq!(s.loops_started(), 1);
    }

    #[test]
    fn test_cancel_handle_stops_feed() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();
        s.arm_tracking().unwrap();

        let cancel = s.cancel_handle();
        std::thread::spawn(move || cancel.cancel()).join().unwrap();

        assert_eq!(s.tick(&mut est, &sink, Instant::now()), TickOutcome::Stopped);
        assert_eq!(est.calls, 0);

        // starting again revives exactly one loop
        s.start(None).unwrap();
        assert_eq!(s.loops_started(), 2);
        assert!(matches!(
            s.tick(&mut est, &sink, Instant::now()),
            TickOutcome::Pose { .. }
        ));
    }

    #[test]
    fn test_stop_releases_and_disarms() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();
        s.arm_tracking().unwrap();
        s.stop();

        assert_eq!(s.tracking_state(), TrackingState::Idle);
        assert!(!s.is_tracking());
        assert_eq!(s.backend_mut().log.borrow().dropped, 1);
        assert_eq!(s.tick(&mut est, &sink, Instant::now()), TickOutcome::Stopped);
        assert_eq!(s.status_text(Instant::now()), "Camera stopped");
    }

    #[test]
    fn test_no_pose_zeroes_counters() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let sink = RecordingSink::default();
        s.arm_tracking().unwrap();
        s.tick(&mut FixedEstimator::pose(), &sink, Instant::now());

        let outcome = s.tick(&mut FixedEstimator::nobody(), &sink, Instant::now());
        assert_eq!(outcome, TickOutcome::NoPose);
        assert_eq!(s.telemetry().landmark_count, 0);
        assert_eq!(s.telemetry().visibility_percent, 0);
        assert_eq!(s.telemetry().messages_sent, 34);
    }

    #[test]
    fn test_inference_error_is_no_pose() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        let sink = RecordingSink::default();
        let mut est = FixedEstimator::pose();
        est.fail = true;
        s.arm_tracking().unwrap();

        assert_eq!(s.tick(&mut est, &sink, Instant::now()), TickOutcome::NoPose);
        assert!(sink.sent.borrow().is_empty());
        // the frame is still drawn
        assert_eq!(s.canvas().width(), 64);
    }

    #[test]
    fn test_no_new_frame_is_skipped() {
        let mut backend = FakeBackend::with_devices(&["0"]);
        backend.deliver_frames = false;
        let mut s = session(backend);
        let mut est = FixedEstimator::pose();
        let sink = RecordingSink::default();
        s.arm_tracking().unwrap();

        assert_eq!(s.tick(&mut est, &sink, Instant::now()), TickOutcome::NoFrame);
        assert_eq!(est.calls, 0);
        assert_eq!(s.telemetry().skipped_frames, 1);
    }

    #[test]
    fn test_flash_status_expires() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        s.start(None).unwrap();
        let now = Instant::now();
        s.flash_status("OSC config updated: 10.0.0.5:8000", now);
        assert_eq!(s.status_text(now), "OSC config updated: 10.0.0.5:8000");
        assert_eq!(
            s.status_text(now + Duration::from_secs(3)),
            "Camera ready - press T to start tracking"
        );
    }

    #[test]
    fn test_overlay_toggles() {
        let mut s = session(FakeBackend::with_devices(&["0"]));
        assert!(!s.toggle_skeleton());
        assert!(!s.toggle_landmarks());
        assert!(s.toggle_skeleton());
        assert_eq!(
            s.overlay(),
            OverlayFlags {
                skeleton: true,
                landmarks: false
            }
        );
    }
}
