use std::fmt;
use std::time::{Duration, Instant};

use crate::pose::{visibility_percent, LandmarkSet};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Rolling counters shown alongside the video.
#[derive(Debug)]
pub struct Telemetry {
    window_start: Instant,
    frames_in_window: u32,
    fps: u32,
    messages_sent: u64,
    landmark_count: usize,
    visibility_percent: u32,
    skipped_frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fps: u32,
    pub messages_sent: u64,
    pub landmark_count: usize,
    pub visibility_percent: u32,
    pub skipped_frames: u64,
}

impl Telemetry {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_in_window: 0,
            fps: 0,
            messages_sent: 0,
            landmark_count: 0,
            visibility_percent: 0,
            skipped_frames: 0,
        }
    }

    /// One inference result, pose or not. `messages` is what the frame adds
    /// to the sent counter (see `encoder::message_count`), 0 when not sending.
    pub fn record_inference(&mut self, landmarks: Option<&LandmarkSet>, messages: usize, now: Instant) {
        match landmarks {
            Some(set) => {
                self.landmark_count = set.len();
                self.visibility_percent = visibility_percent(set.average_visibility());
            }
            None => {
                self.landmark_count = 0;
                self.visibility_percent = 0;
            }
        }
        self.messages_sent += messages as u64;
        self.count_frame(now);
    }

    /// A tick where the camera had nothing new for the model.
    pub fn record_skipped(&mut self) {
        self.skipped_frames += 1;
    }

    fn count_frame(&mut self, now: Instant) {
        self.frames_in_window += 1;
        if now.saturating_duration_since(self.window_start) >= FPS_WINDOW {
            self.fps = self.frames_in_window;
            self.frames_in_window = 0;
            self.window_start = now;
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fps: self.fps,
            messages_sent: self.messages_sent,
            landmark_count: self.landmark_count,
            visibility_percent: self.visibility_percent,
            skipped_frames: self.skipped_frames,
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FPS {} | OSC {} | Landmarks {} | Visibility {}%",
            self.fps, self.messages_sent, self.landmark_count, self.visibility_percent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LandmarkPoint;

    fn toy_set() -> LandmarkSet {
        LandmarkSet::new(vec![
            LandmarkPoint::new(0.0, 0.0, 0.0, Some(1.0)),
            LandmarkPoint::new(0.0, 0.0, 0.0, Some(0.0)),
            LandmarkPoint::new(0.0, 0.0, 0.0, None),
        ])
    }

    #[test]
    fn test_pose_updates_counts() {
        let t0 = Instant::now();
        let mut t = Telemetry::new(t0);
        t.record_inference(Some(&toy_set()), 7, t0);
        let s = t.snapshot();
        assert_eq!(s.landmark_count, 3);
        assert_eq!(s.visibility_percent, 33);
        assert_eq!(s.messages_sent, 7);
    }

    #[test]
    fn test_no_pose_zeroes_counts_but_keeps_message_total() {
        let t0 = Instant::now();
        let mut t = Telemetry::new(t0);
        t.record_inference(Some(&toy_set()), 10, t0);
        t.record_inference(None, 0, t0);
        let s = t.snapshot();
        assert_eq!(s.landmark_count, 0);
        assert_eq!(s.visibility_percent, 0);
        assert_eq!(s.messages_sent, 10);
    }

    #[test]
    fn test_fps_window_uses_wall_clock() {
        let t0 = Instant::now();
        let mut t = Telemetry::new(t0);
        for i in 0..30 {
            t.record_inference(None, 0, t0 + Duration::from_millis(i * 30));
        }
        // 870ms elapsed: window still open
        assert_eq!(t.snapshot().fps, 0);
        t.record_inference(None, 0, t0 + Duration::from_millis(1000));
        assert_eq!(t.snapshot().fps, 31);
        // new window starts empty
        t.record_inference(None, 0, t0 + Duration::from_millis(2100));
        assert_eq!(t.snapshot().fps, 1);
    }

    #[test]
    fn test_skipped_frames_are_separate() {
        let t0 = Instant::now();
        let mut t = Telemetry::new(t0);
        t.record_skipped();
        t.record_skipped();
        let s = t.snapshot();
        assert_eq!(s.skipped_frames, 2);
        assert_eq!(s.fps, 0);
    }

    #[test]
    fn test_display() {
        let s = TelemetrySnapshot {
            fps: 30,
            messages_sent: 670,
            landmark_count: 33,
            visibility_percent: 88,
            skipped_frames: 0,
        };
        assert_eq!(s.to_string(), "FPS 30 | OSC 670 | Landmarks 33 | Visibility 88%");
    }
}
