use super::canvas::Canvas;
use crate::pose::{LandmarkSet, PoseLandmark};

use PoseLandmark::*;

/// 骨格の接続定義 (開始ランドマーク, 終了ランドマーク)
pub const POSE_CONNECTIONS: [(PoseLandmark, PoseLandmark); 35] = [
    // 顔
    (Nose, LeftEyeInner),
    (LeftEyeInner, LeftEye),
    (LeftEye, LeftEyeOuter),
    (LeftEyeOuter, LeftEar),
    (Nose, RightEyeInner),
    (RightEyeInner, RightEye),
    (RightEye, RightEyeOuter),
    (RightEyeOuter, RightEar),
    (MouthLeft, MouthRight),
    // 上半身
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (LeftWrist, LeftPinky),
    (LeftWrist, LeftIndex),
    (LeftWrist, LeftThumb),
    (LeftPinky, LeftIndex),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (RightWrist, RightPinky),
    (RightWrist, RightIndex),
    (RightWrist, RightThumb),
    (RightPinky, RightIndex),
    // 胴体
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, RightHip),
    // 下半身
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
    (LeftKnee, LeftAnkle),
    (RightKnee, RightAnkle),
    (LeftAnkle, LeftHeel),
    (RightAnkle, RightHeel),
    (LeftHeel, LeftFootIndex),
    (RightHeel, RightFootIndex),
    (LeftAnkle, LeftFootIndex),
    (RightAnkle, RightFootIndex),
];

/// 骨格線の色
pub const CONNECTOR_COLOR: u32 = 0x00FF88;
pub const CONNECTOR_WIDTH: i32 = 4;

/// ランドマークの塗り色と縁取り
pub const LANDMARK_FILL_COLOR: u32 = 0x00FF88;
pub const LANDMARK_RING_COLOR: u32 = 0xFF0000;
pub const LANDMARK_RADIUS: i32 = 6;
pub const LANDMARK_RING_WIDTH: i32 = 2;

/// Independent overlay toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayFlags {
    pub skeleton: bool,
    pub landmarks: bool,
}

impl Default for OverlayFlags {
    fn default() -> Self {
        Self {
            skeleton: true,
            landmarks: true,
        }
    }
}

pub fn draw_connectors(canvas: &mut Canvas, set: &LandmarkSet) {
    let w = canvas.width() as u32;
    let h = canvas.height() as u32;
    for (start, end) in POSE_CONNECTIONS.iter() {
        let (Some(a), Some(b)) = (set.get(*start), set.get(*end)) else {
            continue;
        };
        let (x1, y1) = a.to_pixel(w, h);
        let (x2, y2) = b.to_pixel(w, h);
        canvas.draw_line(x1, y1, x2, y2, CONNECTOR_WIDTH, CONNECTOR_COLOR);
    }
}

pub fn draw_landmarks(canvas: &mut Canvas, set: &LandmarkSet) {
    let w = canvas.width() as u32;
    let h = canvas.height() as u32;
    for lm in set.iter() {
        let (px, py) = lm.to_pixel(w, h);
        canvas.fill_circle(px, py, LANDMARK_RADIUS, LANDMARK_RING_COLOR);
        canvas.fill_circle(px, py, LANDMARK_RADIUS - LANDMARK_RING_WIDTH, LANDMARK_FILL_COLOR);
    }
}

pub fn draw_overlay(canvas: &mut Canvas, set: &LandmarkSet, flags: OverlayFlags) {
    if flags.skeleton {
        draw_connectors(canvas, set);
    }
    if flags.landmarks {
        draw_landmarks(canvas, set);
    }
}
