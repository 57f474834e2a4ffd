//! ランドマークモデルに渡す正方形の注目領域 (ROI)
//!
//! 前フレームのランドマークから人物を囲む正方形を作り、見失ったら
//! フレーム全体をレターボックスした正方形に戻る。

use super::landmark::{LandmarkPoint, LandmarkSet};

/// BBox をこの倍率で広げてから正方形にする
pub const ROI_EXPAND: f32 = 1.25;

/// クロップ領域（フレームの正規化座標）
///
/// 正方形を保つため、フレーム外 (0 未満や 1 超え) にはみ出すことがある。
/// はみ出した部分は黒で埋めてモデルに渡す。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    /// フレームそのもの (縦横比は保たない)
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.x <= 0.0 && self.y <= 0.0 && self.x + self.width >= 1.0 && self.y + self.height >= 1.0
    }

    /// フレーム全体を含む中央寄せの正方形 (短辺側を上下または左右に黒で埋める)
    pub fn letterbox(frame_w: u32, frame_h: u32) -> Self {
        if frame_w == 0 || frame_h == 0 {
            return Self::full();
        }
        let side = frame_w.max(frame_h) as f32;
        Self::square(frame_w as f32 / 2.0, frame_h as f32 / 2.0, side, frame_w, frame_h)
    }

    /// ピクセル中心と一辺から正方形領域を作る
    fn square(cx: f32, cy: f32, side: f32, frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        Self {
            x: (cx - side / 2.0) / fw,
            y: (cy - side / 2.0) / fh,
            width: side / fw,
            height: side / fh,
        }
    }

    /// クロップ内の正規化座標をフレームの正規化座標に戻す
    ///
    /// z は x と同じスケールなので幅で戻す。
    pub fn to_frame(&self, point: &LandmarkPoint) -> LandmarkPoint {
        LandmarkPoint {
            x: self.x + point.x * self.width,
            y: self.y + point.y * self.height,
            z: point.z * self.width,
            visibility: point.visibility,
        }
    }
}

/// 可視度が `min_visibility` 以上の点を囲む正方形 ROI
///
/// 有効な点が2個未満ならNone。
pub fn region_from_landmarks(
    set: &LandmarkSet,
    frame_w: u32,
    frame_h: u32,
    min_visibility: f32,
) -> Option<CropRegion> {
    if frame_w == 0 || frame_h == 0 {
        return None;
    }
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut count = 0u32;

    for lm in set.iter() {
        if lm.visibility.unwrap_or(0.0) < min_visibility || !lm.x.is_finite() || !lm.y.is_finite() {
            continue;
        }
        let px = lm.x * frame_w as f32;
        let py = lm.y * frame_h as f32;
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
        count += 1;
    }

    if count < 2 {
        return None;
    }

    let side = ((max_x - min_x).max(max_y - min_y) * ROI_EXPAND).max(1.0);
    Some(CropRegion::square(
        (min_x + max_x) / 2.0,
        (min_y + max_y) / 2.0,
        side,
        frame_w,
        frame_h,
    ))
}

/// 前フレームの結果から次フレームの ROI を決める
#[derive(Debug, Clone)]
pub struct RoiTracker {
    region: Option<CropRegion>,
    min_visibility: f32,
}

impl RoiTracker {
    pub fn new(min_visibility: f32) -> Self {
        Self {
            region: None,
            min_visibility,
        }
    }

    /// 追跡中ならその ROI、そうでなければレターボックスしたフレーム全体
    pub fn region(&self, frame_w: u32, frame_h: u32) -> CropRegion {
        self.region
            .unwrap_or_else(|| CropRegion::letterbox(frame_w, frame_h))
    }

    pub fn is_tracking(&self) -> bool {
        self.region.is_some()
    }

    /// 平均可視度が閾値未満なら追跡をやめて全体から探し直す
    pub fn update(&mut self, landmarks: Option<&LandmarkSet>, frame_w: u32, frame_h: u32) {
        self.region = landmarks
            .filter(|set| set.average_visibility() >= self.min_visibility)
            .and_then(|set| region_from_landmarks(set, frame_w, frame_h, self.min_visibility));
    }

    pub fn reset(&mut self) {
        self.region = None;
    }
}
