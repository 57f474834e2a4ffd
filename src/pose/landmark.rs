use std::borrow::Cow;

/// BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// OSCアドレスに使う関節名。順序はモデル出力と一致していること
pub const LANDMARK_NAMES: [&str; PoseLandmark::COUNT] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

impl PoseLandmark {
    pub const COUNT: usize = 33;

    pub const ALL: [PoseLandmark; PoseLandmark::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        LANDMARK_NAMES[self as usize]
    }
}

/// 関節名。テーブル外のインデックスは `landmark_<index>`
pub fn joint_name(index: usize) -> Cow<'static, str> {
    match PoseLandmark::from_index(index) {
        Some(lm) => Cow::Borrowed(lm.name()),
        None => Cow::Owned(format!("landmark_{}", index)),
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 腰中心を原点とした相対深度
    pub z: f32,
    /// 可視度 (0.0〜1.0)。モデルが出さない場合は None
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: Option<f32>) -> Self {
        Self { x, y, z, visibility }
    }

    /// ピクセル座標に変換
    ///
    /// フレーム外の点は各辺の `PIXEL_LIMIT` 倍までに丸める。NaN は 0。
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        (scale_to_pixel(self.x, width), scale_to_pixel(self.y, height))
    }
}

/// Off-frame pixel coordinates are clamped to this many frame sizes.
pub const PIXEL_LIMIT: f32 = 4.0;

fn scale_to_pixel(value: f32, extent: u32) -> i32 {
    let extent = extent as f32;
    let limit = extent * PIXEL_LIMIT;
    (value * extent).clamp(-limit, limit) as i32
}

/// 1フレーム分のランドマーク。通常は33点
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
    points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, landmark: PoseLandmark) -> Option<&LandmarkPoint> {
        self.points.get(landmark as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LandmarkPoint> {
        self.points.iter()
    }

    /// 平均可視度 (visibility なしは 0 扱い)
    pub fn average_visibility(&self) -> f32 {
        average_visibility(&self.points)
    }
}

/// 平均可視度。visibility がない点は 0 として数える
pub fn average_visibility(points: &[LandmarkPoint]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f32 = points.iter().map(|p| p.visibility.unwrap_or(0.0)).sum();
    sum / points.len() as f32
}

/// 表示用の丸めたパーセント値
pub fn visibility_percent(average: f32) -> u32 {
    (average * 100.0).round().clamp(0.0, 100.0) as u32
}
