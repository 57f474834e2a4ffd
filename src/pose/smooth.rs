use std::time::Instant;

use super::landmark::{LandmarkPoint, LandmarkSet};

/// 初回や同時刻のフレームで使う時間間隔
const FALLBACK_DT: f32 = 1.0 / 30.0;

/// Low-pass filter component
#[derive(Debug, Clone, Default)]
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        let result = match self.prev {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.prev = Some(result);
        result
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// One Euro Filter for a single coordinate
#[derive(Debug, Clone)]
struct OneEuro {
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f32>,
}

impl OneEuro {
    fn new() -> Self {
        Self {
            x_filter: LowPassFilter::default(),
            dx_filter: LowPassFilter::default(),
            prev_value: None,
        }
    }

    fn filter(&mut self, value: f32, dt: f32, params: &SmoothingParams) -> f32 {
        let dx = match self.prev_value {
            Some(prev) if dt > 0.0 => (value - prev) / dt,
            _ => 0.0,
        };
        self.prev_value = Some(value);

        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(dt, params.d_cutoff));
        let cutoff = params.min_cutoff + params.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(dt, cutoff))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// 静止時のカットオフ周波数 [Hz]。小さいほど揺れが減る
    pub min_cutoff: f32,
    /// 速度に応じてカットオフを上げる係数。大きいほど速い動きへの追従が良い
    pub beta: f32,
    pub d_cutoff: f32,
}

impl SmoothingParams {
    pub fn new(min_cutoff: f32, beta: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff: 1.0,
        }
    }
}

/// ランドマーク全点の x, y, z に One Euro Filter をかける
///
/// visibility はそのまま通す。点数が変わったらリセット。
#[derive(Debug, Clone)]
pub struct LandmarkSmoother {
    params: SmoothingParams,
    filters: Vec<[OneEuro; 3]>,
    last_time: Option<Instant>,
}

impl LandmarkSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            filters: Vec::new(),
            last_time: None,
        }
    }

    pub fn apply(&mut self, set: LandmarkSet, now: Instant) -> LandmarkSet {
        if self.filters.len() != set.len() {
            self.reset();
            self.filters = (0..set.len())
                .map(|_| std::array::from_fn(|_| OneEuro::new()))
                .collect();
        }

        let dt = match self.last_time {
            Some(t) => {
                let d = now.saturating_duration_since(t).as_secs_f32();
                if d > 0.0 { d } else { FALLBACK_DT }
            }
            None => FALLBACK_DT,
        };
        self.last_time = Some(now);

        let params = self.params;
        let points = set
            .iter()
            .zip(self.filters.iter_mut())
            .map(|(lm, [fx, fy, fz])| LandmarkPoint {
                x: fx.filter(lm.x, dt, &params),
                y: fy.filter(lm.y, dt, &params),
                z: fz.filter(lm.z, dt, &params),
                visibility: lm.visibility,
            })
            .collect();
        LandmarkSet::new(points)
    }

    /// 人物を見失ったとき。次のフレームはそのまま通る
    pub fn reset(&mut self) {
        self.filters.clear();
        self.last_time = None;
    }
}
