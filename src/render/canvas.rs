use crate::camera::VideoFrame;

/// 描画面 (0x00RRGGBB)
///
/// 毎フレーム映像サイズに合わせてリサイズされる。
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.buffer[y * self.width + x])
        } else {
            None
        }
    }

    /// サイズが変わった場合のみ再確保
    pub fn resize(&mut self, width: usize, height: usize) {
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.buffer = vec![0u32; width * height];
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// フレームサイズに合わせてから全面コピー
    pub fn draw_frame(&mut self, frame: &VideoFrame) {
        self.resize(frame.width as usize, frame.height as usize);
        self.clear();
        let n = self.buffer.len().min(frame.pixels.len());
        self.buffer[..n].copy_from_slice(&frame.pixels[..n]);
    }

    /// 太さ付きの線 (Bresenham + 円スタンプ)
    ///
    /// 誤差項は i64 で持つので、端点が i32 の範囲ならどこでもよい。
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, width: i32, color: u32) {
        let radius = (width / 2).max(0);
        let (x1, y1) = (i64::from(x1), i64::from(y1));
        let dx = (x1 - i64::from(x0)).abs();
        let dy = -(y1 - i64::from(y0)).abs();
        let sx = if i64::from(x0) < x1 { 1 } else { -1 };
        let sy = if i64::from(y0) < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = i64::from(x0);
        let mut y = i64::from(y0);

        loop {
            // x, y stay between the endpoints
            let (px, py) = (x as i32, y as i32);
            if radius == 0 {
                self.set_pixel(px, py, color);
            } else {
                self.fill_circle(px, py, radius, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        let r2 = i64::from(radius) * i64::from(radius);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if i64::from(dx) * i64::from(dx) + i64::from(dy) * i64::from(dy) <= r2 {
                    self.set_pixel(cx.saturating_add(dx), cy.saturating_add(dy), color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
