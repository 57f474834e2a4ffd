use anyhow::Result;
use minifb::{Key, KeyRepeat, ScaleMode, Window, WindowOptions};

use super::canvas::Canvas;

/// minifbを使用したレンダラー
///
/// Canvas をウィンドウサイズに合わせて表示する。文字は描けないので
/// ステータスはタイトルに出す。
pub struct MinifbRenderer {
    window: Window,
    title: String,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize, target_fps: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                scale_mode: ScaleMode::AspectRatioStretch,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(target_fps);

        Ok(Self {
            window,
            title: title.to_string(),
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// キーが押された瞬間か (リピートなし)
    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    pub fn set_status(&mut self, status: &str) {
        let title = format!("{} - {}", self.title, status);
        self.window.set_title(&title);
    }

    /// Canvas をウィンドウに表示。空の Canvas ならイベント処理だけ行う
    pub fn present(&mut self, canvas: &Canvas) -> Result<()> {
        if canvas.width() == 0 || canvas.height() == 0 {
            self.window.update();
            return Ok(());
        }
        self.window
            .update_with_buffer(canvas.buffer(), canvas.width(), canvas.height())?;
        Ok(())
    }
}
