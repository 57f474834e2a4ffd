//! カメラ一覧と初回フレームの確認
//!
//! pose-osc と同じ順序 (内蔵カメラ優先) でカメラを列挙し、各カメラを
//! 開いて最初のフレームが届くまでの時間を表示する。

use anyhow::Result;
use std::time::Instant;

use pose_osc::camera::{CameraBackend, CameraSelector, OpenCvBackend, VideoSource};
use pose_osc::config::Config;

fn main() -> Result<()> {
    let config = Config::load_or_default("pose_osc.toml");

    println!("=== カメラプローブ ===");
    println!("index 0..{} を検索中...", config.camera.max_probe_index);

    let mut backend = OpenCvBackend::new(config.camera.max_probe_index);
    let mut selector = CameraSelector::new();
    selector.enumerate(&mut backend);

    if selector.cameras().is_empty() {
        println!("カメラが見つかりません");
        return Ok(());
    }

    let cameras = selector.cameras().to_vec();
    for (i, cam) in cameras.iter().enumerate() {
        let label = selector.label(i).unwrap_or_default();
        let mark = if Some(cam.device_id.as_str()) == selector.selected() { "*" } else { " " };
        print!("{} id {}: {} ", mark, cam.device_id, label);

        let started = Instant::now();
        match backend.open(Some(&cam.device_id), config.camera.resolution()) {
            Ok(mut source) => match source.wait_ready(config.camera.first_frame_timeout()) {
                Ok(()) => {
                    let (w, h) = source.resolution();
                    println!("{}x{} first frame {:?}", w, h, started.elapsed());
                }
                Err(e) => println!("open ok, {}", e),
            },
            Err(e) => println!("open failed: {}", e),
        }
    }

    println!();
    println!("* = pose-osc が起動時に使うカメラ ([camera] device で変更可)");
    Ok(())
}
