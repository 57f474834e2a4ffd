use anyhow::{Context, Result};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{info, warn};

use pose_osc::bridge::{self, BridgeClient, ConfigUpdate};
use pose_osc::camera::{CameraSelector, OpenCvBackend};
use pose_osc::config::Config;
use pose_osc::console::{self, ConsoleCommand};
use pose_osc::logging;
use pose_osc::pose::BlazePoseDetector;
use pose_osc::render::{Key, MinifbRenderer, OverlayFlags};
use pose_osc::session::CaptureSession;

const CONFIG_PATH: &str = "pose_osc.toml";

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let log_path = logging::init(&config.log, "pose_osc")?;

    info!("=== Pose OSC ({}) ===", env!("GIT_VERSION"));
    if let Some(path) = &log_path {
        info!("Log file: {}", path.display());
    }

    // OSC ブリッジは tokio 側、描画と推論はメインスレッド
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let (client, host) = bridge::channel(
        config.osc.to_transport_config(),
        config.bridge.queue_capacity,
        config.bridge.request_timeout(),
    );
    let host_task = runtime.spawn(host.run());

    match runtime.block_on(client.get_config()) {
        Ok(cfg) => info!(
            "OSC: {} -> {}",
            cfg.local_endpoint(),
            cfg.remote_endpoint()
        ),
        Err(e) => warn!("Failed to get config: {}", e),
    }

    info!("Loading pose model: {}", config.model.path);
    let mut detector = BlazePoseDetector::load(&config.model)?;

    let mut backend = OpenCvBackend::new(config.camera.max_probe_index);
    let mut selector = CameraSelector::new();
    selector.enumerate(&mut backend);
    if let Some(device) = &config.camera.device {
        if !selector.select(device) {
            warn!("camera {} from config not found, using first camera", device);
        }
    }

    let overlay = OverlayFlags {
        skeleton: config.render.draw_skeleton,
        landmarks: config.render.draw_landmarks,
    };
    let mut session = CaptureSession::new(
        backend,
        config.camera.resolution(),
        config.camera.first_frame_timeout(),
        overlay,
        Instant::now(),
    );
    if let Err(e) = session.start(selector.selected()) {
        warn!("camera not started: {}", e);
    }

    let (cmd_tx, cmd_rx) = mpsc::channel();
    console::spawn_reader(cmd_tx);
    println!("{}", console::HELP);
    println!("keys: T tracking, K skeleton, L landmarks, C next camera, Esc quit");

    let mut renderer = MinifbRenderer::new(
        "pose-osc",
        config.render.window_width,
        config.render.window_height,
        config.render.target_fps,
    )?;

    while renderer.is_open() {
        let now = Instant::now();

        if renderer.is_key_pressed(Key::T) {
            if let Err(e) = session.toggle_tracking() {
                warn!("tracking not started: {}", e);
            }
        }
        if renderer.is_key_pressed(Key::K) {
            info!("skeleton overlay: {}", session.toggle_skeleton());
        }
        if renderer.is_key_pressed(Key::L) {
            info!("landmark overlay: {}", session.toggle_landmarks());
        }
        if renderer.is_key_pressed(Key::C) {
            if let Some(next) = selector.select_next().map(str::to_string) {
                if let Err(e) = session.switch_device(Some(&next)) {
                    warn!("camera switch to {} failed: {}", next, e);
                }
            }
        }

        while let Ok(command) = cmd_rx.try_recv() {
            handle_command(command, &runtime, &client, &mut selector, &mut session, now);
        }

        session.tick(&mut detector, &client, now);

        renderer.present(session.canvas())?;
        let status = format!("{} | {}", session.status_text(now), session.telemetry());
        renderer.set_status(&status);
    }

    info!("Shutting down...");
    session.stop();
    drop(client);
    if let Err(e) = runtime.block_on(host_task) {
        warn!("bridge host task failed: {}", e);
    }
    info!("Total OSC messages sent: {}", session.telemetry().messages_sent);
    Ok(())
}

fn handle_command(
    command: ConsoleCommand,
    runtime: &tokio::runtime::Runtime,
    client: &BridgeClient,
    selector: &mut CameraSelector,
    session: &mut CaptureSession<OpenCvBackend>,
    now: Instant,
) {
    match command {
        ConsoleCommand::UpdateConfig(update) => update_config(runtime, client, session, update, now),
        ConsoleCommand::ShowConfig => match runtime.block_on(client.get_config()) {
            Ok(cfg) => println!(
                "local {} -> remote {} (metadata: {})",
                cfg.local_endpoint(),
                cfg.remote_endpoint(),
                cfg.metadata
            ),
            Err(e) => println!("Failed to get config: {}", e),
        },
        ConsoleCommand::ListCameras => {
            if selector.cameras().is_empty() {
                println!("no cameras");
            }
            for (i, cam) in selector.cameras().iter().enumerate() {
                let mark = if Some(cam.device_id.as_str()) == selector.selected() { "*" } else { " " };
                let label = selector.label(i).unwrap_or_default();
                println!("{} {}: {}", mark, cam.device_id, label);
            }
        }
        ConsoleCommand::SelectCamera(id) => {
            if selector.select(&id) {
                if let Err(e) = session.switch_device(Some(&id)) {
                    warn!("camera switch to {} failed: {}", id, e);
                }
            } else {
                println!("unknown camera: {}", id);
            }
        }
        ConsoleCommand::StartTracking => {
            if let Err(e) = session.arm_tracking() {
                println!("tracking not started: {}", e);
            }
        }
        ConsoleCommand::StopTracking => session.disarm_tracking(),
        ConsoleCommand::CameraOn => {
            let device = selector.selected().map(str::to_string);
            if let Err(e) = session.start(device.as_deref()) {
                warn!("camera not started: {}", e);
            }
        }
        ConsoleCommand::CameraOff => session.stop(),
        ConsoleCommand::Help => println!("{}", console::HELP),
    }
}

fn update_config(
    runtime: &tokio::runtime::Runtime,
    client: &BridgeClient,
    session: &mut CaptureSession<OpenCvBackend>,
    update: ConfigUpdate,
    now: Instant,
) {
    info!("Updating OSC config: {:?}", update);
    match runtime.block_on(client.update_config(update)) {
        Ok(cfg) => {
            info!("OSC config updated: {}", cfg.remote_endpoint());
            session.flash_status(format!("OSC config updated: {}", cfg.remote_endpoint()), now);
        }
        Err(e) => {
            warn!("Failed to update config: {}", e);
            session.flash_status(format!("Failed to update config: {}", e), now);
        }
    }
}
