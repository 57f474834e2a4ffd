//! 標準入力からの操作コマンド

use std::io::BufRead;
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::bridge::ConfigUpdate;

pub const HELP: &str = "\
commands:
  osc <address> [port]  set OSC destination
  port <n>              set OSC destination port
  config                show current OSC config
  cams                  list cameras
  cam <id>              switch camera
  start | stop          arm / disarm tracking
  camera on|off         start / stop the camera
  help                  this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    UpdateConfig(ConfigUpdate),
    ShowConfig,
    ListCameras,
    SelectCamera(String),
    StartTracking,
    StopTracking,
    CameraOn,
    CameraOff,
    Help,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err("empty command".to_string());
        };
        let rest: Vec<&str> = words.collect();

        let command = match (head, rest.as_slice()) {
            ("osc", [address]) => ConsoleCommand::UpdateConfig(ConfigUpdate::address(*address)),
            ("osc", [address, port]) => {
                ConsoleCommand::UpdateConfig(ConfigUpdate::endpoint(*address, parse_port(port)?))
            }
            ("port", [port]) => ConsoleCommand::UpdateConfig(ConfigUpdate::port(parse_port(port)?)),
            ("config", []) => ConsoleCommand::ShowConfig,
            ("cams", []) => ConsoleCommand::ListCameras,
            ("cam", [id]) => ConsoleCommand::SelectCamera(id.to_string()),
            ("start", []) => ConsoleCommand::StartTracking,
            ("stop", []) => ConsoleCommand::StopTracking,
            ("camera", ["on"]) => ConsoleCommand::CameraOn,
            ("camera", ["off"]) => ConsoleCommand::CameraOff,
            ("help", []) | ("?", []) => ConsoleCommand::Help,
            _ => return Err(format!("unknown command: {} (type 'help')", line.trim())),
        };
        Ok(command)
    }
}

fn parse_port(text: &str) -> Result<u16, String> {
    match text.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port: {}", text)),
        Ok(port) => Ok(port),
    }
}

/// stdin を読むスレッドを起動。解釈できない行はその場で stderr に出す
pub fn spawn_reader(tx: mpsc::Sender<ConsoleCommand>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match ConsoleCommand::parse(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("[input] {}", e),
            }
        }
    })
}
