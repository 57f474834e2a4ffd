pub mod bridge;
pub mod camera;
pub mod config;
pub mod console;
pub mod encoder;
pub mod logging;
pub mod osc;
pub mod pose;
pub mod render;
pub mod session;
pub mod telemetry;
