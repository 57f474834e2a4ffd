//! OSC受信テスト
//!
//! pose-osc の送信内容を確認する。100件ごとに1件表示し、1000件ごとに集計を出す。

use anyhow::{Context, Result};
use rosc::{OscMessage, OscPacket, OscType};
use std::time::Instant;
use tokio::net::UdpSocket;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const PRINT_EVERY: u64 = 100;
const SUMMARY_EVERY: u64 = 1000;
const RECV_BUF_SIZE: usize = 65_536;

struct Stats {
    started: Instant,
    messages: u64,
    packets: u64,
    decode_errors: u64,
}

impl Stats {
    fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.messages as f64 / secs
        } else {
            0.0
        }
    }

    fn print_summary(&self, label: &str) {
        println!(
            "--- {}: {} messages / {} packets in {:.1}s ({:.0} msg/s), decode errors {} ---",
            label,
            self.messages,
            self.packets,
            self.started.elapsed().as_secs_f64(),
            self.rate(),
            self.decode_errors
        );
    }
}

fn format_arg(arg: &OscType) -> String {
    match arg {
        OscType::Float(v) => format!("{:.3}", v),
        OscType::Double(v) => format!("{:.3}", v),
        OscType::Int(v) => v.to_string(),
        OscType::Long(v) => v.to_string(),
        OscType::String(s) => format!("\"{}\"", s),
        other => format!("{:?}", other),
    }
}

fn format_message(msg: &OscMessage) -> String {
    let args: Vec<String> = msg.args.iter().map(format_arg).collect();
    format!("{} [{}]", msg.addr, args.join(", "))
}

/// バンドルは中身のメッセージに展開する
fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let bind = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_BIND.to_string());
    let socket = UdpSocket::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    println!("=== OSC Receiver ===");
    println!("Listening on {}", socket.local_addr()?);
    println!("Ctrl-C で終了");
    println!();

    let mut stats = Stats {
        started: Instant::now(),
        messages: 0,
        packets: 0,
        decode_errors: 0,
    };
    let mut buf = vec![0u8; RECV_BUF_SIZE];
    let mut messages = Vec::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!("recv error: {}", e);
                        continue;
                    }
                };
                stats.packets += 1;

                let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                    Ok((_, packet)) => packet,
                    Err(e) => {
                        stats.decode_errors += 1;
                        eprintln!("decode error from {}: {}", from, e);
                        continue;
                    }
                };

                messages.clear();
                flatten(packet, &mut messages);
                for msg in &messages {
                    stats.messages += 1;
                    if stats.messages % PRINT_EVERY == 0 {
                        println!(
                            "#{} {} ({:.0} msg/s)",
                            stats.messages,
                            format_message(msg),
                            stats.rate()
                        );
                    }
                    if stats.messages % SUMMARY_EVERY == 0 {
                        stats.print_summary("summary");
                    }
                }
            }
        }
    }

    println!();
    stats.print_summary("final");
    Ok(())
}
