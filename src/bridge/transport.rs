use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::osc::{encode_command, OscCommand};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },
    #[error("transport is not open")]
    NotOpen,
    #[error("invalid OSC address {0:?}")]
    InvalidAddress(String),
    #[error("failed to encode OSC message: {0}")]
    Encode(#[from] rosc::OscError),
    #[error("failed to send to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// The single live transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub metadata: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            local_address: "0.0.0.0".to_string(),
            local_port: 57121,
            remote_address: "127.0.0.1".to_string(),
            remote_port: 8000,
            metadata: true,
        }
    }
}

impl TransportConfig {
    pub fn local_endpoint(&self) -> String {
        format!("{}:{}", self.local_address, self.local_port)
    }

    pub fn remote_endpoint(&self) -> String {
        format!("{}:{}", self.remote_address, self.remote_port)
    }

    /// Omitted, blank or zero fields keep the current value.
    pub fn merged(&self, update: &ConfigUpdate) -> Self {
        let mut next = self.clone();
        if let Some(addr) = update.remote_address.as_deref().map(str::trim) {
            if !addr.is_empty() {
                next.remote_address = addr.to_string();
            }
        }
        if let Some(port) = update.remote_port {
            if port != 0 {
                next.remote_port = port;
            }
        }
        next
    }
}

/// Partial update of the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
}

impl ConfigUpdate {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            remote_address: Some(address.into()),
            remote_port: None,
        }
    }

    pub fn port(port: u16) -> Self {
        Self {
            remote_address: None,
            remote_port: Some(port),
        }
    }

    pub fn endpoint(address: impl Into<String>, port: u16) -> Self {
        Self {
            remote_address: Some(address.into()),
            remote_port: Some(port),
        }
    }
}

/// Owns the one UDP socket. Reopened on every reconfiguration.
pub struct OscTransport {
    config: TransportConfig,
    socket: Option<UdpSocket>,
    remote: Option<SocketAddr>,
}

impl OscTransport {
    /// Never fails: bind and resolve errors are logged and leave the
    /// transport closed until the next reconfiguration.
    pub async fn open(config: TransportConfig) -> Self {
        let mut transport = Self {
            config,
            socket: None,
            remote: None,
        };
        transport.open_socket().await;
        transport
    }

    async fn open_socket(&mut self) {
        match self.try_open().await {
            Ok((socket, remote)) => {
                let local = socket
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| self.config.local_endpoint());
                info!("OSC ready. Listening on {}, sending to {}", local, remote);
                self.socket = Some(socket);
                self.remote = Some(remote);
            }
            Err(e) => {
                error!("OSC transport unavailable: {}", e);
                self.socket = None;
                self.remote = None;
            }
        }
    }

    async fn try_open(&self) -> Result<(UdpSocket, SocketAddr), TransportError> {
        let local = self.config.local_endpoint();
        let socket = UdpSocket::bind(&local)
            .await
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        let remote = resolve(&self.config.remote_endpoint()).await?;
        Ok((socket, remote))
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn current_config(&self) -> TransportConfig {
        self.config.clone()
    }

    /// Bound local address, if open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Serialize and transmit one datagram. No acknowledgement.
    pub async fn send(&self, command: &OscCommand) -> Result<usize, TransportError> {
        if !command.is_valid_address() {
            return Err(TransportError::InvalidAddress(command.address.clone()));
        }
        let (Some(socket), Some(remote)) = (self.socket.as_ref(), self.remote) else {
            return Err(TransportError::NotOpen);
        };
        let data = encode_command(command)?;
        let sent = socket
            .send_to(&data, remote)
            .await
            .map_err(|source| TransportError::Send { addr: remote, source })?;
        debug!(address = %command.address, bytes = sent, "sent");
        Ok(sent)
    }

    /// Close, merge, reopen. Returns the resulting full configuration.
    pub async fn reconfigure(&mut self, update: &ConfigUpdate) -> TransportConfig {
        // the old socket must be gone before the local port is rebound
        self.socket = None;
        self.remote = None;
        let next = self.config.merged(update);
        if next == self.config {
            info!("OSC config unchanged, reopening {}", next.remote_endpoint());
        } else {
            info!(
                "OSC config {} -> {}",
                self.config.remote_endpoint(),
                next.remote_endpoint()
            );
        }
        self.config = next;
        self.open_socket().await;
        self.config.clone()
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("OSC transport closed");
        }
        self.remote = None;
    }
}

async fn resolve(endpoint: &str) -> Result<SocketAddr, TransportError> {
    let all: Vec<SocketAddr> = tokio::net::lookup_host(endpoint)
        .await
        .map_err(|e| TransportError::Resolve {
            addr: endpoint.to_string(),
            reason: e.to_string(),
        })?
        .collect();
    // IPv4 first, matching the default 0.0.0.0 bind
    all.iter()
        .find(|a| a.is_ipv4())
        .or_else(|| all.first())
        .copied()
        .ok_or_else(|| {
            warn!("no addresses for {}", endpoint);
            TransportError::Resolve {
                addr: endpoint.to_string(),
                reason: "no addresses".to_string(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{decoder, OscPacket, OscType};

    fn loopback_config(remote_port: u16) -> TransportConfig {
        TransportConfig {
            local_address: "127.0.0.1".to_string(),
            local_port: 0,
            remote_address: "127.0.0.1".to_string(),
            remote_port,
            metadata: true,
        }
    }

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    async fn recv_message(socket: &UdpSocket) -> rosc::OscMessage {
        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        match decoder::decode_udp(&buf[..len]).unwrap().1 {
            OscPacket::Message(msg) => msg,
            OscPacket::Bundle(_) => panic!("expected message"),
        }
    }

    #[test]
    fn test_merge_keeps_omitted_port() {
        let config = TransportConfig::default();
        let merged = config.merged(&ConfigUpdate::address("10.0.0.5"));
        assert_eq!(merged.remote_address, "10.0.0.5");
        assert_eq!(merged.remote_port, 8000);
    }

    #[test]
    fn test_merge_keeps_omitted_address() {
        let config = TransportConfig::default();
        let merged = config.merged(&ConfigUpdate::port(9000));
        assert_eq!(merged.remote_address, "127.0.0.1");
        assert_eq!(merged.remote_port, 9000);
    }

    #[test]
    fn test_merge_ignores_blank_and_zero() {
        let config = TransportConfig::default();
        let merged = config.merged(&ConfigUpdate::endpoint("  ", 0));
        assert_eq!(merged, config);
    }

    #[test]
    fn test_merge_never_touches_local_side() {
        let config = TransportConfig::default();
        let merged = config.merged(&ConfigUpdate::endpoint("192.168.1.2", 7000));
        assert_eq!(merged.local_address, "0.0.0.0");
        assert_eq!(merged.local_port, 57121);
        assert!(merged.metadata);
    }

    #[tokio::test]
    async fn test_send_delivers_one_datagram() {
        let (rx, port) = receiver().await;
        let transport = OscTransport::open(loopback_config(port)).await;
        assert!(transport.is_open());

        let cmd = OscCommand::floats("/pose/nose/position", [0.1, 0.2, 0.3]);
        transport.send(&cmd).await.unwrap();

        let msg = recv_message(&rx).await;
        assert_eq!(msg.addr, "/pose/nose/position");
        assert_eq!(
            msg.args,
            vec![OscType::Float(0.1), OscType::Float(0.2), OscType::Float(0.3)]
        );
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_address() {
        let (_rx, port) = receiver().await;
        let transport = OscTransport::open(loopback_config(port)).await;
        let err = transport
            .send(&OscCommand::floats("pose", [1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_transport_closed() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = loopback_config(9);
        config.local_port = taken.local_addr().unwrap().port();

        let transport = OscTransport::open(config).await;
        assert!(!transport.is_open());
        let err = transport
            .send(&OscCommand::floats("/pose/all", [0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotOpen));
    }

    #[tokio::test]
    async fn test_reconfigure_redirects_and_keeps_port() {
        let (first, first_port) = receiver().await;
        let mut transport = OscTransport::open(loopback_config(first_port)).await;

        let config = transport.reconfigure(&ConfigUpdate::address("localhost")).await;
        assert_eq!(config.remote_address, "localhost");
        assert_eq!(config.remote_port, first_port);
        assert!(transport.is_open());

        transport
            .send(&OscCommand::floats("/pose/all", [1.0]))
            .await
            .unwrap();
        let msg = recv_message(&first).await;
        assert_eq!(msg.addr, "/pose/all");

        let (second, second_port) = receiver().await;
        let config = transport.reconfigure(&ConfigUpdate::port(second_port)).await;
        assert_eq!(config.remote_address, "localhost");
        assert_eq!(config.remote_port, second_port);
        transport
            .send(&OscCommand::floats("/pose/all", [2.0]))
            .await
            .unwrap();
        let msg = recv_message(&second).await;
        assert_eq!(msg.args, vec![OscType::Float(2.0)]);
    }

    #[tokio::test]
    async fn test_close_then_send_fails() {
        let (_rx, port) = receiver().await;
        let mut transport = OscTransport::open(loopback_config(port)).await;
        transport.close();
        assert!(!transport.is_open());
        assert!(transport.local_addr().is_none());
    }
}
