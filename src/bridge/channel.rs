//! Message channel between the presentation side and the bridge host.
//!
//! Four message kinds only: `SendData` (fire-and-forget), `GetConfig` and
//! `UpdateConfig` (each answered by one `BridgeEvent`).

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::transport::{ConfigUpdate, OscTransport, TransportConfig};
use crate::osc::OscCommand;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("bridge host is not running")]
    Closed,
    #[error("no reply from bridge host within {0:?}")]
    Timeout(Duration),
    #[error("unexpected reply from bridge host")]
    UnexpectedReply,
}

/// presentation -> bridge
#[derive(Debug)]
pub enum BridgeRequest {
    SendData(OscCommand),
    GetConfig {
        reply: oneshot::Sender<BridgeEvent>,
    },
    UpdateConfig {
        update: ConfigUpdate,
        reply: oneshot::Sender<BridgeEvent>,
    },
}

/// bridge -> presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Config(TransportConfig),
    ConfigUpdated(TransportConfig),
}

/// Fire-and-forget destination for encoded pose messages.
pub trait MessageSink {
    fn send_data(&self, command: OscCommand);
}

/// Presentation-side handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    tx: mpsc::Sender<BridgeRequest>,
    request_timeout: Duration,
}

impl BridgeClient {
    /// Queue one message without waiting. Returns false if it was dropped.
    pub fn try_send_data(&self, command: OscCommand) -> bool {
        match self.tx.try_send(BridgeRequest::SendData(command)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("bridge queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("bridge host gone, dropping message");
                false
            }
        }
    }

    pub async fn get_config(&self) -> Result<TransportConfig, ChannelError> {
        let (reply, rx) = oneshot::channel();
        match self.request(BridgeRequest::GetConfig { reply }, rx).await? {
            BridgeEvent::Config(config) => Ok(config),
            BridgeEvent::ConfigUpdated(_) => Err(ChannelError::UnexpectedReply),
        }
    }

    pub async fn update_config(&self, update: ConfigUpdate) -> Result<TransportConfig, ChannelError> {
        let (reply, rx) = oneshot::channel();
        match self
            .request(BridgeRequest::UpdateConfig { update, reply }, rx)
            .await?
        {
            BridgeEvent::ConfigUpdated(config) => Ok(config),
            BridgeEvent::Config(_) => Err(ChannelError::UnexpectedReply),
        }
    }

    async fn request(
        &self,
        request: BridgeRequest,
        rx: oneshot::Receiver<BridgeEvent>,
    ) -> Result<BridgeEvent, ChannelError> {
        let exchange = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| ChannelError::Closed)?;
            rx.await.map_err(|_| ChannelError::Closed)
        };
        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| ChannelError::Timeout(self.request_timeout))?
    }
}

impl MessageSink for BridgeClient {
    fn send_data(&self, command: OscCommand) {
        self.try_send_data(command);
    }
}

/// Owns the transport and serves requests strictly in arrival order.
pub struct BridgeHost {
    rx: mpsc::Receiver<BridgeRequest>,
    config: TransportConfig,
}

impl BridgeHost {
    /// Runs until every client has been dropped.
    pub async fn run(mut self) {
        let mut transport = OscTransport::open(self.config.clone()).await;
        let mut dropped: u64 = 0;

        while let Some(request) = self.rx.recv().await {
            match request {
                BridgeRequest::SendData(command) => {
                    if let Err(e) = transport.send(&command).await {
                        dropped += 1;
                        // first drop, then every 100th
                        if dropped == 1 || dropped % 100 == 0 {
                            warn!("OSC send failed ({} dropped so far): {}", dropped, e);
                        }
                    }
                }
                BridgeRequest::GetConfig { reply } => {
                    let _ = reply.send(BridgeEvent::Config(transport.current_config()));
                }
                BridgeRequest::UpdateConfig { update, reply } => {
                    let config = transport.reconfigure(&update).await;
                    let _ = reply.send(BridgeEvent::ConfigUpdated(config));
                }
            }
        }

        transport.close();
        info!("bridge host stopped");
    }
}

/// Create the host/client pair. The host must be spawned on a tokio runtime.
pub fn channel(
    config: TransportConfig,
    queue_capacity: usize,
    request_timeout: Duration,
) -> (BridgeClient, BridgeHost) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    (
        BridgeClient { tx, request_timeout },
        BridgeHost { rx, config },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{decoder, OscPacket};
    use tokio::net::UdpSocket;

    async fn spawn_bridge(remote_port: u16) -> BridgeClient {
        let config = TransportConfig {
            local_address: "127.0.0.1".to_string(),
            local_port: 0,
            remote_address: "127.0.0.1".to_string(),
            remote_port,
            metadata: true,
        };
        let (client, host) = channel(config, 64, Duration::from_secs(2));
        tokio::spawn(host.run());
        client
    }

    #[tokio::test]
    async fn test_get_config_replies_with_full_config() {
        let client = spawn_bridge(8000).await;
        let config = client.get_config().await.unwrap();
        assert_eq!(config.remote_address, "127.0.0.1");
        assert_eq!(config.remote_port, 8000);
        assert!(config.metadata);
    }

    #[tokio::test]
    async fn test_update_config_preserves_omitted_port() {
        let client = spawn_bridge(8000).await;
        let updated = client
            .update_config(ConfigUpdate::address("10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(updated.remote_address, "10.0.0.5");
        assert_eq!(updated.remote_port, 8000);

        let current = client.get_config().await.unwrap();
        assert_eq!(current, updated);
    }

    #[tokio::test]
    async fn test_send_data_reaches_remote() {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = spawn_bridge(rx.local_addr().unwrap().port()).await;

        assert!(client.try_send_data(OscCommand::floats("/pose/nose/visibility", [0.9])));

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        match decoder::decode_udp(&buf[..len]).unwrap().1 {
            OscPacket::Message(msg) => assert_eq!(msg.addr, "/pose/nose/visibility"),
            OscPacket::Bundle(_) => panic!("expected message"),
        }
    }

    #[tokio::test]
    async fn test_requests_fail_when_host_is_gone() {
        let (client, host) = channel(TransportConfig::default(), 4, Duration::from_millis(200));
        drop(host);
        assert_eq!(client.get_config().await, Err(ChannelError::Closed));
        assert!(!client.try_send_data(OscCommand::floats("/pose/all", [])));
    }

    #[tokio::test]
    async fn test_request_times_out_when_host_never_answers() {
        let timeout = Duration::from_millis(50);
        // host exists but is never run, so the queue accepts and nobody replies
        let (client, _host) = channel(TransportConfig::default(), 4, timeout);
        assert_eq!(client.get_config().await, Err(ChannelError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn test_full_queue_drops_messages() {
        let (client, _host) = channel(TransportConfig::default(), 1, Duration::from_millis(50));
        assert!(client.try_send_data(OscCommand::floats("/pose/all", [])));
        assert!(!client.try_send_data(OscCommand::floats("/pose/all", [])));
    }
}
