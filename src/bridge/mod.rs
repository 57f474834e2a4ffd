pub mod channel;
pub mod transport;

pub use channel::{channel, BridgeClient, BridgeEvent, BridgeHost, BridgeRequest, ChannelError, MessageSink};
pub use transport::{ConfigUpdate, OscTransport, TransportConfig, TransportError};
