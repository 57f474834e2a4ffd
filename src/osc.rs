use rosc::{encoder, OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};

/// Typed OSC argument as carried over the bridge: `{"type": "f", "value": 0.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OscArg {
    #[serde(rename = "f")]
    Float(f32),
    #[serde(rename = "i")]
    Int(i32),
    #[serde(rename = "s")]
    Str(String),
}

impl OscArg {
    pub fn type_tag(&self) -> char {
        match self {
            OscArg::Float(_) => 'f',
            OscArg::Int(_) => 'i',
            OscArg::Str(_) => 's',
        }
    }
}

impl From<OscArg> for OscType {
    fn from(arg: OscArg) -> Self {
        match arg {
            OscArg::Float(v) => OscType::Float(v),
            OscArg::Int(v) => OscType::Int(v),
            OscArg::Str(v) => OscType::String(v),
        }
    }
}

/// One outbound message: slash-delimited address plus ordered typed args.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscCommand {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscCommand {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Message whose arguments are all floats.
    pub fn floats(address: impl Into<String>, values: impl IntoIterator<Item = f32>) -> Self {
        Self::new(address, values.into_iter().map(OscArg::Float).collect())
    }

    pub fn is_valid_address(&self) -> bool {
        self.address.starts_with('/') && !self.address.contains(char::is_whitespace)
    }
}

pub fn build_osc_message(command: &OscCommand) -> OscMessage {
    OscMessage {
        addr: command.address.clone(),
        args: command.args.iter().cloned().map(OscType::from).collect(),
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_osc_message(msg: OscMessage) -> Result<Vec<u8>, rosc::OscError> {
    encoder::encode(&OscPacket::Message(msg))
}

pub fn encode_command(command: &OscCommand) -> Result<Vec<u8>, rosc::OscError> {
    encode_osc_message(build_osc_message(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::decoder;

    #[test]
    fn test_build_osc_message_address() {
        let cmd = OscCommand::floats("/pose/nose/position", [0.1, 0.2, 0.3]);
        let msg = build_osc_message(&cmd);
        assert_eq!(msg.addr, "/pose/nose/position");
    }

    #[test]
    fn test_build_osc_message_args() {
        let cmd = OscCommand::new(
            "/test",
            vec![OscArg::Float(1.5), OscArg::Int(7), OscArg::Str("hi".to_string())],
        );
        let msg = build_osc_message(&cmd);
        assert_eq!(msg.args.len(), 3);
        assert_eq!(msg.args[0], OscType::Float(1.5));
        assert_eq!(msg.args[1], OscType::Int(7));
        assert_eq!(msg.args[2], OscType::String("hi".to_string()));
    }

    #[test]
    fn test_encoded_packet_decodes_to_same_message() {
        let cmd = OscCommand::floats("/pose/all", [1.0, 2.0, 3.0]);
        let encoded = encode_command(&cmd).unwrap();
        let (_, packet) = decoder::decode_udp(&encoded).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/pose/all");
                assert_eq!(msg.args, vec![OscType::Float(1.0), OscType::Float(2.0), OscType::Float(3.0)]);
            }
            OscPacket::Bundle(_) => panic!("expected message"),
        }
    }

    #[test]
    fn test_valid_address() {
        assert!(OscCommand::floats("/pose/all", []).is_valid_address());
        assert!(!OscCommand::floats("pose/all", []).is_valid_address());
        assert!(!OscCommand::floats("/pose all", []).is_valid_address());
        assert!(!OscCommand::floats("", []).is_valid_address());
    }

    #[test]
    fn test_arg_type_tags() {
        assert_eq!(OscArg::Float(0.0).type_tag(), 'f');
        assert_eq!(OscArg::Int(0).type_tag(), 'i');
        assert_eq!(OscArg::Str(String::new()).type_tag(), 's');
    }

    #[test]
    fn test_arg_serde_shape() {
        let value = toml::Value::try_from(OscArg::Float(0.5)).unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table["type"].as_str(), Some("f"));
        assert_eq!(table["value"].as_float(), Some(0.5));
    }
}
