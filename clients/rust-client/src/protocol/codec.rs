use super::command::Command;
use super::error::BridgeError;
use super::response::Response;
use serde::{Deserialize, Serialize};

pub const BRIDGE_MAGIC: &[u8] = b"sqlbridge-v1\0";
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, BridgeError> {
    encode_message(cmd)
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, BridgeError> {
    encode_message(resp)
}

/// Serialize `msg` and prefix it with its 4-byte big-endian length
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, BridgeError> {
    let payload = rmp_serde::to_vec_named(msg)
        .map_err(|e| BridgeError::ProtocolError(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(BridgeError::MessageTooLarge);
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, BridgeError> {
    rmp_serde::from_slice(data)
        .map_err(|e| BridgeError::ProtocolError(format!("Deserialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::ParameterType;

    #[test]
    fn test_frame_prefix_matches_payload() {
        let frame = encode_command(&Command::Ping).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }

    #[test]
    fn test_command_round_trip() {
        let cmd = Command::SetParameter {
            statement_id: "s1".to_string(),
            index: 2,
            param_type: ParameterType::String,
            value: "a\0b".to_string(),
        };
        let frame = encode_command(&cmd).unwrap();
        let decoded: Command = decode_message(&frame[4..]).unwrap();
        match decoded {
            Command::SetParameter {
                statement_id,
                index,
                param_type,
                value,
            } => {
                assert_eq!(statement_id, "s1");
                assert_eq!(index, 2);
                assert_eq!(param_type, ParameterType::String);
                assert_eq!(value.as_bytes(), b"a\0b");
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_chunk_rows_travel_as_binary() {
        let resp = Response::chunk(vec![0u8; 64], false);
        let frame = encode_response(&resp).unwrap();
        // msgpack bin8 keeps the payload compact: 64 raw bytes plus a small envelope
        assert!(frame.len() < 64 + 48);
        let decoded: Response = decode_message(&frame[4..]).unwrap();
        match decoded {
            Response::Chunk { rows, is_completed } => {
                assert_eq!(rows.len(), 64);
                assert!(!is_completed);
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_error_round_trip() {
        let resp = Response::error(BridgeError::HandleNotFound("result set abc".into()));
        let frame = encode_response(&resp).unwrap();
        let decoded: Response = decode_message(&frame[4..]).unwrap();
        match decoded {
            Response::Error { error } => {
                assert_eq!(error.code(), "HANDLE_NOT_FOUND");
                assert_eq!(error.description(), "result set abc");
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let result: Result<Command, _> = decode_message(&[0xc1, 0x00, 0x13]);
        assert!(matches!(result, Err(BridgeError::ProtocolError(_))));
    }
}
