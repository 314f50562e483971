//! Gateway wire protocol server
//!
//! Clients speak a framed binary protocol over TCP:
//! - **Magic Header**: `sqlbridge-v1\0` (13 bytes, sent once on connection)
//! - **Request Frame**: `[length: 4 bytes BE][msgpack Command]`
//! - **Response Frame**: `[length: 4 bytes BE][msgpack Response]`
//!
//! Each TCP session is served by one task that processes its commands in
//! order. Handles are shared across sessions.

pub use sqlbridge_client::protocol::{
    decode_message, encode_response, BridgeError, Command, Response, BRIDGE_MAGIC,
    MAX_MESSAGE_SIZE,
};

pub mod handlers;

pub use handlers::{serve, spawn_gateway_handler, GatewayHandler};
