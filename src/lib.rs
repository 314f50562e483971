pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod stream;

pub use backend::{
    Backend, BackendConnection, BackendCursor, BackendRegistry, BackendStatement, SqliteBackend,
};
pub use config::GatewayConfig;
pub use driver::{serve, spawn_gateway_handler, GatewayHandler};
pub use error::{GatewayError, GatewayResult, HandleKind};
pub use gateway::Gateway;
pub use registry::HandleRegistry;
pub use session::SessionStore;
pub use stream::{Frame, ResultStreamer};
