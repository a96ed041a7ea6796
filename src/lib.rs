pub mod codec;
pub mod network;

mod app_error;
mod config;
mod tracing_config;

pub use app_error::{AppError, AppResult};
pub use codec::Framing;
pub use crate::config::{
    EndpointConfig, NetworkConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
pub use network::{Connection, ConnectionSink, Dialer, Endpoint, Listener};
pub use tracing_config::setup_tracing;
