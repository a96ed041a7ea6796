extern crate config as rs_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::Framing;
use crate::AppError::InvalidValue;
use crate::AppResult;

/// Default upper bound on a single message, one GiB. Chiefly a sanity
/// check against peers that starve the process by declaring enormous
/// frames.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_073_741_824;

/// Initial read-buffer size for delimited framing. Messages larger than
/// this still work, the buffer grows to fit them.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Upper bound in bytes on any single message, enforced on both encode
    /// and decode.
    pub max_message_size: usize,
    /// Initial read-buffer size; only delimited framing uses it.
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Full configuration for a listening or dialing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub framing: Framing,
    pub network: NetworkConfig,
}

impl EndpointConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<EndpointConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(InvalidValue("config file path", String::new()))?;
        let config = rs_config::Config::builder()
            .add_source(rs_config::File::with_name(path_str))
            .build()?;
        let endpoint_config: EndpointConfig = config.try_deserialize()?;
        endpoint_config.framing.validate()?;
        Ok(endpoint_config)
    }
}
