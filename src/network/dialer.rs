use std::sync::Arc;

use tokio::net::{self, TcpStream};
use tracing::debug;

use crate::codec::Framing;
use crate::network::{Connection, ConnectionSink};
use crate::{AppError, AppResult, NetworkConfig};

/// Establishes framed connections to remote peers.
pub struct Dialer {
    framing: Framing,
    config: NetworkConfig,
    sink: Arc<dyn ConnectionSink>,
}

impl Dialer {
    pub fn new(
        framing: Framing,
        config: NetworkConfig,
        sink: Arc<dyn ConnectionSink>,
    ) -> AppResult<Dialer> {
        framing.validate()?;
        Ok(Dialer {
            framing,
            config,
            sink,
        })
    }

    /// Resolves `host` and tries each endpoint in resolution order with a
    /// fresh connection per attempt. The first success is started and
    /// delivered through `accepted`, exactly like an inbound connection;
    /// if every endpoint fails, the last error is delivered instead.
    pub async fn dial(&self, host: &str, port: u16) {
        let addrs = match net::lookup_host((host, port)).await {
            Ok(addrs) => addrs,
            Err(error) => {
                self.sink.error(error.into());
                return;
            }
        };

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => match Connection::new(self.framing.clone(), &self.config, Some(addr))
                {
                    Ok(connection) => {
                        debug!(%addr, "connected");
                        connection.start(stream, self.sink.clone());
                        self.sink.accepted(connection);
                        return;
                    }
                    Err(error) => {
                        self.sink.error(error);
                        return;
                    }
                },
                Err(error) => {
                    debug!(%addr, "connect attempt failed: {}", error);
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) => self.sink.error(error.into()),
            None => self.sink.error(AppError::Resolve(format!(
                "{host}:{port} resolved to no addresses"
            ))),
        }
    }
}
