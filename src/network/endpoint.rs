use std::net::SocketAddr;
use std::sync::Arc;

use crate::codec::Framing;
use crate::network::{ConnectionSink, Dialer, Listener};
use crate::{AppResult, EndpointConfig, NetworkConfig};

/// A listener and a dialer sharing one sink, framing and configuration:
/// the combined client-and-server role on a single process.
pub struct Endpoint {
    listener: Listener,
    dialer: Dialer,
}

impl Endpoint {
    pub fn new(
        framing: Framing,
        config: NetworkConfig,
        sink: Arc<dyn ConnectionSink>,
    ) -> AppResult<Endpoint> {
        Ok(Endpoint {
            listener: Listener::new(framing.clone(), config.clone(), sink.clone())?,
            dialer: Dialer::new(framing, config, sink)?,
        })
    }

    pub fn from_config(config: &EndpointConfig, sink: Arc<dyn ConnectionSink>) -> AppResult<Endpoint> {
        Endpoint::new(config.framing.clone(), config.network.clone(), sink)
    }

    pub async fn listen(&self, port: u16) {
        self.listener.listen(port).await
    }

    pub fn unlisten(&self, port: u16) {
        self.listener.unlisten(port)
    }

    pub fn bound_addrs(&self, port: u16) -> Vec<SocketAddr> {
        self.listener.bound_addrs(port)
    }

    pub async fn dial(&self, host: &str, port: u16) {
        self.dialer.dial(host, port).await
    }
}
