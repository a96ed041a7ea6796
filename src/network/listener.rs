use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::Framing;
use crate::network::{Connection, ConnectionSink};
use crate::{AppResult, NetworkConfig};

#[derive(Debug)]
struct AcceptorHandle {
    local_addr: SocketAddr,
    cancelled: CancellationToken,
}

/// Accepts framed connections on one or more ports.
///
/// `listen` may be called repeatedly with different ports. A port maps to
/// a small group of acceptors because serving both address families can
/// take two sockets; `unlisten` always removes the group as a whole.
/// Accepted connections are started and handed to the sink; the listener
/// keeps no reference to them.
pub struct Listener {
    framing: Framing,
    config: NetworkConfig,
    sink: Arc<dyn ConnectionSink>,
    acceptors: DashMap<u16, Vec<AcceptorHandle>>,
}

impl Listener {
    pub fn new(
        framing: Framing,
        config: NetworkConfig,
        sink: Arc<dyn ConnectionSink>,
    ) -> AppResult<Listener> {
        framing.validate()?;
        Ok(Listener {
            framing,
            config,
            sink,
            acceptors: DashMap::new(),
        })
    }

    /// Binds `port` and starts accepting.
    ///
    /// The v6 wildcard is bound first. On hosts where that socket is
    /// v6-only, binding the v4 wildcard afterwards succeeds and a second
    /// acceptor joins the group; on dual-stack hosts the v4 bind fails
    /// with `AddrInUse`, which just means the first socket already serves
    /// both families. Bind failures go to the sink and leave other ports
    /// unaffected.
    pub async fn listen(&self, port: u16) {
        let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
        let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let mut sockets = Vec::new();
        match TcpListener::bind(v6).await {
            Ok(socket) => {
                sockets.push(socket);
                // an ephemeral port cannot be re-bound on the other
                // family, so the probe only makes sense for a fixed port
                if port != 0 {
                    match TcpListener::bind(v4).await {
                        Ok(socket) => sockets.push(socket),
                        Err(error) if error.kind() == io::ErrorKind::AddrInUse => {}
                        Err(error) => self.sink.error(error.into()),
                    }
                }
            }
            Err(v6_error) => match TcpListener::bind(v4).await {
                Ok(socket) => sockets.push(socket),
                Err(_) => {
                    error!(port, "bind failed: {}", v6_error);
                    self.sink.error(v6_error.into());
                    return;
                }
            },
        }

        let mut handles = Vec::with_capacity(sockets.len());
        for socket in sockets {
            let local_addr = match socket.local_addr() {
                Ok(local_addr) => local_addr,
                Err(error) => {
                    self.sink.error(error.into());
                    continue;
                }
            };
            let cancelled = CancellationToken::new();
            handles.push(AcceptorHandle {
                local_addr,
                cancelled: cancelled.clone(),
            });
            debug!(%local_addr, "listening");
            tokio::spawn(accept_loop(
                socket,
                self.framing.clone(),
                self.config.clone(),
                self.sink.clone(),
                cancelled,
            ));
        }
        self.acceptors.entry(port).or_default().extend(handles);
    }

    /// Closes every acceptor bound for `port`. Accept completions already
    /// in flight observe the cancellation and return without touching the
    /// table, so this is safe to call at any time.
    pub fn unlisten(&self, port: u16) {
        if let Some((_, handles)) = self.acceptors.remove(&port) {
            for handle in handles {
                handle.cancelled.cancel();
                debug!(local_addr = %handle.local_addr, "stopped listening");
            }
        }
    }

    /// Local addresses currently accepting for `port`. With `port` 0 this
    /// is how the actual ephemeral address is discovered.
    pub fn bound_addrs(&self, port: u16) -> Vec<SocketAddr> {
        self.acceptors
            .get(&port)
            .map(|handles| handles.iter().map(|handle| handle.local_addr).collect())
            .unwrap_or_default()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        for entry in self.acceptors.iter() {
            for handle in entry.value() {
                handle.cancelled.cancel();
            }
        }
        debug!("listener dropped");
    }
}

async fn accept_loop(
    socket: TcpListener,
    framing: Framing,
    config: NetworkConfig,
    sink: Arc<dyn ConnectionSink>,
    cancelled: CancellationToken,
) {
    let mut backoff = 1;
    loop {
        let accepted = tokio::select! {
            _ = cancelled.cancelled() => return,
            accepted = socket.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer_addr)) => {
                backoff = 1;
                match Connection::new(framing.clone(), &config, Some(peer_addr)) {
                    Ok(connection) => {
                        debug!(%peer_addr, "accepted connection");
                        connection.start(stream, sink.clone());
                        sink.accepted(connection);
                    }
                    Err(error) => sink.error(error),
                }
            }
            Err(error) => {
                error!("accept error: {}", error);
                sink.error(error.into());
                if backoff > 64 {
                    return;
                }
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    _ = time::sleep(Duration::from_secs(backoff)) => {}
                }
                backoff *= 2;
            }
        }
    }
}
