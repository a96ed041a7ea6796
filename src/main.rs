use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info};

use framelink::{
    AppError, AppResult, Connection, ConnectionSink, Dialer, EndpointConfig, Framing, Listener,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// wire framing (ignored when a config file is given)
    #[arg(short, long, value_enum, default_value = "length-prefixed")]
    pub framing: FramingArg,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, ValueEnum)]
pub enum FramingArg {
    LengthPrefixed,
    Netstring,
    /// newline-delimited
    Line,
}

#[derive(Subcommand)]
pub enum Command {
    /// Accept connections and echo every message back
    Serve {
        #[arg(short, long, default_value_t = 6000)]
        port: u16,
    },
    /// Connect, send each argument as one message, print the replies
    Send {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(short, long, default_value_t = 6000)]
        port: u16,
        message: Vec<String>,
    },
}

struct EchoSink {
    connections: DashMap<u64, Arc<Connection>>,
}

impl ConnectionSink for EchoSink {
    fn accepted(&self, connection: Arc<Connection>) {
        info!(id = connection.id(), peer = ?connection.peer_addr(), "new connection");
        self.connections.insert(connection.id(), connection);
    }

    fn received(&self, connection: &Arc<Connection>, message: &[u8]) {
        if let Err(e) = connection.send(message) {
            error!(id = connection.id(), "echo failed: {}", e);
        }
    }

    fn connection_error(&self, connection: &Arc<Connection>, error: AppError) {
        if error.is_framing_error() {
            error!(id = connection.id(), "protocol violation: {}", error);
        } else {
            info!(id = connection.id(), "connection finished: {}", error);
        }
        self.connections.remove(&connection.id());
    }

    fn error(&self, error: AppError) {
        error!("listener error: {}", error);
    }
}

struct ClientSink {
    messages: Vec<Vec<u8>>,
    remaining: AtomicUsize,
    connection: Mutex<Option<Arc<Connection>>>,
    done: mpsc::UnboundedSender<()>,
}

impl ConnectionSink for ClientSink {
    fn accepted(&self, connection: Arc<Connection>) {
        for message in &self.messages {
            if let Err(e) = connection.send(message) {
                error!("send failed: {}", e);
            }
        }
        *self.connection.lock() = Some(connection);
    }

    fn received(&self, _connection: &Arc<Connection>, message: &[u8]) {
        println!("{}", String::from_utf8_lossy(message));
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.done.send(());
        }
    }

    fn connection_error(&self, _connection: &Arc<Connection>, error: AppError) {
        error!("connection error: {}", error);
        let _ = self.done.send(());
    }

    fn error(&self, error: AppError) {
        error!("dial error: {}", error);
        let _ = self.done.send(());
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    framelink::setup_tracing()?;

    let commandline = CommandLine::parse();
    let config = match &commandline.conf {
        Some(path) => EndpointConfig::from_file(path)?,
        None => EndpointConfig {
            framing: match commandline.framing {
                FramingArg::LengthPrefixed => Framing::LengthPrefixed,
                FramingArg::Netstring => Framing::Netstring,
                FramingArg::Line => Framing::Delimited(b"\n".to_vec()),
            },
            ..EndpointConfig::default()
        },
    };

    match commandline.command {
        Command::Serve { port } => {
            let sink = Arc::new(EchoSink {
                connections: DashMap::new(),
            });
            let listener = Listener::new(config.framing, config.network, sink)?;
            listener.listen(port).await;
            let bound = listener.bound_addrs(port);
            if bound.is_empty() {
                return Err(AppError::Resolve(format!("could not listen on port {port}")));
            }
            info!(?bound, "echo server running, ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
        }
        Command::Send {
            host,
            port,
            message,
        } => {
            let messages: Vec<Vec<u8>> =
                message.into_iter().map(String::into_bytes).collect();
            if messages.is_empty() {
                return Ok(());
            }
            let (done_tx, mut done_rx) = mpsc::unbounded_channel();
            let sink = Arc::new(ClientSink {
                remaining: AtomicUsize::new(messages.len()),
                messages,
                connection: Mutex::new(None),
                done: done_tx,
            });
            let dialer = Dialer::new(config.framing, config.network, sink)?;
            dialer.dial(&host, port).await;
            done_rx.recv().await;
        }
    }
    Ok(())
}
