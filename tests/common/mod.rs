#![allow(dead_code)]

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use framelink::{AppError, Connection, ConnectionSink};

#[derive(Debug)]
pub enum Event {
    Accepted(Arc<Connection>),
    Received(u64, Vec<u8>),
    ConnectionError(u64, AppError),
    Error(AppError),
}

/// Sink that forwards every callback onto a channel for the test body to
/// assert against.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Arc<ChannelSink>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink { events: tx }), rx)
    }
}

impl ConnectionSink for ChannelSink {
    fn accepted(&self, connection: Arc<Connection>) {
        let _ = self.events.send(Event::Accepted(connection));
    }

    fn received(&self, connection: &Arc<Connection>, message: &[u8]) {
        let _ = self
            .events
            .send(Event::Received(connection.id(), message.to_vec()));
    }

    fn connection_error(&self, connection: &Arc<Connection>, error: AppError) {
        let _ = self
            .events
            .send(Event::ConnectionError(connection.id(), error));
    }

    fn error(&self, error: AppError) {
        let _ = self.events.send(Event::Error(error));
    }
}

/// Server-side sink that echoes every message back on its connection.
pub struct EchoSink {
    connections: DashMap<u64, Arc<Connection>>,
}

impl EchoSink {
    pub fn new() -> Arc<EchoSink> {
        Arc::new(EchoSink {
            connections: DashMap::new(),
        })
    }
}

impl ConnectionSink for EchoSink {
    fn accepted(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id(), connection);
    }

    fn received(&self, connection: &Arc<Connection>, message: &[u8]) {
        connection.send(message).expect("echo send");
    }

    fn connection_error(&self, connection: &Arc<Connection>, _error: AppError) {
        self.connections.remove(&connection.id());
    }
}

/// Waits for the next `Accepted` event, skipping nothing else.
pub async fn expect_accepted(events: &mut mpsc::UnboundedReceiver<Event>) -> Arc<Connection> {
    match events.recv().await.expect("event stream ended") {
        Event::Accepted(connection) => connection,
        other => panic!("expected Accepted, got {other:?}"),
    }
}

/// Waits for the next `Received` event and returns its payload.
pub async fn expect_received(events: &mut mpsc::UnboundedReceiver<Event>) -> (u64, Vec<u8>) {
    match events.recv().await.expect("event stream ended") {
        Event::Received(id, message) => (id, message),
        other => panic!("expected Received, got {other:?}"),
    }
}
