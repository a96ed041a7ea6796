mod common;

use std::time::Duration;

use common::{expect_accepted, expect_received, ChannelSink, EchoSink, Event};
use framelink::{Dialer, Endpoint, Framing, Listener, NetworkConfig};

async fn start_echo_server(framing: Framing) -> (Listener, u16) {
    let listener = Listener::new(framing, NetworkConfig::default(), EchoSink::new()).unwrap();
    listener.listen(0).await;
    let bound = listener.bound_addrs(0);
    assert!(!bound.is_empty(), "listen on an ephemeral port failed");
    (listener, bound[0].port())
}

#[tokio::test]
async fn echo_round_trip_for_every_framing() {
    for framing in [
        Framing::LengthPrefixed,
        Framing::Delimited(b"\r\n".to_vec()),
        Framing::Netstring,
    ] {
        let (_listener, port) = start_echo_server(framing.clone()).await;

        let (sink, mut events) = ChannelSink::new();
        let dialer = Dialer::new(framing.clone(), NetworkConfig::default(), sink).unwrap();
        dialer.dial("localhost", port).await;

        let connection = expect_accepted(&mut events).await;
        let payloads: [&[u8]; 3] = [b"hello", b"", b"over the wire"];
        for payload in payloads {
            connection.send(payload).unwrap();
        }
        for payload in payloads {
            let (_, message) = expect_received(&mut events).await;
            assert_eq!(message, payload, "framing {framing:?}");
        }
    }
}

#[tokio::test]
async fn thousand_concurrent_writes_stay_whole_and_complete() {
    // ten writers, one hundred 10-byte messages each, one connection.
    let (_listener, port) = start_echo_server(Framing::LengthPrefixed).await;

    let (sink, mut events) = ChannelSink::new();
    let dialer = Dialer::new(Framing::LengthPrefixed, NetworkConfig::default(), sink).unwrap();
    dialer.dial("localhost", port).await;
    let connection = expect_accepted(&mut events).await;

    let mut writers = Vec::new();
    for tag in 0..10u8 {
        let connection = connection.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..100 {
                connection.send(&[tag; 10]).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut counts = [0usize; 10];
    for _ in 0..1000 {
        let (_, message) = expect_received(&mut events).await;
        assert_eq!(message.len(), 10);
        assert!(message.iter().all(|b| *b == message[0]), "bytes interleaved");
        counts[message[0] as usize] += 1;
    }
    assert!(counts.iter().all(|count| *count == 100));
}

#[tokio::test]
async fn single_writer_order_is_preserved_end_to_end() {
    let (_listener, port) = start_echo_server(Framing::Netstring).await;

    let (sink, mut events) = ChannelSink::new();
    let dialer = Dialer::new(Framing::Netstring, NetworkConfig::default(), sink).unwrap();
    dialer.dial("localhost", port).await;
    let connection = expect_accepted(&mut events).await;

    for i in 0..200u32 {
        connection.send(format!("seq-{i}").as_bytes()).unwrap();
    }
    for i in 0..200u32 {
        let (_, message) = expect_received(&mut events).await;
        assert_eq!(message, format!("seq-{i}").into_bytes());
    }
}

#[tokio::test]
async fn combined_endpoint_connects_to_itself() {
    let (sink, mut events) = ChannelSink::new();
    let endpoint = Endpoint::new(
        Framing::LengthPrefixed,
        NetworkConfig::default(),
        sink,
    )
    .unwrap();
    endpoint.listen(0).await;
    let port = endpoint.bound_addrs(0)[0].port();
    endpoint.dial("localhost", port).await;

    // both roles report through the same sink
    let first = expect_accepted(&mut events).await;
    let second = expect_accepted(&mut events).await;

    first.send(b"across the process").unwrap();
    let (receiver_id, message) = expect_received(&mut events).await;
    assert_eq!(message, b"across the process");
    assert_eq!(receiver_id, second.id());
    assert_ne!(receiver_id, first.id());
}

#[tokio::test]
async fn closing_the_client_surfaces_peer_close_on_the_server() {
    let (server_sink, mut server_events) = ChannelSink::new();
    let listener = Listener::new(
        Framing::LengthPrefixed,
        NetworkConfig::default(),
        server_sink,
    )
    .unwrap();
    listener.listen(0).await;
    let port = listener.bound_addrs(0)[0].port();

    let (client_sink, mut client_events) = ChannelSink::new();
    let dialer = Dialer::new(
        Framing::LengthPrefixed,
        NetworkConfig::default(),
        client_sink,
    )
    .unwrap();
    dialer.dial("localhost", port).await;

    let client_connection = expect_accepted(&mut client_events).await;
    let server_connection = expect_accepted(&mut server_events).await;

    client_connection.close();
    drop(client_connection);

    match tokio::time::timeout(Duration::from_secs(5), server_events.recv())
        .await
        .expect("no terminal event on the server side")
        .expect("event stream ended")
    {
        Event::ConnectionError(id, _) => assert_eq!(id, server_connection.id()),
        other => panic!("expected ConnectionError, got {other:?}"),
    }
}
