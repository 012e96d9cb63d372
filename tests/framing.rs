use std::time::Duration;

use meshchat::error::LinkError;
use meshchat::network::connection::{Connection, FrameReader, FrameWriter, Inbound};
use meshchat::network::packet::{Packet, PacketType};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const MAX: usize = 1024 * 1024;

fn message(content: &str) -> Packet {
    Packet::new(PacketType::Message, "alice", None)
        .with_session("R1")
        .with_content(content)
}

#[tokio::test]
async fn frames_survive_a_byte_stream() {
    let (client, server) = tokio::io::duplex(64);
    let mut writer = FrameWriter::new(client);
    let mut reader = FrameReader::new(server, MAX);

    let first = message("hello\nworld");
    let second = message(&"x".repeat(500));
    let (a, b) = (first.clone(), second.clone());
    let send = tokio::spawn(async move {
        writer.send(&a).await.unwrap();
        writer.send(&b).await.unwrap();
        writer.shutdown().await;
    });

    match reader.receive().await.unwrap() {
        Inbound::Packet(p) => assert_eq!(p, first),
        other => panic!("unexpected {:?}", other),
    }
    match reader.receive().await.unwrap() {
        Inbound::Packet(p) => assert_eq!(p, second),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(reader.receive().await.unwrap(), Inbound::Closed));
    send.await.unwrap();
}

#[tokio::test]
async fn malformed_frame_keeps_stream_usable() {
    let (client, server) = tokio::io::duplex(1024);
    let mut writer = FrameWriter::new(client);
    let mut reader = FrameReader::new(server, MAX);

    writer.send_raw(b"{not json").await.unwrap();
    writer.send_raw(b"").await.unwrap();
    writer.send(&message("after")).await.unwrap();

    assert!(matches!(reader.receive().await.unwrap(), Inbound::Malformed(_)));
    assert!(matches!(reader.receive().await.unwrap(), Inbound::Malformed(_)));
    match reader.receive().await.unwrap() {
        Inbound::Packet(p) => assert_eq!(p.content, "after"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn oversized_frame_is_a_link_error() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FrameReader::new(server, 16);
    client.write_all(&(17u32).to_be_bytes()).await.unwrap();
    assert!(matches!(
        reader.receive().await,
        Err(LinkError::FrameTooLarge(17, 16))
    ));
}

#[tokio::test]
async fn connection_over_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::from_stream(stream, MAX).unwrap();
        let got = conn.receive().await.unwrap();
        if let Inbound::Packet(p) = got {
            conn.send(&p.with_content("echo")).await.unwrap();
        }
        conn.finish(Duration::from_secs(1)).await;
    });

    let mut conn = Connection::connect(&addr, Duration::from_secs(1), MAX)
        .await
        .unwrap();
    conn.send(&message("ping")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), conn.receive())
        .await
        .unwrap()
        .unwrap();
    match reply {
        Inbound::Packet(p) => assert_eq!(p.content, "echo"),
        other => panic!("unexpected {:?}", other),
    }
    conn.close().await;
    accept.await.unwrap();
}

#[tokio::test]
async fn connect_to_closed_port_fails_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    let started = std::time::Instant::now();
    let result = Connection::connect(&addr, Duration::from_millis(500), MAX).await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));
}
