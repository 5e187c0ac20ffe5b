//! End-to-end tests: real actors over real sockets on localhost
//!
//! Each test wires a handful of directory actors together the way a
//! deployment would — some binding the server endpoint, some publishing,
//! some only reading — and asserts on what comes out of the outbox.

mod common;

use common::{fast_config, forced_burst, init_tracing, reader_config, test_identity, wait_for_key};
use meshdisco::{Disco, DiscoConfig};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_publish_then_values_round_trip() {
    init_tracing();

    let server = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let mut client = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    client.connect(&format!("tcp://{}", addr)).await.unwrap();
    client.publish("nodeA", "tcp://10.0.0.1:9200").await.unwrap();

    let value = wait_for_key(&mut client, "nodeA", Duration::from_secs(3)).await;
    assert_eq!(value.as_deref(), Some("tcp://10.0.0.1:9200"));

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_merge_unions_entries_from_disjoint_servers() {
    init_tracing();

    let server_a = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr_a = server_a.bind("tcp://127.0.0.1:0").await.unwrap();
    let server_b = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr_b = server_b.bind("tcp://127.0.0.1:0").await.unwrap();

    // Two publishers, each talking to only one server
    let pub_a = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    pub_a.connect(&format!("tcp://{}", addr_a)).await.unwrap();
    pub_a.publish("alpha", "1").await.unwrap();

    let pub_b = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    pub_b.connect(&format!("tcp://{}", addr_b)).await.unwrap();
    pub_b.publish("beta", "2").await.unwrap();

    // The reader pulls from both and sees the union
    let mut reader = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    reader.connect(&format!("tcp://{}", addr_a)).await.unwrap();
    reader.connect(&format!("tcp://{}", addr_b)).await.unwrap();

    assert_eq!(
        wait_for_key(&mut reader, "alpha", Duration::from_secs(3))
            .await
            .as_deref(),
        Some("1")
    );
    assert_eq!(
        wait_for_key(&mut reader, "beta", Duration::from_secs(3))
            .await
            .as_deref(),
        Some("2")
    );

    for disco in [reader, pub_a, pub_b, server_a, server_b] {
        disco.stop().await;
    }
}

#[tokio::test]
async fn test_entry_expires_without_republish() {
    init_tracing();

    let server_config = DiscoConfig {
        max_age: Duration::from_millis(600),
        ..fast_config()
    };
    let server = Disco::builder().with_config(server_config).spawn().unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let publisher = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    publisher.connect(&format!("tcp://{}", addr)).await.unwrap();
    publisher.publish("ephemeral", "1").await.unwrap();

    let mut reader = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    reader.connect(&format!("tcp://{}", addr)).await.unwrap();

    // The entry is there while fresh
    assert!(wait_for_key(&mut reader, "ephemeral", Duration::from_millis(400))
        .await
        .is_some());

    // The publisher goes away and stops refreshing
    publisher.stop().await;
    tokio::time::sleep(Duration::from_millis(900)).await;

    let burst = forced_burst(&mut reader, Duration::from_millis(200)).await;
    assert!(!burst.contains_key("ephemeral"));

    reader.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_republished_entry_persists_past_max_age() {
    init_tracing();

    let server = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    // Push interval (100ms) refreshes the entry well inside max_age
    // (400ms) for as long as the publisher runs
    let mut publisher = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    publisher.connect(&format!("tcp://{}", addr)).await.unwrap();
    publisher.publish("durable", "1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;

    assert!(wait_for_key(&mut publisher, "durable", Duration::from_secs(2))
        .await
        .is_some());

    publisher.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_wildcard_key_rewritten_to_source_address() {
    init_tracing();

    let server = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let mut client = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    client.connect(&format!("tcp://{}", addr)).await.unwrap();
    // A wildcard-bound advertisement: the server must substitute the
    // address it actually saw the publish arrive from
    client.publish("tcp://*:9200", "node-uuid").await.unwrap();

    let value = wait_for_key(&mut client, "tcp://127.0.0.1:9200", Duration::from_secs(3)).await;
    assert_eq!(value.as_deref(), Some("node-uuid"));

    let burst = forced_burst(&mut client, Duration::from_millis(200)).await;
    assert!(!burst.contains_key("tcp://*:9200"));

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_untrusted_publisher_is_silently_ignored() {
    init_tracing();

    let server_dir = TempDir::new().unwrap();
    let certstore = TempDir::new().unwrap();
    let stranger_dir = TempDir::new().unwrap();

    // Server identity, plus the trusted client's public key in the store
    let server_identity = test_identity(10);
    server_identity
        .save_pair(server_dir.path().join("server.key"))
        .unwrap();
    test_identity(11)
        .save_pair(certstore.path().join("alice.key"))
        .unwrap();
    test_identity(12)
        .save_pair(stranger_dir.path().join("mallory.key"))
        .unwrap();

    let server = Disco::builder()
        .with_config(fast_config())
        .with_private_key_path(server_dir.path().join("server.key_secret"))
        .with_certstore_path(certstore.path())
        .spawn()
        .unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let pinned = format!("tcp://{}|{}", addr, server_identity.public_key().to_hex());

    let mut alice = Disco::builder()
        .with_config(reader_config())
        .with_private_key_path(certstore.path().join("alice.key_secret"))
        .spawn()
        .unwrap();
    alice.connect(&pinned).await.unwrap();
    alice.publish("alice", "1").await.unwrap();

    let mallory = Disco::builder()
        .with_config(reader_config())
        .with_private_key_path(stranger_dir.path().join("mallory.key_secret"))
        .spawn()
        .unwrap();
    mallory.connect(&pinned).await.unwrap();
    mallory.publish("mallory", "1").await.unwrap();

    // The trusted advertisement arrives; the untrusted one never lands
    assert!(wait_for_key(&mut alice, "alice", Duration::from_secs(3))
        .await
        .is_some());
    let burst = forced_burst(&mut alice, Duration::from_millis(200)).await;
    assert!(!burst.contains_key("mallory"));

    alice.stop().await;
    mallory.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_failed_peer_is_retried_after_reconnect_interval() {
    init_tracing();

    let server = Disco::builder().with_config(fast_config()).spawn().unwrap();
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = format!("tcp://{}", addr);

    let mut client = Disco::builder()
        .with_config(reader_config())
        .spawn()
        .unwrap();
    client.connect(&endpoint).await.unwrap();
    client.publish("survivor", "1").await.unwrap();
    assert!(wait_for_key(&mut client, "survivor", Duration::from_secs(3))
        .await
        .is_some());

    // The server goes down; the next announcement fails and the
    // endpoint moves to the reconnect queue
    server.stop().await;
    client.publish("survivor", "2").await.unwrap();

    // A replacement comes back on the same port; after the reconnect
    // interval the client reattaches and its push refreshes the entry
    let replacement = Disco::builder().with_config(fast_config()).spawn().unwrap();
    replacement.bind(&endpoint).await.unwrap();

    let value = wait_for_key(&mut client, "survivor", Duration::from_secs(5)).await;
    assert_eq!(value.as_deref(), Some("2"));

    client.stop().await;
    replacement.stop().await;
}
