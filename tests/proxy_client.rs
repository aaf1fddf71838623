//! `ProxyClient` against a fake daemon on a local socket.

use assert_matches::assert_matches;
use mailproxy_clients::account::Account;
use mailproxy_clients::proxy::ServiceAddress;
use mailproxy_clients::{Event, MailProxy, MessageId, ProxyClient, ProxyError, SpawnError};
use mailproxy_testlib::{FakeDaemon, TIMEOUT, init_tracing, test_config};
use serde_json::json;
use tokio::time::timeout;

fn alice() -> Account {
    Account::new("alice", "provider1")
}

async fn connected() -> anyhow::Result<(
    ProxyClient,
    tokio::sync::mpsc::UnboundedReceiver<Event>,
    mailproxy_testlib::DaemonConnection,
)> {
    let daemon = FakeDaemon::bind().await?;
    let (client, events) = ProxyClient::spawn(&test_config(daemon.address()), false).await?;
    let conn = daemon.accept().await?;
    Ok((client, events, conn))
}

#[tokio::test]
async fn test_receive_pop() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, mut conn) = connected().await?;

    let daemon = async {
        let request = conn.next_request().await?;
        assert_eq!(request.method, "receive_pop");
        assert_eq!(request.params, json!({ "account": "alice@provider1" }));
        conn.reply(request.id, json!({ "payload": [104, 105] })).await
    };
    let alice = alice();
    let (envelope, daemon) = tokio::join!(client.receive_pop(&alice), daemon);
    daemon?;

    assert_eq!(envelope?.payload, b"hi");
    Ok(())
}

#[tokio::test]
async fn test_send_message() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, mut conn) = connected().await?;

    let daemon = async {
        let request = conn.next_request().await?;
        assert_eq!(request.method, "send_message");
        assert_eq!(
            request.params,
            json!({
                "sender": "alice@provider1",
                "recipient": "bob@provider2",
                "payload": [1, 2, 3],
            })
        );
        conn.reply(request.id, json!("m-42")).await
    };
    let alice = alice();
    let (id, daemon) = tokio::join!(
        client.send_message(&alice, "bob@provider2", vec![1, 2, 3]),
        daemon
    );
    daemon?;

    assert_eq!(id?, MessageId::new("m-42"));
    Ok(())
}

#[tokio::test]
async fn test_send_kaetzchen_request() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, mut conn) = connected().await?;

    let service = ServiceAddress::new("zcash", "zcash1");
    let daemon = async {
        let request = conn.next_request().await?;
        assert_eq!(request.method, "send_kaetzchen_request");
        assert_eq!(request.params["service"], "zcash");
        assert_eq!(request.params["provider"], "zcash1");
        assert_eq!(request.params["want_response"], false);
        conn.reply(request.id, json!("k-1")).await
    };
    let alice = alice();
    let (id, daemon) = tokio::join!(
        client.send_kaetzchen_request(&alice, &service, b"{}".to_vec(), false),
        daemon
    );
    daemon?;

    assert_eq!(id?.as_str(), "k-1");
    Ok(())
}

#[tokio::test]
async fn test_rejected_request() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, mut conn) = connected().await?;

    let daemon = async {
        let request = conn.next_request().await?;
        conn.reject(request.id, "receive queue is empty").await
    };
    let alice = alice();
    let (result, daemon) = tokio::join!(client.receive_pop(&alice), daemon);
    daemon?;

    assert_matches!(result, Err(ProxyError::Rejected(message)) if message == "receive queue is empty");
    Ok(())
}

#[tokio::test]
async fn test_events_arrive_in_order() -> anyhow::Result<()> {
    init_tracing();
    let (_client, mut events, mut conn) = connected().await?;

    let sent = vec![
        Event::ConnectionStatus { connected: true },
        Event::MessageReceived,
        Event::MessageSent {
            id: MessageId::new("m-1"),
        },
        Event::ServiceReply {
            payload: vec![0xff],
        },
    ];
    for event in &sent {
        conn.push_event(event).await?;
    }

    let mut received = Vec::new();
    for _ in 0..sent.len() {
        received.push(timeout(TIMEOUT, events.recv()).await?.expect("event"));
    }
    assert_eq!(received, sent);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_lines_are_skipped() -> anyhow::Result<()> {
    init_tracing();
    let (_client, mut events, mut conn) = connected().await?;

    conn.send_raw("this is not json").await?;
    conn.send_raw(r#"{"event":{"type":"unheard_of"}}"#).await?;
    conn.push_event(&Event::MessageReceived).await?;

    let event = timeout(TIMEOUT, events.recv()).await?;
    assert_eq!(event, Some(Event::MessageReceived));
    Ok(())
}

#[tokio::test]
async fn test_invalid_utf8_lines_are_skipped() -> anyhow::Result<()> {
    init_tracing();
    let (client, mut events, mut conn) = connected().await?;

    conn.send_raw_bytes(b"\xff\xfe garbage").await?;
    conn.push_event(&Event::MessageReceived).await?;

    let event = timeout(TIMEOUT, events.recv()).await?;
    assert_eq!(event, Some(Event::MessageReceived));

    // The connection is still usable for requests.
    let daemon = async {
        let request = conn.next_request().await?;
        conn.reply(request.id, json!({ "payload": [] })).await
    };
    let alice = alice();
    let (envelope, daemon) = tokio::join!(client.receive_pop(&alice), daemon);
    daemon?;
    assert!(envelope?.payload.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_is_idempotent() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, _conn) = connected().await?;

    client.shutdown();
    client.shutdown();
    timeout(TIMEOUT, client.wait()).await?;
    timeout(TIMEOUT, client.wait()).await?;

    assert_matches!(client.receive_pop(&alice()).await, Err(ProxyError::Shutdown));
    Ok(())
}

#[tokio::test]
async fn test_daemon_hangup_terminates_the_client() -> anyhow::Result<()> {
    init_tracing();
    let (client, mut events, conn) = connected().await?;

    conn.close().await?;

    timeout(TIMEOUT, client.wait()).await?;
    assert_eq!(timeout(TIMEOUT, events.recv()).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_hangup_fails_pending_requests() -> anyhow::Result<()> {
    init_tracing();
    let (client, _events, mut conn) = connected().await?;

    let daemon = async move {
        conn.next_request().await?;
        conn.close().await
    };
    let alice = alice();
    let (result, daemon) = tokio::join!(client.receive_pop(&alice), daemon);
    daemon?;

    assert_matches!(result, Err(ProxyError::ConnectionLost));
    Ok(())
}

#[tokio::test]
async fn test_generate_only() -> anyhow::Result<()> {
    init_tracing();
    let daemon = FakeDaemon::bind().await?;
    let config = test_config(daemon.address());

    let spawn = tokio::spawn(async move { ProxyClient::spawn(&config, true).await });

    let mut conn = daemon.accept().await?;
    let request = conn.next_request().await?;
    assert_eq!(request.method, "generate_keys");
    assert_eq!(request.params, json!({ "accounts": ["alice@provider1"] }));
    conn.reply(request.id, json!(null)).await?;

    let result = timeout(TIMEOUT, spawn).await??.map(|_| ());
    assert_matches!(result, Err(SpawnError::GenerateOnly));
    Ok(())
}

#[tokio::test]
async fn test_connect_failure() -> anyhow::Result<()> {
    init_tracing();
    let address = {
        let daemon = FakeDaemon::bind().await?;
        daemon.address().to_string()
    };

    let result = ProxyClient::spawn(&test_config(&address), false)
        .await
        .map(|_| ());
    assert_matches!(result, Err(SpawnError::Connect { address: a, .. }) if a == address);
    Ok(())
}
