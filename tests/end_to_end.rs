//! End-to-end tests against a minimal in-process WebSocket server that
//! speaks just enough of the Hub Protocol to exercise the scenarios in
//! the client's handshake/invoke/dispatch contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use signalr_client_core::{HubConnectionBuilder, Value};

const RS: u8 = 0x1E;

async fn start_server() -> (String, tokio::task::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}/chatHub");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut received = Vec::new();

        // Handshake: read the client's request, reply with `{}` + RS.
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            received.push(text.as_bytes().to_vec());
        }
        ws.send(Message::Text("{}\u{1e}".to_string().into()))
            .await
            .unwrap();

        // Echo invocation: reply with a completion carrying the first
        // argument back as the result.
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            received.push(text.as_bytes().to_vec());
            let parsed: serde_json::Value = serde_json::from_str(text.trim_end_matches('\u{1e}'))
                .unwrap();
            let id = parsed["invocationId"].as_str().unwrap();
            let arg = parsed["arguments"][0].clone();
            let completion = serde_json::json!({
                "type": 3,
                "invocationId": id,
                "result": arg,
            });
            let mut frame = serde_json::to_vec(&completion).unwrap();
            frame.push(RS);
            ws.send(Message::Text(String::from_utf8(frame).unwrap().into()))
                .await
                .unwrap();
        }

        // Server-initiated invocation of a client method.
        let broadcast = serde_json::json!({
            "type": 1,
            "target": "ReceiveMessage",
            "arguments": ["hi from server"],
        });
        let mut frame = serde_json::to_vec(&broadcast).unwrap();
        frame.push(RS);
        ws.send(Message::Text(String::from_utf8(frame).unwrap().into()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = ws.close(None).await;
        received
    });

    (url, handle)
}

#[tokio::test]
async fn handshake_invoke_and_dispatch_round_trip() {
    let (url, server) = start_server().await;

    let hub = HubConnectionBuilder::new(url).with_skip_negotiation(true).build();

    let received_broadcast = Arc::new(AtomicBool::new(false));
    let flag = received_broadcast.clone();
    hub.on("ReceiveMessage", move |args| {
        assert_eq!(args[0].as_str().unwrap(), "hi from server");
        flag.store(true, Ordering::SeqCst);
    })
    .unwrap();

    hub.start().await.expect("handshake should succeed");

    let result = hub
        .invoke("Echo", vec![Value::from("hello")])
        .await
        .expect("invoke should resolve");
    assert_eq!(result.as_str().unwrap(), "hello");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received_broadcast.load(Ordering::SeqCst));

    hub.stop().await;
    server.await.unwrap();
}

#[tokio::test]
async fn handshake_times_out_if_server_never_responds() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}/chatHub");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Accept the handshake frame but never answer it.
        let _ = ws.next().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let hub = HubConnectionBuilder::new(url)
        .with_skip_negotiation(true)
        .with_handshake_timeout(Duration::from_millis(100))
        .build();

    let err = hub.start().await.unwrap_err();
    assert!(err.to_string().contains("handshake"));

    server.abort();
}

#[tokio::test]
async fn concurrent_stop_callers_all_resolve() {
    let (url, server) = start_server().await;
    let hub = Arc::new(HubConnectionBuilder::new(url).with_skip_negotiation(true).build());
    hub.start().await.unwrap();

    let stop_count = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..3 {
        let hub = hub.clone();
        let count = stop_count.clone();
        handles.push(tokio::spawn(async move {
            hub.stop().await;
            count.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(stop_count.load(Ordering::SeqCst), 3);

    let _ = server.await;
}
