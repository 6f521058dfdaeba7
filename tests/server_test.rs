//! End-to-end tests for the WebSocket server over a loopback socket, with
//! mock providers behind the pipeline. Fully deterministic — no external
//! APIs.
//!
//! Run: cargo test --test server_test

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use easel_lib::ai::{
    AiError, ImageSearchProvider, SpeechProvider, VisionProvider, VisionQuery,
};
use easel_lib::pipeline::AnalysisPipeline;
use easel_lib::server::EaselServer;
use easel_lib::settings::Settings;

const FRAME: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

// ---------------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------------

struct StaticVision {
    critique: Option<String>,
    keyword: Option<String>,
}

#[async_trait]
impl VisionProvider for StaticVision {
    async fn complete(&self, query: &VisionQuery) -> Result<String, AiError> {
        let response = if query.max_tokens <= 10 {
            &self.keyword
        } else {
            &self.critique
        };
        response
            .clone()
            .ok_or_else(|| AiError::ConnectionError("vision down".into()))
    }

    fn name(&self) -> &str {
        "static-vision"
    }
}

struct StaticSpeech;

#[async_trait]
impl SpeechProvider for StaticSpeech {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, AiError> {
        Ok(vec![0xAB, 0xCD])
    }

    fn name(&self) -> &str {
        "static-speech"
    }
}

struct StaticSearch {
    results: Vec<String>,
}

#[async_trait]
impl ImageSearchProvider for StaticSearch {
    async fn search(&self, _query: &str, _count: usize) -> Result<Vec<String>, AiError> {
        Ok(self.results.clone())
    }

    fn name(&self) -> &str {
        "static-search"
    }
}

/// Start a server on an ephemeral loopback port and return its address
/// plus a handle for memory assertions.
async fn start_server(
    allowed_origin: &str,
    vision: StaticVision,
) -> (String, Arc<EaselServer>) {
    let pipeline = Arc::new(AnalysisPipeline::new(
        Settings::default(),
        Arc::new(vision),
        Arc::new(StaticSpeech),
        Arc::new(StaticSearch {
            results: vec!["url1".into(), "url2".into()],
        }),
    ));
    let server = Arc::new(EaselServer::new(allowed_origin, pipeline));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).run(listener));

    (format!("ws://{}", addr), server)
}

fn analyze_event() -> Message {
    let event = json!({ "event": "analyze-drawing", "data": FRAME });
    Message::Text(event.to_string().into())
}

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server event")
            .expect("connection closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("server sent invalid JSON");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A valid capture comes back as one drawing-feedback event carrying
/// critique text, encoded audio, and reference images.
#[tokio::test]
async fn analyze_drawing_roundtrip() {
    let (url, server) = start_server(
        "*",
        StaticVision {
            critique: Some("Draw a circle in the top-left.".into()),
            keyword: Some("cat sketch".into()),
        },
    )
    .await;

    let (mut ws, _) = connect_async(url.as_str()).await.expect("connect failed");
    ws.send(analyze_event()).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["event"], "drawing-feedback");
    assert_eq!(reply["data"]["text"], "Draw a circle in the top-left.");
    assert!(reply["data"]["audio"]
        .as_str()
        .unwrap()
        .starts_with("data:audio/mp3;base64,"));
    assert_eq!(reply["data"]["images"], json!(["url1", "url2"]));

    assert_eq!(
        server.memory().get(1),
        vec!["Draw a circle in the top-left."]
    );
}

/// A vision failure produces exactly one error event, no feedback event,
/// and leaves memory empty.
#[tokio::test]
async fn vision_failure_sends_single_error_event() {
    let (url, server) = start_server(
        "*",
        StaticVision {
            critique: None,
            keyword: Some("kw".into()),
        },
    )
    .await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(analyze_event()).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["event"], "error");
    assert!(!reply["data"]["message"].as_str().unwrap().is_empty());
    assert!(reply["data"]["details"].is_string());

    // A follow-up frame still gets exactly one reply, proving the first
    // failure emitted one record and the connection survived.
    ws.send(analyze_event()).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["event"], "error");

    assert!(server.memory().get(1).is_empty());
}

/// Disconnecting removes the connection's memory; a reconnect starts with
/// empty history under a new connection identity.
#[tokio::test]
async fn disconnect_clears_memory() {
    let (url, server) = start_server(
        "*",
        StaticVision {
            critique: Some("Add a sun.".into()),
            keyword: Some("kw".into()),
        },
    )
    .await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(analyze_event()).await.unwrap();
    let _ = next_json(&mut ws).await;
    assert_eq!(server.memory().get(1), vec!["Add a sun."]);

    ws.close(None).await.unwrap();
    drop(ws);

    // The server clears memory when its read loop observes the close.
    for _ in 0..100 {
        if server.memory().get(1).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.memory().get(1).is_empty());

    // Reconnect: new identity, empty history.
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(analyze_event()).await.unwrap();
    let _ = next_json(&mut ws).await;
    assert_eq!(server.memory().get(2), vec!["Add a sun."]);
    assert!(server.memory().get(1).is_empty());
}

/// Unparseable events are ignored; the connection keeps working.
#[tokio::test]
async fn malformed_event_is_ignored() {
    let (url, _server) = start_server(
        "*",
        StaticVision {
            critique: Some("Add a tree.".into()),
            keyword: Some("kw".into()),
        },
    )
    .await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"event":"unknown","data":1}"#.into()))
        .await
        .unwrap();
    ws.send(analyze_event()).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["event"], "drawing-feedback");
    assert_eq!(reply["data"]["text"], "Add a tree.");
}

/// Handshakes from a disallowed browser origin are rejected; the
/// configured origin and header-less clients are accepted.
#[tokio::test]
async fn origin_check_enforced() {
    let (url, _server) = start_server(
        "http://localhost:5173",
        StaticVision {
            critique: Some("x".into()),
            keyword: None,
        },
    )
    .await;

    let mut request = url.clone().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());
    assert!(connect_async(request).await.is_err());

    let mut request = url.clone().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "http://localhost:5173".parse().unwrap());
    assert!(connect_async(request).await.is_ok());

    // No Origin header at all (non-browser client).
    assert!(connect_async(url.as_str()).await.is_ok());
}
