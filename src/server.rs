// server.rs — WebSocket transport: accepts client connections, reads
// analyze-drawing events, runs the analysis pipeline, and writes feedback
// or error events back. Owns the per-connection memory lifecycle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::memory::InstructionMemory;
use crate::pipeline::AnalysisPipeline;
use crate::protocol::{ClientEvent, ErrorPayload, ServerEvent};

/// The drawing-coach server: one task per connection, shared pipeline,
/// shared per-connection instruction memory.
pub struct EaselServer {
    allowed_origin: String,
    pipeline: Arc<AnalysisPipeline>,
    memory: Arc<InstructionMemory>,
    next_connection_id: AtomicU64,
}

impl EaselServer {
    pub fn new(allowed_origin: impl Into<String>, pipeline: Arc<AnalysisPipeline>) -> Self {
        Self {
            allowed_origin: allowed_origin.into(),
            pipeline,
            memory: Arc::new(InstructionMemory::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// The shared instruction memory (exposed for integration tests).
    pub fn memory(&self) -> &InstructionMemory {
        &self.memory
    }

    /// Accept connections forever. Each connection runs on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    log::error!("Accept failed: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let allowed = self.allowed_origin.clone();
        let callback = move |request: &Request, response: Response| {
            let origin = request
                .headers()
                .get("Origin")
                .and_then(|v| v.to_str().ok());
            if origin_allowed(&allowed, origin) {
                Ok(response)
            } else {
                log::warn!("Rejected handshake from {}: origin {:?} not allowed", peer, origin);
                let mut response = ErrorResponse::new(Some("origin not allowed".into()));
                *response.status_mut() = StatusCode::FORBIDDEN;
                Err(response)
            }
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                log::warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };

        let connection = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        log::info!("Client connected: {} ({})", connection, peer);

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        // Channel: pipeline results → WebSocket sink, drained by a writer
        // task so the read loop never holds the sink.
        let (send_tx, mut send_rx) = mpsc::channel::<Message>(16);

        let writer = tokio::spawn(async move {
            while let Some(msg) = send_rx.recv().await {
                if ws_sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        while let Some(message) = ws_source.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let event: ClientEvent = match serde_json::from_str(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            log::warn!("Connection {}: unparseable event: {}", connection, e);
                            continue;
                        }
                    };
                    let ClientEvent::AnalyzeDrawing(image_data) = event;
                    log::info!("Connection {}: drawing analysis requested", connection);

                    // Awaiting the pipeline here serializes capture events
                    // per connection: the next frame is not read until this
                    // one has resolved, so memory is never mutated
                    // concurrently for one connection.
                    let reply = match self
                        .pipeline
                        .analyze(connection, &image_data, &self.memory)
                        .await
                    {
                        Ok(feedback) => ServerEvent::DrawingFeedback(feedback),
                        Err(e) => {
                            log::error!("Connection {}: analysis failed: {}", connection, e);
                            ServerEvent::Error(ErrorPayload::from_error(&e))
                        }
                    };

                    let frame = match serde_json::to_string(&reply) {
                        Ok(json) => Message::Text(json.into()),
                        Err(e) => {
                            log::error!("Connection {}: reply serialization failed: {}", connection, e);
                            continue;
                        }
                    };
                    // A failed send means the client is gone; the result
                    // is discarded.
                    if send_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Connection {}: socket error: {}", connection, e);
                    break;
                }
            }
        }

        drop(send_tx);
        let _ = writer.await;

        self.memory.clear(connection);
        log::info!("Client disconnected: {}", connection);
    }
}

/// Browser clients must match the configured origin; requests without an
/// `Origin` header (non-browser clients) are always allowed. `*` disables
/// the check.
fn origin_allowed(allowed: &str, origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(origin) => {
            allowed == "*"
                || origin
                    .trim_end_matches('/')
                    .eq_ignore_ascii_case(allowed.trim_end_matches('/'))
        }
    }
}
