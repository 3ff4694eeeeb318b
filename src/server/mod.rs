//! TCP front door: WebSocket media streams on `/streams`, a small HTTP
//! control surface for everything else, both on one listener.

pub mod control;

use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::cache::AudioCache;
use crate::config;
use crate::error::TransportError;
use crate::protocol;
use crate::registry::CallRegistryPort;
use crate::session::coordinator::SessionCoordinator;
use crate::session::{OutboundFrame, SessionMap, OUT_CHANNEL_CAPACITY};

pub struct ServerDeps {
    pub registry: Arc<dyn CallRegistryPort>,
    pub cache: Arc<AudioCache>,
    pub sessions: SessionMap,
}

pub async fn run(listener: TcpListener, deps: Arc<ServerDeps>) -> Result<()> {
    info!("[server] listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let deps = deps.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_conn(stream, deps).await {
                debug!("[server] connection from {} ended: {:?}", peer, err);
            }
        });
    }
}

async fn handle_conn(stream: TcpStream, deps: Arc<ServerDeps>) -> Result<()> {
    // Peek (without consuming) enough of the request to read the first
    // line, then route: the WebSocket handshake is replayed to the
    // upgrade handler untouched.
    let mut buf = vec![0u8; 2048];
    let mut peeked = 0usize;
    for _ in 0..50 {
        peeked = stream.peek(&mut buf).await?;
        if peeked == 0 {
            return Ok(());
        }
        if buf[..peeked].contains(&b'\n') || peeked == buf.len() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let head = String::from_utf8_lossy(&buf[..peeked]);
    let first_line = head.lines().next().unwrap_or_default();
    let (method, path, query) = parse_request_line(first_line);

    if path == "/streams" {
        if method != "GET" {
            return control::write_response(stream, 405, "Method Not Allowed", b"").await;
        }
        ws_session(stream, query, deps).await;
        Ok(())
    } else {
        control::handle_http(stream, &deps.sessions).await
    }
}

/// `GET /streams?call_id=abc HTTP/1.1` → ("GET", "/streams", "call_id=abc")
fn parse_request_line(line: &str) -> (String, String, String) {
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    match target.split_once('?') {
        Some((path, query)) => (method, path.to_string(), query.to_string()),
        None => (method, target.to_string(), String::new()),
    }
}

pub fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name && !v.is_empty()).then(|| v.to_string())
    })
}

async fn ws_session(stream: TcpStream, query: String, deps: Arc<ServerDeps>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("[server] websocket handshake failed: {}", err);
            return;
        }
    };

    if !config::ai_ready() {
        error!("[server] rejecting call: AI credentials are not configured");
        let (mut sink, _) = ws.split();
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let call_id = query_param(&query, "call_id");
    info!(
        "[server] media stream accepted (call_id={})",
        call_id.as_deref().unwrap_or("pending")
    );

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(OUT_CHANNEL_CAPACITY);
    let (_handle, media_tx) = SessionCoordinator::spawn(
        call_id,
        deps.registry.clone(),
        deps.cache.clone(),
        deps.sessions.clone(),
        out_tx,
    );

    let (mut sink, mut source) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        warn!("[server] {}", TransportError::Write(err.to_string()));
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: inbound events, in order, into the session actor. Dropping
    // `media_tx` on exit is what tears the session down.
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => match protocol::parse_peer_event(&text) {
                Ok(ev) => {
                    if media_tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!("[server] {}", err),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => debug!("[server] non-text frame ignored"),
            Err(err) => {
                warn!("[server] read failed: {}", err);
                break;
            }
        }
    }
    drop(media_tx);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_parsing() {
        let (method, path, query) = parse_request_line("GET /streams?call_id=C1 HTTP/1.1");
        assert_eq!(method, "GET");
        assert_eq!(path, "/streams");
        assert_eq!(query_param(&query, "call_id").as_deref(), Some("C1"));
        assert_eq!(query_param(&query, "other"), None);

        let (_, path, query) = parse_request_line("POST /speak HTTP/1.1");
        assert_eq!(path, "/speak");
        assert!(query.is_empty());
    }
}
