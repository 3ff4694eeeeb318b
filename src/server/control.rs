//! Minimal HTTP control surface: health, operator transfer, AI toggle and
//! manual reply. Request parsing is deliberately small; only the routes
//! below exist.

use anyhow::Result;
use log::{info, warn};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::session::{lookup_session, SessionControlIn, SessionMap};

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const TRANSFER_ACK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Deserialize)]
struct TransferBody {
    call_id: String,
    message: String,
    target: String,
}

#[derive(Deserialize)]
struct AiResponseBody {
    call_id: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct SpeakBody {
    call_id: String,
    text: String,
}

pub async fn handle_http(mut stream: TcpStream, sessions: &SessionMap) -> Result<()> {
    let (method, path, body) = match read_request(&mut stream).await? {
        Some(parts) => parts,
        None => return Ok(()),
    };

    match (method.as_str(), path.as_str()) {
        ("GET", "/health") => write_response(stream, 200, "OK", b"OK").await,
        ("POST", "/transfer") => {
            let body: TransferBody = match serde_json::from_slice(&body) {
                Ok(b) => b,
                Err(_) => return write_response(stream, 400, "Bad Request", b"").await,
            };
            let Some(session) = lookup_session(sessions, &body.call_id) else {
                return write_response(stream, 404, "Not Found", b"").await;
            };
            let (done_tx, done_rx) = oneshot::channel();
            let sent = session
                .control_tx
                .send(SessionControlIn::Transfer {
                    message: body.message,
                    target: body.target,
                    done: done_tx,
                })
                .await;
            if sent.is_err() {
                return write_response(stream, 404, "Not Found", b"").await;
            }
            match tokio::time::timeout(TRANSFER_ACK_TIMEOUT, done_rx).await {
                Ok(Ok(true)) => write_response(stream, 200, "OK", b"{\"ok\":true}").await,
                _ => write_response(stream, 502, "Bad Gateway", b"{\"ok\":false}").await,
            }
        }
        ("POST", "/ai-response") => {
            let body: AiResponseBody = match serde_json::from_slice(&body) {
                Ok(b) => b,
                Err(_) => return write_response(stream, 400, "Bad Request", b"").await,
            };
            let Some(session) = lookup_session(sessions, &body.call_id) else {
                return write_response(stream, 404, "Not Found", b"").await;
            };
            info!("[control] ai-response call_id={} enabled={}", body.call_id, body.enabled);
            let _ = session
                .control_tx
                .send(SessionControlIn::SetAiEnabled {
                    enabled: body.enabled,
                })
                .await;
            write_response(stream, 200, "OK", b"{\"ok\":true}").await
        }
        ("POST", "/speak") => {
            let body: SpeakBody = match serde_json::from_slice(&body) {
                Ok(b) => b,
                Err(_) => return write_response(stream, 400, "Bad Request", b"").await,
            };
            let Some(session) = lookup_session(sessions, &body.call_id) else {
                return write_response(stream, 404, "Not Found", b"").await;
            };
            let _ = session
                .control_tx
                .send(SessionControlIn::Speak { text: body.text })
                .await;
            write_response(stream, 200, "OK", b"{\"ok\":true}").await
        }
        _ => write_response(stream, 404, "Not Found", b"").await,
    }
}

/// Reads one request: returns (method, path, body).
async fn read_request(stream: &mut TcpStream) -> Result<Option<(String, String, Vec<u8>)>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            write_response_ref(stream, 413, "Payload Too Large", b"").await?;
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let first = lines.next().unwrap_or_default();
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();

    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        write_response_ref(stream, 413, "Payload Too Large", b"").await?;
        return Ok(None);
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some((method, path, body)))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub async fn write_response(mut stream: TcpStream, code: u16, reason: &str, body: &[u8]) -> Result<()> {
    write_response_ref(&mut stream, code, reason, body).await
}

async fn write_response_ref(
    stream: &mut TcpStream,
    code: u16,
    reason: &str,
    body: &[u8],
) -> Result<()> {
    if code >= 400 {
        warn!("[control] responding {} {}", code, reason);
    }
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        code,
        reason,
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_end_detection() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_header_end(b"partial\r\n"), None);
    }
}
