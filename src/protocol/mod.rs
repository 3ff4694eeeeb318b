//! Wire grammar for the media-stream WebSocket: JSON text frames tagged by
//! `event`. The simulator emits exactly the same shapes, so the server
//! cannot tell it apart from a real telephony peer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::ProtocolError;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PeerEvent {
    Connected,
    Start {
        start: StartInfo,
    },
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        media: MediaInfo,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkInfo>,
    },
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct StartInfo {
    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "accountSid")]
    pub account_sid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaInfo {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkInfo {
    pub name: String,
}

pub fn parse_peer_event(text: &str) -> Result<PeerEvent, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

impl MediaInfo {
    pub fn decode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        BASE64
            .decode(self.payload.as_bytes())
            .map_err(|e| ProtocolError::Malformed(format!("media payload: {}", e)))
    }

    /// Inbound track, or no track at all, is caller audio. Anything else
    /// is an echo of the agent's own output and must be ignored.
    pub fn is_inbound(&self) -> bool {
        match self.track.as_deref() {
            None | Some("inbound") => true,
            _ => false,
        }
    }
}

pub fn connected_event() -> String {
    serde_json::json!({ "event": "connected" }).to_string()
}

pub fn start_event(stream_sid: &str, call_sid: &str, account_sid: &str) -> String {
    serde_json::json!({
        "event": "start",
        "start": {
            "streamSid": stream_sid,
            "callSid": call_sid,
            "accountSid": account_sid,
        },
    })
    .to_string()
}

/// Outbound media from the agent carries no `track` field.
pub fn media_event(stream_sid: &str, mulaw: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": BASE64.encode(mulaw) },
    })
    .to_string()
}

pub fn inbound_media_event(stream_sid: &str, mulaw: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": BASE64.encode(mulaw), "track": "inbound" },
    })
    .to_string()
}

pub fn mark_event(stream_sid: &str, name: &str) -> String {
    serde_json::json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name },
    })
    .to_string()
}

pub fn stop_event(stream_sid: &str) -> String {
    serde_json::json!({ "event": "stop", "streamSid": stream_sid }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handshake_events() {
        assert!(matches!(
            parse_peer_event(r#"{"event":"connected"}"#).unwrap(),
            PeerEvent::Connected
        ));

        let start = parse_peer_event(
            r#"{"event":"start","start":{"streamSid":"S1","callSid":"C1","accountSid":"A1"}}"#,
        )
        .unwrap();
        match start {
            PeerEvent::Start { start } => {
                assert_eq!(start.stream_sid.as_deref(), Some("S1"));
                assert_eq!(start.call_sid.as_deref(), Some("C1"));
                assert_eq!(start.account_sid.as_deref(), Some("A1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn media_roundtrip_and_track_filter() {
        let wire = inbound_media_event("S1", &[0x7F, 0xFF, 0x00]);
        let parsed = parse_peer_event(&wire).unwrap();
        match parsed {
            PeerEvent::Media { stream_sid, media } => {
                assert_eq!(stream_sid.as_deref(), Some("S1"));
                assert!(media.is_inbound());
                assert_eq!(media.decode_payload().unwrap(), vec![0x7F, 0xFF, 0x00]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let outbound: MediaInfo = serde_json::from_str(
            r#"{"payload":"","track":"outbound"}"#,
        )
        .unwrap();
        assert!(!outbound.is_inbound());
        let untracked: MediaInfo = serde_json::from_str(r#"{"payload":""}"#).unwrap();
        assert!(untracked.is_inbound());
    }

    #[test]
    fn unknown_event_is_tolerated() {
        assert!(matches!(
            parse_peer_event(r#"{"event":"dtmf","digit":"1"}"#).unwrap(),
            PeerEvent::Unknown
        ));
        assert!(parse_peer_event("not json").is_err());
    }

    #[test]
    fn agent_media_has_no_track() {
        let wire = media_event("S1", &[0u8; 4]);
        assert!(!wire.contains("track"));
        let mark = mark_event("S1", "m-1");
        assert!(mark.contains(r#""name":"m-1""#));
    }
}
