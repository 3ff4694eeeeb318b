//! Drives the session actor through typed events: handshake, paced
//! sending, cooperative cancellation, the uninterruptible greeting rule
//! and barge-in. No external services are involved; sends are injected
//! directly through the control channel.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

use stream_voicebot::audio::{encode_mulaw, FRAME_BYTES, MULAW_SILENCE};
use stream_voicebot::cache::AudioCache;
use stream_voicebot::protocol::{MediaInfo, PeerEvent, StartInfo};
use stream_voicebot::registry::NoopCallRegistry;
use stream_voicebot::session::coordinator::SessionCoordinator;
use stream_voicebot::session::{
    new_session_map, OutboundFrame, SendLabel, SessionControlIn, SessionHandle,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_session() -> (
    SessionHandle,
    mpsc::Sender<PeerEvent>,
    mpsc::Receiver<OutboundFrame>,
) {
    // Keep the ambient services out of reach: greeting/filler synthesis
    // must fail fast instead of touching any real endpoint.
    static ENV_INIT: std::sync::Once = std::sync::Once::new();
    ENV_INIT.call_once(|| {
        std::env::set_var("OPENAI_BASE_URL", "http://127.0.0.1:9");
        std::env::remove_var("AUDIO_CACHE_BUCKET");
        std::env::remove_var("CALL_REGISTRY_URL");
    });

    let (out_tx, out_rx) = mpsc::channel(512);
    let cache = Arc::new(AudioCache::new().await);
    let (handle, media_tx) = SessionCoordinator::spawn(
        Some("call-test".to_string()),
        Arc::new(NoopCallRegistry::new()),
        cache,
        new_session_map(),
        out_tx,
    );
    (handle, media_tx, out_rx)
}

async fn handshake(media_tx: &mpsc::Sender<PeerEvent>) {
    media_tx.send(PeerEvent::Connected).await.unwrap();
    media_tx
        .send(PeerEvent::Start {
            start: StartInfo {
                stream_sid: Some("S1".to_string()),
                call_sid: Some("C1".to_string()),
                account_sid: None,
            },
        })
        .await
        .unwrap();
}

async fn send_audio(
    handle: &SessionHandle,
    bytes: usize,
    label: SendLabel,
    uninterruptible: bool,
) -> oneshot::Receiver<stream_voicebot::session::SendResult> {
    let (done_tx, done_rx) = oneshot::channel();
    handle
        .control_tx
        .send(SessionControlIn::SendAudio {
            mulaw: vec![0x55; bytes],
            label,
            uninterruptible,
            done: Some(done_tx),
        })
        .await
        .unwrap();
    done_rx
}

fn frame_kind(frame: &OutboundFrame) -> (&'static str, serde_json::Value) {
    match frame {
        OutboundFrame::Text(text) => {
            let v: serde_json::Value = serde_json::from_str(text).unwrap();
            match v["event"].as_str().unwrap() {
                "media" => ("media", v),
                "mark" => ("mark", v),
                other => panic!("unexpected event {}", other),
            }
        }
        OutboundFrame::Close => ("close", serde_json::Value::Null),
    }
}

#[tokio::test(start_paused = true)]
async fn paced_send_emits_frames_then_mark() {
    let (handle, media_tx, mut out_rx) = spawn_session().await;
    handshake(&media_tx).await;

    // 2.5 frames of payload: two full chunks plus one padded chunk.
    let done = send_audio(&handle, FRAME_BYTES * 2 + 80, SendLabel::Reply, false).await;

    let mut media = 0;
    let mut mark = 0;
    while mark == 0 {
        let frame = timeout(RECV_TIMEOUT, out_rx.recv()).await.unwrap().unwrap();
        match frame_kind(&frame) {
            ("media", v) => {
                media += 1;
                let payload = v["media"]["payload"].as_str().unwrap().to_string();
                let bytes = BASE64.decode(payload).unwrap();
                assert_eq!(bytes.len(), FRAME_BYTES);
                assert_eq!(v["streamSid"].as_str(), Some("S1"));
            }
            ("mark", _) => mark += 1,
            (other, _) => panic!("unexpected {}", other),
        }
    }
    assert_eq!(media, 3);
    assert_eq!(done.await.unwrap().unwrap(), true);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_between_frames() {
    let (handle, media_tx, mut out_rx) = spawn_session().await;
    handshake(&media_tx).await;

    let done = send_audio(&handle, FRAME_BYTES * 50, SendLabel::Reply, false).await;

    // Let a few frames out, then ask for a stop and wait for wind-down.
    for _ in 0..3 {
        let frame = timeout(RECV_TIMEOUT, out_rx.recv()).await.unwrap().unwrap();
        assert_eq!(frame_kind(&frame).0, "media");
    }
    let (wait_tx, wait_rx) = oneshot::channel();
    handle
        .control_tx
        .send(SessionControlIn::StopAudio {
            reason: "test",
            wait: Some(wait_tx),
        })
        .await
        .unwrap();
    timeout(RECV_TIMEOUT, wait_rx).await.unwrap().unwrap();
    assert_eq!(done.await.unwrap().unwrap(), false);

    // Cancellation is observed between chunks: far fewer than 50 frames,
    // and no mark is ever emitted for the cancelled generation.
    let mut trailing = 0;
    while let Ok(Some(frame)) = timeout(Duration::from_millis(200), out_rx.recv()).await {
        assert_ne!(frame_kind(&frame).0, "mark");
        trailing += 1;
    }
    assert!(trailing < 5, "send kept going after stop ({} frames)", trailing);
}

#[tokio::test(start_paused = true)]
async fn uninterruptible_send_ignores_stop() {
    let (handle, media_tx, mut out_rx) = spawn_session().await;
    handshake(&media_tx).await;

    let done = send_audio(&handle, FRAME_BYTES * 5, SendLabel::Greeting, true).await;
    handle
        .control_tx
        .send(SessionControlIn::StopAudio {
            reason: "test",
            wait: None,
        })
        .await
        .unwrap();

    let mut media = 0;
    loop {
        let frame = timeout(RECV_TIMEOUT, out_rx.recv()).await.unwrap().unwrap();
        match frame_kind(&frame).0 {
            "media" => media += 1,
            "mark" => break,
            other => panic!("unexpected {}", other),
        }
    }
    // Every chunk was emitted and the generation completed naturally.
    assert_eq!(media, 5);
    assert_eq!(done.await.unwrap().unwrap(), true);
}

#[tokio::test(start_paused = true)]
async fn send_without_stream_id_is_rejected() {
    let (handle, _media_tx, _out_rx) = spawn_session().await;
    let done = send_audio(&handle, FRAME_BYTES, SendLabel::Reply, false).await;
    assert!(done.await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn caller_speech_barges_in() {
    let (handle, media_tx, mut out_rx) = spawn_session().await;
    handshake(&media_tx).await;

    let done = send_audio(&handle, FRAME_BYTES * 100, SendLabel::Reply, false).await;
    let frame = timeout(RECV_TIMEOUT, out_rx.recv()).await.unwrap().unwrap();
    assert_eq!(frame_kind(&frame).0, "media");

    // Loud caller audio while the agent is speaking: the while-playing
    // warm-up is 4 frames, after which the send must be cancelled.
    let voiced = encode_mulaw(&vec![9000i16; FRAME_BYTES]);
    for _ in 0..6 {
        media_tx
            .send(PeerEvent::Media {
                stream_sid: Some("S1".to_string()),
                media: MediaInfo {
                    payload: BASE64.encode(&voiced),
                    track: Some("inbound".to_string()),
                },
            })
            .await
            .unwrap();
    }
    assert_eq!(done.await.unwrap().unwrap(), false);
}

#[tokio::test(start_paused = true)]
async fn outbound_track_media_is_ignored() {
    let (handle, media_tx, _out_rx) = spawn_session().await;
    handshake(&media_tx).await;

    let done = send_audio(&handle, FRAME_BYTES * 100, SendLabel::Reply, false).await;
    // Echo of our own audio comes back tagged "outbound"; it must not
    // trigger barge-in however loud it is.
    let voiced = encode_mulaw(&vec![9000i16; FRAME_BYTES]);
    for _ in 0..20 {
        media_tx
            .send(PeerEvent::Media {
                stream_sid: Some("S1".to_string()),
                media: MediaInfo {
                    payload: BASE64.encode(&voiced),
                    track: Some("outbound".to_string()),
                },
            })
            .await
            .unwrap();
    }
    assert_eq!(done.await.unwrap().unwrap(), true);
}

#[tokio::test(start_paused = true)]
async fn stop_event_closes_session() {
    let (_handle, media_tx, mut out_rx) = spawn_session().await;
    handshake(&media_tx).await;
    media_tx
        .send(PeerEvent::Stop {
            stream_sid: Some("S1".to_string()),
        })
        .await
        .unwrap();

    loop {
        match timeout(RECV_TIMEOUT, out_rx.recv()).await.unwrap() {
            Some(OutboundFrame::Close) => break,
            Some(_) => {}
            None => break,
        }
    }

    // Quiet silence frames after stop must go nowhere.
    let _ = media_tx
        .send(PeerEvent::Media {
            stream_sid: Some("S1".to_string()),
            media: MediaInfo {
                payload: BASE64.encode(vec![MULAW_SILENCE; FRAME_BYTES]),
                track: None,
            },
        })
        .await;
    assert!(timeout(Duration::from_millis(200), out_rx.recv())
        .await
        .map(|f| f.is_none())
        .unwrap_or(true));
}
