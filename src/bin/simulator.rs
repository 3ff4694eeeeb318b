//! Headless call simulator: speaks the exact media-stream wire grammar so
//! the server cannot tell it apart from a telephony provider. Feeds a WAV
//! file (or a synthetic tone) as caller audio and records what the agent
//! says back.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use stream_voicebot::audio::{
    self, FrameChunker, LinearResampler, FRAME_BYTES, MULAW_SILENCE, SAMPLE_RATE,
};
use stream_voicebot::logging;
use stream_voicebot::protocol;

#[derive(Debug)]
struct Options {
    url: String,
    wav: Option<String>,
    tone_secs: f64,
    speed: f64,
    linger_secs: f64,
    out: Option<String>,
    call_id: String,
}

impl Options {
    fn parse() -> Result<Self> {
        let mut opts = Options {
            url: "ws://127.0.0.1:3000/streams".to_string(),
            wav: None,
            tone_secs: 0.0,
            speed: 1.0,
            linger_secs: 6.0,
            out: None,
            call_id: format!("sim-{}", Uuid::new_v4()),
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = |name: &str| -> Result<String> {
                args.next().with_context(|| format!("{} needs a value", name))
            };
            match arg.as_str() {
                "--url" => opts.url = value("--url")?,
                "--wav" => opts.wav = Some(value("--wav")?),
                "--tone" => opts.tone_secs = value("--tone")?.parse()?,
                "--speed" => opts.speed = value("--speed")?.parse()?,
                "--linger" => opts.linger_secs = value("--linger")?.parse()?,
                "--out" => opts.out = Some(value("--out")?),
                "--call-id" => opts.call_id = value("--call-id")?,
                other => bail!("unknown argument: {}", other),
            }
        }
        if opts.wav.is_none() && opts.tone_secs <= 0.0 {
            bail!("nothing to send: pass --wav <file> or --tone <seconds>");
        }
        if opts.speed <= 0.0 {
            bail!("--speed must be positive");
        }
        Ok(opts)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let opts = Options::parse()?;

    let caller_mulaw = match &opts.wav {
        Some(path) => load_wav_as_mulaw(path)?,
        None => tone_mulaw(opts.tone_secs),
    };
    log::info!(
        "[sim] caller audio: {} bytes ({} ms)",
        caller_mulaw.len(),
        caller_mulaw.len() as u64 * 1000 / SAMPLE_RATE as u64
    );

    let stream_sid = format!("SIM{:016x}", rand::thread_rng().gen::<u64>());
    let account_sid = "SIMACCOUNT".to_string();

    let (ws, _) = tokio_tungstenite::connect_async(&opts.url)
        .await
        .with_context(|| format!("connecting {}", opts.url))?;
    let (mut sink, mut source) = ws.split();

    // Reader: collect everything the agent plays to us.
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let reader = tokio::spawn(async move {
        let mut marks = 0u32;
        while let Some(Ok(msg)) = source.next().await {
            if let Message::Text(text) = msg {
                match protocol::parse_peer_event(&text) {
                    Ok(protocol::PeerEvent::Media { media, .. }) => {
                        if let Ok(bytes) = BASE64.decode(media.payload.as_bytes()) {
                            let _ = received_tx.send(bytes);
                        }
                    }
                    Ok(protocol::PeerEvent::Mark { mark }) => {
                        marks += 1;
                        log::info!(
                            "[sim] mark from agent: {}",
                            mark.map(|m| m.name).unwrap_or_default()
                        );
                    }
                    Ok(protocol::PeerEvent::Stop { .. }) => break,
                    _ => {}
                }
            }
        }
        marks
    });

    sink.send(Message::Text(protocol::connected_event())).await?;
    sink.send(Message::Text(protocol::start_event(
        &stream_sid,
        &opts.call_id,
        &account_sid,
    )))
    .await?;
    log::info!("[sim] call {} started (stream {})", opts.call_id, stream_sid);

    // Pace caller audio at 20 ms per frame, scaled by the multiplier,
    // then idle silence so the agent's reply (and our EOS) can play out.
    let frame_interval = Duration::from_secs_f64(0.02 / opts.speed);
    let mut pace = tokio::time::interval(frame_interval);
    pace.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
    let mut chunker = FrameChunker::new();
    let mut frames = chunker.push(&caller_mulaw);
    if let Some(tail) = chunker.flush() {
        frames.push(tail);
    }
    for frame in frames {
        pace.tick().await;
        sink.send(Message::Text(protocol::inbound_media_event(
            &stream_sid,
            &frame,
        )))
        .await?;
    }
    let silence = vec![MULAW_SILENCE; FRAME_BYTES];
    let linger_frames = (opts.linger_secs / 0.02) as u64;
    for _ in 0..linger_frames {
        pace.tick().await;
        sink.send(Message::Text(protocol::inbound_media_event(
            &stream_sid,
            &silence,
        )))
        .await?;
    }

    sink.send(Message::Text(protocol::stop_event(&stream_sid))).await?;
    let _ = sink.send(Message::Close(None)).await;
    let marks = reader.await.unwrap_or(0);

    let mut received = Vec::new();
    while let Ok(chunk) = received_rx.try_recv() {
        received.extend_from_slice(&chunk);
    }
    log::info!(
        "[sim] received {} bytes of agent audio, {} marks",
        received.len(),
        marks
    );

    if let Some(out) = &opts.out {
        write_mulaw_wav(out, &received)?;
        log::info!("[sim] agent audio written to {}", out);
    }
    Ok(())
}

/// Any-rate WAV → 8 kHz mono μ-law, through the stateful resampler.
fn load_wav_as_mulaw(path: &str) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("opening {}", path))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        bail!("expected 16-bit PCM WAV, got {:?}", spec);
    }

    let channels = spec.channels as usize;
    let mut mono: Vec<i16> = Vec::new();
    let mut acc: i32 = 0;
    for (i, sample) in reader.samples::<i16>().enumerate() {
        acc += sample? as i32;
        if (i + 1) % channels == 0 {
            mono.push((acc / channels as i32) as i16);
            acc = 0;
        }
    }

    let mut resampler = LinearResampler::new(spec.sample_rate, SAMPLE_RATE);
    let pcm8k = resampler.process(&mono);
    Ok(audio::encode_mulaw(&pcm8k))
}

/// Synthetic caller: a 440 Hz burst bracketed by silence, enough to pass
/// the segmentation minimums and then go quiet for EOS.
fn tone_mulaw(seconds: f64) -> Vec<u8> {
    let lead = vec![0i16; SAMPLE_RATE as usize / 2];
    let samples = (seconds * SAMPLE_RATE as f64) as usize;
    let tone: Vec<i16> = (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            ((t * 440.0 * std::f64::consts::TAU).sin() * 9000.0) as i16
        })
        .collect();
    let mut pcm = lead.clone();
    pcm.extend(tone);
    pcm.extend(lead);
    audio::encode_mulaw(&pcm)
}

fn write_mulaw_wav(path: &str, mulaw: &[u8]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &b in mulaw {
        writer.write_sample(audio::mulaw_to_linear16(b))?;
    }
    writer.finalize()?;
    Ok(())
}
