//! ffmpeg subprocess wrappers. Scratch files live in a `TempDir` so they
//! are removed on every exit path, success or error.

use tokio::process::Command;

use crate::config;
use crate::error::DownstreamError;

/// 8 kHz μ-law → 16 kHz mono WAV with the STT cleanup filter chain
/// (high-pass, low-pass, gain) applied. Phone audio is low-amplitude;
/// without the chain the transcriber misses quiet callers.
pub async fn mulaw_to_stt_wav(mulaw: &[u8]) -> Result<Vec<u8>, DownstreamError> {
    let dir = tempfile::tempdir().map_err(|e| DownstreamError::Transcode(e.to_string()))?;
    let in_path = dir.path().join("segment.ulaw");
    let out_path = dir.path().join("segment.wav");
    tokio::fs::write(&in_path, mulaw)
        .await
        .map_err(|e| DownstreamError::Transcode(e.to_string()))?;

    let filters = &config::stt_settings().audio_filters;
    let output = Command::new(config::ffmpeg_bin())
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-f")
        .arg("mulaw")
        .arg("-ar")
        .arg("8000")
        .arg("-ac")
        .arg("1")
        .arg("-i")
        .arg(&in_path)
        .arg("-af")
        .arg(filters)
        .arg("-ar")
        .arg("16000")
        .arg("-ac")
        .arg("1")
        .arg(&out_path)
        .output()
        .await
        .map_err(|e| DownstreamError::Transcode(format!("spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(DownstreamError::Transcode(format!(
            "ffmpeg exited {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    tokio::fs::read(&out_path)
        .await
        .map_err(|e| DownstreamError::Transcode(e.to_string()))
}

/// Any container/codec ffmpeg understands (the TTS engines return an
/// MP3-family buffer) → headerless 8 kHz mono μ-law.
pub async fn audio_to_mulaw(audio: &[u8]) -> Result<Vec<u8>, DownstreamError> {
    let dir = tempfile::tempdir().map_err(|e| DownstreamError::Transcode(e.to_string()))?;
    let in_path = dir.path().join("speech.bin");
    let out_path = dir.path().join("speech.ulaw");
    tokio::fs::write(&in_path, audio)
        .await
        .map_err(|e| DownstreamError::Transcode(e.to_string()))?;

    let output = Command::new(config::ffmpeg_bin())
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(&in_path)
        .arg("-ar")
        .arg("8000")
        .arg("-ac")
        .arg("1")
        .arg("-f")
        .arg("mulaw")
        .arg(&out_path)
        .output()
        .await
        .map_err(|e| DownstreamError::Transcode(format!("spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(DownstreamError::Transcode(format!(
            "ffmpeg exited {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    tokio::fs::read(&out_path)
        .await
        .map_err(|e| DownstreamError::Transcode(e.to_string()))
}
