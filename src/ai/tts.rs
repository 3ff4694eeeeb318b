//! Speech synthesis. Two engines, name-preserved for vendor compatibility;
//! both return an MP3 buffer that is re-encoded to 8 kHz μ-law.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::info;
use serde::Deserialize;

use crate::config;
use crate::error::DownstreamError;

use super::transcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    OpenAi,
    Google,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::OpenAi => "openai",
            Engine::Google => "google",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(Engine::OpenAi),
            "google" => Some(Engine::Google),
            _ => None,
        }
    }
}

/// Per-call synthesis binding. Defaults come from env; the call registry
/// may override them per call.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsBinding {
    pub engine: Engine,
    pub voice: String,
    pub speed: f32,
}

impl Default for TtsBinding {
    fn default() -> Self {
        let cfg = config::tts_settings();
        Self {
            engine: Engine::parse(&cfg.default_engine).unwrap_or(Engine::OpenAi),
            voice: cfg.default_voice.clone(),
            speed: cfg.default_speed,
        }
    }
}

impl TtsBinding {
    /// Stable textual key component: `openai-alloy-1.0`.
    pub fn key(&self) -> String {
        format!("{}-{}-{:.1}", self.engine.as_str(), self.voice, self.speed)
    }
}

/// Synthesizes `text` with the bound engine and returns raw μ-law bytes.
pub async fn synthesize_mulaw(binding: &TtsBinding, text: &str) -> Result<Vec<u8>, DownstreamError> {
    let mp3 = match binding.engine {
        Engine::OpenAi => synth_openai_mp3(binding, text).await?,
        Engine::Google => synth_google_mp3(binding, text).await?,
    };
    let mulaw = transcode::audio_to_mulaw(&mp3).await?;
    info!(
        "[tts] synthesized {} chars -> {} bytes mulaw ({})",
        text.chars().count(),
        mulaw.len(),
        binding.key()
    );
    Ok(mulaw)
}

async fn synth_openai_mp3(binding: &TtsBinding, text: &str) -> Result<Vec<u8>, DownstreamError> {
    let key = config::ai_credentials()
        .openai_api_key
        .as_deref()
        .ok_or_else(|| DownstreamError::Tts("OPENAI_API_KEY not configured".to_string()))?;
    let client = reqwest::Client::builder()
        .timeout(config::timeouts().ai_http)
        .build()
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;

    let body = serde_json::json!({
        "model": "tts-1",
        "voice": binding.voice,
        "input": text,
        "speed": binding.speed,
        "response_format": "mp3",
    });
    let resp = client
        .post(format!(
            "{}/audio/speech",
            config::ai_credentials().openai_base_url
        ))
        .bearer_auth(key)
        .json(&body)
        .send()
        .await
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DownstreamError::Tts(format!("{}: {}", status, body)));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;
    Ok(bytes.to_vec())
}

#[derive(Deserialize)]
struct GoogleSynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Google voices are language-coded (`ja-JP-Neural2-B`); the language code
/// is the first two dash-separated parts of the voice name.
fn google_language_code(voice: &str) -> String {
    let mut parts = voice.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => format!("{}-{}", a, b),
        _ => "en-US".to_string(),
    }
}

async fn synth_google_mp3(binding: &TtsBinding, text: &str) -> Result<Vec<u8>, DownstreamError> {
    let key = config::ai_credentials()
        .google_api_key
        .as_deref()
        .ok_or_else(|| DownstreamError::Tts("GOOGLE_TTS_API_KEY not configured".to_string()))?;
    let client = reqwest::Client::builder()
        .timeout(config::timeouts().ai_http)
        .build()
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;

    let body = serde_json::json!({
        "input": { "text": text },
        "voice": {
            "languageCode": google_language_code(&binding.voice),
            "name": binding.voice,
        },
        "audioConfig": {
            "audioEncoding": "MP3",
            "speakingRate": binding.speed,
        },
    });
    let resp = client
        .post(format!(
            "https://texttospeech.googleapis.com/v1/text:synthesize?key={}",
            key
        ))
        .json(&body)
        .send()
        .await
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DownstreamError::Tts(format!("{}: {}", status, body)));
    }
    let parsed: GoogleSynthesizeResponse = resp
        .json()
        .await
        .map_err(|e| DownstreamError::Tts(e.to_string()))?;
    BASE64
        .decode(parsed.audio_content.as_bytes())
        .map_err(|e| DownstreamError::Tts(format!("audioContent: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_key_format() {
        let binding = TtsBinding {
            engine: Engine::OpenAi,
            voice: "alloy".to_string(),
            speed: 1.0,
        };
        assert_eq!(binding.key(), "openai-alloy-1.0");
    }

    #[test]
    fn language_code_from_voice_name() {
        assert_eq!(google_language_code("ja-JP-Neural2-B"), "ja-JP");
        assert_eq!(google_language_code("en-US-Standard-C"), "en-US");
        assert_eq!(google_language_code("weird"), "en-US");
    }

    #[test]
    fn engine_names_roundtrip() {
        assert_eq!(Engine::parse("openai"), Some(Engine::OpenAi));
        assert_eq!(Engine::parse("google"), Some(Engine::Google));
        assert_eq!(Engine::parse("polly"), None);
        assert_eq!(Engine::Google.as_str(), "google");
    }
}
