//! Clients for the external speech and language services. All outward I/O
//! (HTTP, transcoder subprocess, scratch files) stays inside this module;
//! the session layer sees text and μ-law buffers only.

pub mod intent;
pub mod transcode;
pub mod tts;

use std::time::Duration;

use log::info;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::DownstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

fn http_client(timeout: Duration) -> Result<Client, DownstreamError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DownstreamError::Llm(format!("http client: {}", e)))
}

fn openai_key() -> Result<&'static str, DownstreamError> {
    config::ai_credentials()
        .openai_api_key
        .as_deref()
        .ok_or_else(|| DownstreamError::Llm("OPENAI_API_KEY not configured".to_string()))
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes a caller segment: μ-law → filtered 16 kHz WAV → STT.
/// Returns the raw transcript, possibly empty.
pub async fn transcribe(mulaw: &[u8]) -> Result<String, DownstreamError> {
    let wav = transcode::mulaw_to_stt_wav(mulaw).await?;

    let key = openai_key().map_err(|_| DownstreamError::Stt("no credentials".to_string()))?;
    let client = http_client(config::timeouts().ai_http)
        .map_err(|e| DownstreamError::Stt(e.to_string()))?;

    let part = multipart::Part::bytes(wav)
        .file_name("segment.wav")
        .mime_str("audio/wav")
        .map_err(|e| DownstreamError::Stt(e.to_string()))?;
    let form = multipart::Form::new()
        .part("file", part)
        .text("model", "whisper-1")
        .text("language", config::stt_settings().language.clone())
        .text("temperature", "0")
        .text("response_format", "verbose_json");

    let resp = client
        .post(format!(
            "{}/audio/transcriptions",
            config::ai_credentials().openai_base_url
        ))
        .bearer_auth(key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| DownstreamError::Stt(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DownstreamError::Stt(format!("{}: {}", status, body)));
    }
    let result: TranscriptionResponse = resp
        .json()
        .await
        .map_err(|e| DownstreamError::Stt(e.to_string()))?;
    let text = result.text.trim().to_string();
    info!("[stt] transcript: {}", text);
    Ok(text)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
pub(crate) struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

const REPLY_SYSTEM_PROMPT: &str = "You are a polite telephone receptionist AI. \
Answer in one or two short spoken sentences. Never use lists, markdown or \
URLs; this text is converted to speech.";

/// One conversational completion over the trailing context window.
pub async fn chat_reply(context: &[ChatMessage]) -> Result<String, DownstreamError> {
    let model = &config::turn_settings().chat_model;
    let mut messages = vec![ChatRequestMessage {
        role: "system",
        content: REPLY_SYSTEM_PROMPT,
    }];
    messages.extend(context.iter().map(|m| ChatRequestMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    let answer = chat_completion(model, messages, 0.3, 80).await?;
    info!("[llm] reply: {}", answer);
    Ok(answer)
}

pub(crate) async fn chat_completion(
    model: &str,
    messages: Vec<ChatRequestMessage<'_>>,
    temperature: f32,
    max_tokens: u32,
) -> Result<String, DownstreamError> {
    let key = openai_key()?;
    let client = http_client(config::timeouts().ai_http)?;
    let req = ChatRequest {
        model,
        messages,
        temperature,
        max_tokens,
    };

    let resp = client
        .post(format!(
            "{}/chat/completions",
            config::ai_credentials().openai_base_url
        ))
        .bearer_auth(key)
        .json(&req)
        .send()
        .await
        .map_err(|e| DownstreamError::Llm(e.to_string()))?;

    let status = resp.status();
    let body_text = resp
        .text()
        .await
        .map_err(|e| DownstreamError::Llm(e.to_string()))?;
    if !status.is_success() {
        return Err(DownstreamError::Llm(format!("{}: {}", status, body_text)));
    }

    let body: ChatResponse =
        serde_json::from_str(&body_text).map_err(|e| DownstreamError::Llm(e.to_string()))?;
    let answer = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    Ok(answer.trim().to_string())
}

pub(crate) fn user_message(content: &str) -> ChatRequestMessage<'_> {
    ChatRequestMessage {
        role: "user",
        content,
    }
}

pub(crate) fn system_message(content: &str) -> ChatRequestMessage<'_> {
    ChatRequestMessage {
        role: "system",
        content,
    }
}
