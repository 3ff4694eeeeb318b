//! Port to the external call registry (call records, per-call TTS binding,
//! persisted conversation log). The registry itself is another service;
//! failures here are logged and never fail a call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use log::warn;
use serde::Deserialize;

use crate::ai::tts::{Engine, TtsBinding};
use crate::config;

pub type RegistryFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    pub engine: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

impl CallConfig {
    pub fn into_binding(self) -> TtsBinding {
        let default = TtsBinding::default();
        TtsBinding {
            engine: self
                .engine
                .as_deref()
                .and_then(Engine::parse)
                .unwrap_or(default.engine),
            voice: self.voice.unwrap_or(default.voice),
            speed: self.speed.unwrap_or(default.speed),
        }
    }
}

pub trait CallRegistryPort: Send + Sync {
    /// Most recent call record still in "ringing" state, newest first.
    /// Used to bind sessions whose upgrade URL carried no call id.
    fn recent_ringing_call(&self) -> RegistryFuture<Result<Option<String>>>;

    /// Per-call TTS binding, when the call record overrides the defaults.
    fn call_config(&self, call_id: String) -> RegistryFuture<Result<Option<CallConfig>>>;

    /// Appends one message to the persisted conversation log.
    /// Create-or-merge: unknown call ids (simulator calls) create a record.
    fn append_message(
        &self,
        call_id: String,
        role: &'static str,
        text: String,
    ) -> RegistryFuture<Result<()>>;

    /// Persists the captured call purpose out-of-band.
    fn record_purpose(&self, call_id: String, text: String) -> RegistryFuture<Result<()>>;

    /// Asks the telephony provider to redirect the call to `target`.
    fn redirect(&self, call_id: String, target: String) -> RegistryFuture<Result<()>>;
}

pub struct HttpCallRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCallRegistry {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config::timeouts().registry_http)
            .build()
            .unwrap_or_default();
        Self { base_url, client }
    }
}

#[derive(Debug, Deserialize)]
struct RingingResponse {
    call_id: Option<String>,
}

impl CallRegistryPort for HttpCallRegistry {
    fn recent_ringing_call(&self) -> RegistryFuture<Result<Option<String>>> {
        let url = format!("{}/calls/ringing/latest", self.base_url);
        let client = self.client.clone();
        Box::pin(async move {
            let resp = client.get(url).send().await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let body: RingingResponse = resp.error_for_status()?.json().await?;
            Ok(body.call_id)
        })
    }

    fn call_config(&self, call_id: String) -> RegistryFuture<Result<Option<CallConfig>>> {
        let url = format!("{}/calls/{}/config", self.base_url, call_id);
        let client = self.client.clone();
        Box::pin(async move {
            let resp = client.get(url).send().await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let cfg: CallConfig = resp.error_for_status()?.json().await?;
            Ok(Some(cfg))
        })
    }

    fn append_message(
        &self,
        call_id: String,
        role: &'static str,
        text: String,
    ) -> RegistryFuture<Result<()>> {
        let url = format!("{}/calls/{}/messages", self.base_url, call_id);
        let client = self.client.clone();
        Box::pin(async move {
            client
                .post(url)
                .json(&serde_json::json!({ "role": role, "text": text }))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn record_purpose(&self, call_id: String, text: String) -> RegistryFuture<Result<()>> {
        let url = format!("{}/calls/{}/purpose", self.base_url, call_id);
        let client = self.client.clone();
        Box::pin(async move {
            client
                .post(url)
                .json(&serde_json::json!({ "purpose": text }))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn redirect(&self, call_id: String, target: String) -> RegistryFuture<Result<()>> {
        let url = format!("{}/calls/{}/redirect", self.base_url, call_id);
        let client = self.client.clone();
        Box::pin(async move {
            client
                .post(url)
                .json(&serde_json::json!({ "target": target }))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoopCallRegistry;

impl NoopCallRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl CallRegistryPort for NoopCallRegistry {
    fn recent_ringing_call(&self) -> RegistryFuture<Result<Option<String>>> {
        Box::pin(async { Ok(None) })
    }

    fn call_config(&self, _call_id: String) -> RegistryFuture<Result<Option<CallConfig>>> {
        Box::pin(async { Ok(None) })
    }

    fn append_message(
        &self,
        _call_id: String,
        _role: &'static str,
        _text: String,
    ) -> RegistryFuture<Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn record_purpose(&self, _call_id: String, _text: String) -> RegistryFuture<Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn redirect(&self, _call_id: String, _target: String) -> RegistryFuture<Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Builds the configured registry port: HTTP when `CALL_REGISTRY_URL` is
/// set, otherwise a no-op.
pub fn from_env() -> Arc<dyn CallRegistryPort> {
    match &config::registry_config().base_url {
        Some(base) => Arc::new(HttpCallRegistry::new(base.trim_end_matches('/').to_string())),
        None => {
            warn!("[registry] CALL_REGISTRY_URL not set, call records are not persisted");
            Arc::new(NoopCallRegistry::new())
        }
    }
}
