//! Two-tier cache for the fixed-text audio artifacts (greeting, filler):
//! process-memory map in front of an object store. Arbitrary replies are
//! never cached; their text changes every turn.

use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::ai::tts::{self, TtsBinding};
use crate::config;
use crate::error::DownstreamError;

const CACHE_CONTROL: &str = "public, max-age=31536000";
const FILLER_TAG: &str = "thinking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    Greeting,
    Filler,
}

impl CacheRole {
    fn fixed_text(&self) -> String {
        let cfg = config::tts_settings();
        match self {
            CacheRole::Greeting => cfg.greeting_text.clone(),
            CacheRole::Filler => cfg.filler_text.clone(),
        }
    }
}

/// Persisted object name. The filler carries a version tag so changing the
/// filler text invalidates cleanly.
pub fn object_name(role: CacheRole, binding: &TtsBinding) -> String {
    match role {
        CacheRole::Greeting => format!("initial-greeting-{}.ulaw", binding.key()),
        CacheRole::Filler => format!(
            "filler-{}-{}-{}.ulaw",
            FILLER_TAG,
            config::tts_settings().filler_version,
            binding.key()
        ),
    }
}

struct CacheEntry {
    mulaw: Arc<Vec<u8>>,
    #[allow(dead_code)]
    loaded_at: DateTime<Utc>,
}

pub struct AudioCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Per-key guards: a concurrent miss must launch one synthesis, not many.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    s3: Option<aws_sdk_s3::Client>,
    bucket: Option<String>,
}

impl AudioCache {
    pub async fn new() -> Self {
        let bucket = config::store_config().bucket.clone();
        let s3 = if bucket.is_some() {
            let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Some(aws_sdk_s3::Client::new(&sdk_config))
        } else {
            info!("[cache] no bucket configured, memory tier only");
            None
        };
        Self {
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            s3,
            bucket,
        }
    }

    /// Non-synthesizing lookup: memory, then object store. The greeting
    /// fast path uses this so a cache hit never waits on a TTS binding.
    pub async fn lookup(&self, role: CacheRole, binding: &TtsBinding) -> Option<Arc<Vec<u8>>> {
        let name = object_name(role, binding);
        if let Some(entry) = self.entries.lock().await.get(&name) {
            return Some(entry.mulaw.clone());
        }
        match self.fetch_object(&name).await {
            Some(bytes) => {
                let mulaw = Arc::new(bytes);
                self.remember(&name, mulaw.clone()).await;
                Some(mulaw)
            }
            None => None,
        }
    }

    /// Full miss path: memory → object store → synthesize. The memory tier
    /// is populated immediately; the object-store write is fire-and-forget.
    pub async fn get_or_synthesize(
        &self,
        role: CacheRole,
        binding: &TtsBinding,
    ) -> Result<Arc<Vec<u8>>, DownstreamError> {
        let name = object_name(role, binding);

        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            locks.entry(name.clone()).or_default().clone()
        };
        let _guard = key_lock.lock().await;

        // Re-check under the key lock: a concurrent caller may have won.
        if let Some(entry) = self.entries.lock().await.get(&name) {
            return Ok(entry.mulaw.clone());
        }
        if let Some(bytes) = self.fetch_object(&name).await {
            let mulaw = Arc::new(bytes);
            self.remember(&name, mulaw.clone()).await;
            return Ok(mulaw);
        }

        let text = role.fixed_text();
        let mulaw = Arc::new(tts::synthesize_mulaw(binding, &text).await?);
        self.remember(&name, mulaw.clone()).await;
        self.store_object_async(name, mulaw.clone());
        Ok(mulaw)
    }

    /// Primes the default-binding greeting and filler on cold start so the
    /// first call takes the fast path.
    pub async fn prime_defaults(self: &Arc<Self>) {
        let binding = TtsBinding::default();
        for role in [CacheRole::Greeting, CacheRole::Filler] {
            match self.get_or_synthesize(role, &binding).await {
                Ok(bytes) => info!(
                    "[cache] primed {} ({} bytes)",
                    object_name(role, &binding),
                    bytes.len()
                ),
                Err(err) => warn!(
                    "[cache] failed to prime {}: {}",
                    object_name(role, &binding),
                    err
                ),
            }
        }
    }

    async fn remember(&self, name: &str, mulaw: Arc<Vec<u8>>) {
        self.entries.lock().await.insert(
            name.to_string(),
            CacheEntry {
                mulaw,
                loaded_at: Utc::now(),
            },
        );
    }

    async fn fetch_object(&self, name: &str) -> Option<Vec<u8>> {
        let (s3, bucket) = match (&self.s3, &self.bucket) {
            (Some(s3), Some(bucket)) => (s3, bucket),
            _ => return None,
        };
        match s3.get_object().bucket(bucket).key(name).send().await {
            Ok(out) => match out.body.collect().await {
                Ok(data) => {
                    let bytes = data.into_bytes().to_vec();
                    info!("[cache] object hit {} ({} bytes)", name, bytes.len());
                    Some(bytes)
                }
                Err(err) => {
                    // Treated as a miss; the caller falls through to
                    // synthesis.
                    warn!(
                        "[cache] {}",
                        DownstreamError::Store(format!("read {}: {}", name, err))
                    );
                    None
                }
            },
            Err(_) => None,
        }
    }

    fn store_object_async(&self, name: String, mulaw: Arc<Vec<u8>>) {
        let (s3, bucket) = match (&self.s3, &self.bucket) {
            (Some(s3), Some(bucket)) => (s3.clone(), bucket.clone()),
            _ => return,
        };
        tokio::spawn(async move {
            let body = ByteStream::from(mulaw.as_ref().clone());
            match s3
                .put_object()
                .bucket(&bucket)
                .key(&name)
                .body(body)
                .content_type("application/octet-stream")
                .cache_control(CACHE_CONTROL)
                .send()
                .await
            {
                Ok(_) => info!("[cache] stored {} to s3://{}", name, bucket),
                Err(err) => warn!(
                    "[cache] {}",
                    DownstreamError::Store(format!("write {}: {}", name, err))
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::tts::Engine;

    #[test]
    fn object_name_grammar() {
        let binding = TtsBinding {
            engine: Engine::OpenAi,
            voice: "alloy".to_string(),
            speed: 1.0,
        };
        assert_eq!(
            object_name(CacheRole::Greeting, &binding),
            "initial-greeting-openai-alloy-1.0.ulaw"
        );
        let filler = object_name(CacheRole::Filler, &binding);
        assert!(filler.starts_with("filler-thinking-"));
        assert!(filler.ends_with("-openai-alloy-1.0.ulaw"));
    }

    #[tokio::test]
    async fn memory_tier_round_trip() {
        let cache = AudioCache {
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            s3: None,
            bucket: None,
        };
        let binding = TtsBinding {
            engine: Engine::Google,
            voice: "ja-JP-Neural2-B".to_string(),
            speed: 1.0,
        };
        assert!(cache.lookup(CacheRole::Greeting, &binding).await.is_none());
        let name = object_name(CacheRole::Greeting, &binding);
        cache.remember(&name, Arc::new(vec![0xFF; 320])).await;
        let hit = cache
            .lookup(CacheRole::Greeting, &binding)
            .await
            .expect("memory hit");
        assert_eq!(hit.len(), 320);
    }
}
