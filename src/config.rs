use std::sync::OnceLock;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_ip: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            bind_ip: std::env::var("BIND_IP").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_u16("PORT", 3000),
        }
    }
}

static SERVER_CONFIG: OnceLock<ServerConfig> = OnceLock::new();

pub fn server_config() -> &'static ServerConfig {
    SERVER_CONFIG.get_or_init(ServerConfig::from_env)
}

/// Voice-activity thresholds. The `while_playing` pair applies while the
/// agent itself is sending audio, to resist caller-side echo.
#[derive(Clone, Debug)]
pub struct VadSettings {
    pub threshold: u8,
    pub threshold_while_playing: u8,
    pub warmup_frames: u32,
    pub warmup_frames_while_playing: u32,
    pub silence_ms: u64,
    pub min_speech_frames: usize,
    pub min_speech_bytes: usize,
    pub min_speech_ms: u64,
}

impl VadSettings {
    fn from_env() -> Self {
        Self {
            threshold: env_u8("VAD_THRESHOLD", 2),
            threshold_while_playing: env_u8("VAD_THRESHOLD_WHILE_PLAYING", 6),
            warmup_frames: env_u32("SPEECH_WARMUP_FRAMES", 2),
            warmup_frames_while_playing: env_u32("SPEECH_WARMUP_FRAMES_WHILE_PLAYING", 4),
            silence_ms: env_u64("SILENCE_MS", 400),
            min_speech_frames: env_u64("MIN_SPEECH_FRAMES", 10) as usize,
            min_speech_bytes: env_u64("MIN_SPEECH_BYTES", 1600) as usize,
            min_speech_ms: env_u64("MIN_SPEECH_MS", 400),
        }
    }
}

static VAD_SETTINGS: OnceLock<VadSettings> = OnceLock::new();

pub fn vad_settings() -> &'static VadSettings {
    VAD_SETTINGS.get_or_init(VadSettings::from_env)
}

#[derive(Clone, Debug)]
pub struct TurnSettings {
    pub merge_window_ms: u64,
    pub merge_window_ms_while_playing: u64,
    pub max_response_chars: usize,
    pub chat_model: String,
    pub classifier_model: String,
    pub history_context_messages: usize,
}

impl TurnSettings {
    fn from_env() -> Self {
        let merge_window_ms = env_u64("MERGE_WINDOW_MS", 1200);
        Self {
            merge_window_ms,
            merge_window_ms_while_playing: env_u64(
                "MERGE_WINDOW_MS_WHILE_PLAYING",
                merge_window_ms,
            ),
            max_response_chars: env_u64("MAX_RESPONSE_CHARS", 140) as usize,
            chat_model: std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            classifier_model: std::env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            history_context_messages: 10,
        }
    }
}

static TURN_SETTINGS: OnceLock<TurnSettings> = OnceLock::new();

pub fn turn_settings() -> &'static TurnSettings {
    TURN_SETTINGS.get_or_init(TurnSettings::from_env)
}

#[derive(Clone, Debug)]
pub struct SttSettings {
    pub language: String,
    pub gain_db: u32,
    /// Full ffmpeg filter chain applied before STT. `WHISPER_AUDIO_FILTERS`
    /// overrides the whole chain including the gain stage.
    pub audio_filters: String,
}

impl SttSettings {
    fn from_env() -> Self {
        let gain_db = env_u32("WHISPER_GAIN_DB", 6);
        let audio_filters = std::env::var("WHISPER_AUDIO_FILTERS").unwrap_or_else(|_| {
            format!("highpass=f=120,lowpass=f=3800,volume={}dB", gain_db)
        });
        Self {
            language: std::env::var("STT_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            gain_db,
            audio_filters,
        }
    }
}

static STT_SETTINGS: OnceLock<SttSettings> = OnceLock::new();

pub fn stt_settings() -> &'static SttSettings {
    STT_SETTINGS.get_or_init(SttSettings::from_env)
}

#[derive(Clone, Debug)]
pub struct TtsSettings {
    pub default_engine: String,
    pub default_voice: String,
    pub default_speed: f32,
    pub filler_version: String,
    pub greeting_text: String,
    pub filler_text: String,
}

impl TtsSettings {
    fn from_env() -> Self {
        Self {
            default_engine: std::env::var("TTS_ENGINE").unwrap_or_else(|_| "openai".to_string()),
            default_voice: std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            default_speed: env_f32("TTS_SPEED", 1.0),
            filler_version: std::env::var("FILLER_VERSION").unwrap_or_else(|_| "v1".to_string()),
            greeting_text: std::env::var("GREETING_TEXT").unwrap_or_else(|_| {
                "Hello, thank you for calling. How can I help you today?".to_string()
            }),
            filler_text: std::env::var("FILLER_TEXT").unwrap_or_else(|_| {
                "Yes, thank you; the AI is thinking, please wait a moment".to_string()
            }),
        }
    }
}

static TTS_SETTINGS: OnceLock<TtsSettings> = OnceLock::new();

pub fn tts_settings() -> &'static TtsSettings {
    TTS_SETTINGS.get_or_init(TtsSettings::from_env)
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub bucket: Option<String>,
}

impl StoreConfig {
    fn from_env() -> Self {
        Self {
            bucket: env_non_empty("AUDIO_CACHE_BUCKET"),
        }
    }
}

static STORE_CONFIG: OnceLock<StoreConfig> = OnceLock::new();

pub fn store_config() -> &'static StoreConfig {
    STORE_CONFIG.get_or_init(StoreConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct AiCredentials {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub google_api_key: Option<String>,
}

impl AiCredentials {
    fn from_env() -> Self {
        Self {
            openai_api_key: env_non_empty("OPENAI_API_KEY"),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            google_api_key: env_non_empty("GOOGLE_TTS_API_KEY"),
        }
    }
}

static AI_CREDENTIALS: OnceLock<AiCredentials> = OnceLock::new();

pub fn ai_credentials() -> &'static AiCredentials {
    AI_CREDENTIALS.get_or_init(AiCredentials::from_env)
}

/// True when the credentials needed to run a call are present. `/health`
/// stays up either way; new calls are rejected when this is false.
pub fn ai_ready() -> bool {
    ai_credentials().openai_api_key.is_some()
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub base_url: Option<String>,
}

impl RegistryConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_non_empty("CALL_REGISTRY_URL"),
        }
    }
}

static REGISTRY_CONFIG: OnceLock<RegistryConfig> = OnceLock::new();

pub fn registry_config() -> &'static RegistryConfig {
    REGISTRY_CONFIG.get_or_init(RegistryConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct Timeouts {
    pub ai_http: Duration,
    pub registry_http: Duration,
    pub greeting_wait: Duration,
}

impl Timeouts {
    fn from_env() -> Self {
        Self {
            ai_http: Duration::from_millis(env_u64("AI_HTTP_TIMEOUT_MS", 30_000)),
            registry_http: Duration::from_millis(env_u64("REGISTRY_HTTP_TIMEOUT_MS", 5_000)),
            greeting_wait: Duration::from_millis(env_u64("GREETING_WAIT_MS", 2_000)),
        }
    }
}

static TIMEOUTS: OnceLock<Timeouts> = OnceLock::new();

pub fn timeouts() -> &'static Timeouts {
    TIMEOUTS.get_or_init(Timeouts::from_env)
}

pub fn ffmpeg_bin() -> String {
    std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogMode {
    Stdout,
    File,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub mode: LogMode,
    pub dir: Option<String>,
    pub file_name: String,
}

impl LoggingConfig {
    fn from_env() -> Self {
        let format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let mode = match std::env::var("LOG_MODE").as_deref() {
            Ok("file") => LogMode::File,
            _ => LogMode::Stdout,
        };
        Self {
            format,
            mode,
            dir: env_non_empty("LOG_DIR"),
            file_name: std::env::var("LOG_FILE").unwrap_or_else(|_| "voicebot.log".to_string()),
        }
    }
}

static LOGGING_CONFIG: OnceLock<LoggingConfig> = OnceLock::new();

pub fn logging_config() -> &'static LoggingConfig {
    LOGGING_CONFIG.get_or_init(LoggingConfig::from_env)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_u8(name: &str, default: u8) -> u8 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
