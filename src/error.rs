use thiserror::Error;

/// Malformed or out-of-order peer traffic. Recoverable per frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("media before start")]
    MediaBeforeStart,
    #[error("unexpected event: {0}")]
    UnexpectedEvent(String),
}

/// Socket-level failures. Fatal for the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket closed")]
    Closed,
    #[error("write failed: {0}")]
    Write(String),
}

/// Failures of the STT/LLM/TTS services or the transcoder subprocess.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("stt: {0}")]
    Stt(String),
    #[error("classifier: {0}")]
    Classifier(String),
    #[error("llm: {0}")]
    Llm(String),
    #[error("tts: {0}")]
    Tts(String),
    #[error("transcode: {0}")]
    Transcode(String),
    #[error("object store: {0}")]
    Store(String),
}

/// Why an audio send could not be started.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("session closed")]
    SessionClosed,
    #[error("stream id not bound")]
    NoStreamId,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
