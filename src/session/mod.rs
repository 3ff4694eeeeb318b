//! Per-call session actor and its message types. All mutable per-call
//! state lives inside one coordinator task; every other task (turn
//! pipeline, control surface, greeting/filler synthesis) talks to it
//! through typed messages.

pub mod coordinator;
pub mod turn;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::ai::tts::TtsBinding;
use crate::ai::Role;
use crate::error::SendError;

pub const CONTROL_CHANNEL_CAPACITY: usize = 64;
pub const MEDIA_CHANNEL_CAPACITY: usize = 256;
pub const OUT_CHANNEL_CAPACITY: usize = 64;

pub type SendResult = Result<bool, SendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendLabel {
    Greeting,
    Filler,
    Reply,
    Manual,
    Transfer,
}

impl SendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendLabel::Greeting => "greeting",
            SendLabel::Filler => "filler",
            SendLabel::Reply => "reply",
            SendLabel::Manual => "manual",
            SendLabel::Transfer => "transfer",
        }
    }
}

/// Control-plane messages into the session actor. Operator commands and
/// the turn pipeline both use this channel, so they serialize with media
/// handling and cannot race the per-call state.
#[derive(Debug)]
pub enum SessionControlIn {
    SetAiEnabled {
        enabled: bool,
    },
    /// Operator-forced assistant reply; works regardless of `ai_enabled`.
    Speak {
        text: String,
    },
    /// Operator-initiated transfer: guidance message, then redirect.
    Transfer {
        message: String,
        target: String,
        done: oneshot::Sender<bool>,
    },
    SetTtsBinding {
        binding: TtsBinding,
    },
    /// Start a paced send. `done` resolves with Ok(true) on natural
    /// completion, Ok(false) on cancellation, Err on a send that never
    /// started.
    SendAudio {
        mulaw: Vec<u8>,
        label: SendLabel,
        uninterruptible: bool,
        done: Option<oneshot::Sender<SendResult>>,
    },
    /// Cooperative stop of the in-flight generation. With `wait`, resolves
    /// once the current send has fully wound down (stop_and_wait).
    StopAudio {
        reason: &'static str,
        wait: Option<oneshot::Sender<()>>,
    },
    AppendLog {
        role: Role,
        text: String,
    },
    SetDialogFlags {
        closing_asked: Option<bool>,
        purpose_captured: Option<bool>,
    },
    TurnFinished,
    /// Fired 2 s after `connected`; logs an error if the handshake never
    /// completed and the greeting was skipped.
    GreetingCheck,
    Shutdown,
}

/// Frames from the session actor to the WebSocket writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

#[derive(Clone)]
pub struct SessionHandle {
    pub control_tx: mpsc::Sender<SessionControlIn>,
}

/// Live sessions by call id, for the HTTP control surface.
pub type SessionMap = Arc<Mutex<HashMap<String, SessionHandle>>>;

pub fn new_session_map() -> SessionMap {
    Arc::new(Mutex::new(HashMap::new()))
}

pub fn lookup_session(map: &SessionMap, call_id: &str) -> Option<SessionHandle> {
    map.lock().ok().and_then(|m| m.get(call_id).cloned())
}
