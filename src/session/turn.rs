//! One caller turn: transcription, intent routing, reply generation,
//! synthesis and handoff to the paced sender. Single-flight per session;
//! the coordinator queues further segments until `TurnFinished`.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::ai::intent::{self, IntentAction};
use crate::ai::tts::{self, TtsBinding};
use crate::ai::{self, ChatMessage, Role};
use crate::config;
use crate::error::DownstreamError;
use crate::registry::CallRegistryPort;
use crate::session::{SendLabel, SessionControlIn};

pub const RETRY_PROMPT: &str = "Sorry, I couldn't catch that. Could you repeat?";
pub const CLOSING_QUESTION: &str = "Anything else? If not, you may hang up.";
pub const FAREWELL_TEXT: &str = "Thank you for calling. Goodbye.";
pub const TAKE_MESSAGE_PROMPT: &str =
    "Certainly. Please tell me your name, a callback number, and the details of your message.";

/// Caller phrases that mean "no further business" once the closing
/// question has been asked.
const NOTHING_FURTHER_PHRASES: &[&str] = &[
    "no",
    "nope",
    "nothing",
    "nothing else",
    "no thats all",
    "thats all",
    "that is all",
    "no thank you",
    "no thanks",
    "im good",
    "all good",
    "no more requests",
    "goodbye",
    "bye",
];

/// Immutable snapshot handed to the turn pipeline. The coordinator state
/// it was cut from is only updated through messages sent back on
/// `control_tx`, so per-call state is never touched from two tasks.
pub struct TurnContext {
    pub call_id: Option<String>,
    pub mulaw: Vec<u8>,
    pub history_tail: Vec<ChatMessage>,
    pub closing_asked: bool,
    pub ai_enabled: bool,
    pub binding: TtsBinding,
    pub control_tx: mpsc::Sender<SessionControlIn>,
    pub registry: Arc<dyn CallRegistryPort>,
}

pub async fn run_turn(ctx: TurnContext) {
    if let Err(err) = run_turn_inner(&ctx).await {
        // Per-turn boundary: log and accept the next turn. The caller may
        // retry by speaking again.
        warn!("[turn] aborted: {}", err);
    }
    let _ = ctx.control_tx.send(SessionControlIn::TurnFinished).await;
}

async fn run_turn_inner(ctx: &TurnContext) -> Result<(), DownstreamError> {
    let user_text = ai::transcribe(&ctx.mulaw).await?;

    if user_text.is_empty() {
        info!("[turn] empty transcription, asking to repeat");
        speak_text(&ctx.control_tx, &ctx.binding, RETRY_PROMPT, SendLabel::Reply).await;
        return Ok(());
    }

    append_log(ctx, Role::User, &user_text).await;

    if !ctx.ai_enabled {
        info!("[turn] ai disabled, transcription logged only");
        return Ok(());
    }

    let action = intent::classify(&user_text, ctx.closing_asked).await;
    let reply = match action {
        IntentAction::Farewell => FAREWELL_TEXT.to_string(),
        IntentAction::TakeMessage => TAKE_MESSAGE_PROMPT.to_string(),
        IntentAction::Closing => {
            set_flags(ctx, Some(true), Some(true)).await;
            if let Some(call_id) = ctx.call_id.clone() {
                let registry = ctx.registry.clone();
                let purpose = user_text.clone();
                tokio::spawn(async move {
                    if let Err(err) = registry.record_purpose(call_id, purpose).await {
                        warn!("[registry] purpose not recorded: {}", err);
                    }
                });
            }
            format!("Understood. {}", CLOSING_QUESTION)
        }
        IntentAction::Normal => {
            if ctx.closing_asked && is_nothing_further(&user_text) {
                FAREWELL_TEXT.to_string()
            } else {
                let mut context = ctx.history_tail.clone();
                context.push(ChatMessage {
                    role: Role::User,
                    content: user_text.clone(),
                });
                let window = config::turn_settings().history_context_messages;
                if context.len() > window {
                    context.drain(..context.len() - window);
                }
                let raw = ai::chat_reply(&context).await?;
                truncate_reply(&raw, config::turn_settings().max_response_chars)
            }
        }
    };

    append_log(ctx, Role::Assistant, &reply).await;
    speak_text(&ctx.control_tx, &ctx.binding, &reply, SendLabel::Reply).await;
    Ok(())
}

/// Stops any in-flight audio (the filler, usually), synthesizes and sends.
/// Used for turn replies, the apology path, operator `/speak` and the
/// transfer guidance message.
pub async fn speak_text(
    control_tx: &mpsc::Sender<SessionControlIn>,
    binding: &TtsBinding,
    text: &str,
    label: SendLabel,
) {
    stop_and_wait(control_tx, "new_utterance").await;
    match tts::synthesize_mulaw(binding, text).await {
        Ok(mulaw) => {
            if let Some(done) = super::coordinator::send_audio(control_tx, mulaw, label, false).await
            {
                // Transfer guidance must finish playing before the caller
                // is redirected; other labels do not wait.
                if label == SendLabel::Transfer {
                    let _ = done.await;
                }
            }
        }
        Err(err) => error!("[turn] synthesis failed, staying silent: {}", err),
    }
}

async fn stop_and_wait(control_tx: &mpsc::Sender<SessionControlIn>, reason: &'static str) {
    let (tx, rx) = oneshot::channel();
    if control_tx
        .send(SessionControlIn::StopAudio {
            reason,
            wait: Some(tx),
        })
        .await
        .is_ok()
    {
        let _ = rx.await;
    }
}

async fn append_log(ctx: &TurnContext, role: Role, text: &str) {
    let _ = ctx
        .control_tx
        .send(SessionControlIn::AppendLog {
            role,
            text: text.to_string(),
        })
        .await;
}

async fn set_flags(ctx: &TurnContext, closing_asked: Option<bool>, purpose_captured: Option<bool>) {
    let _ = ctx
        .control_tx
        .send(SessionControlIn::SetDialogFlags {
            closing_asked,
            purpose_captured,
        })
        .await;
}

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if c.is_whitespace() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

pub fn is_nothing_further(text: &str) -> bool {
    let norm = normalize(text);
    !norm.is_empty() && NOTHING_FURTHER_PHRASES.iter().any(|p| norm == *p)
}

pub fn truncate_reply(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_further_matching() {
        assert!(is_nothing_further("No, that's all."));
        assert!(is_nothing_further("Nothing else"));
        assert!(is_nothing_further("  BYE!  "));
        assert!(is_nothing_further("no more requests"));
        assert!(!is_nothing_further("no, one more thing"));
        assert!(!is_nothing_further("I know a thing"));
        assert!(!is_nothing_further(""));
    }

    #[test]
    fn reply_truncation() {
        assert_eq!(truncate_reply("short", 140), "short");
        let long = "a".repeat(150);
        let cut = truncate_reply(&long, 140);
        assert_eq!(cut.chars().count(), 141);
        assert!(cut.ends_with('…'));
        // multi-byte safety
        let jp = "ありがとうございます".repeat(20);
        let cut = truncate_reply(&jp, 140);
        assert_eq!(cut.chars().count(), 141);
    }
}
