//! Intent classifier: a constrained LLM call that must answer with strict
//! JSON. Anything unparsable falls back to `Normal` so a flaky classifier
//! can never wedge a call.

use log::{info, warn};
use serde::Deserialize;

use crate::config;
use crate::error::DownstreamError;

use super::{chat_completion, system_message, user_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentAction {
    Normal,
    TakeMessage,
    Closing,
    Farewell,
}

impl IntentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentAction::Normal => "normal",
            IntentAction::TakeMessage => "take_message",
            IntentAction::Closing => "closing",
            IntentAction::Farewell => "farewell",
        }
    }
}

const CLASSIFIER_PROMPT: &str = r#"You are the intent classifier of a telephone voicebot.
Classify the caller's utterance and answer with JSON only.

Rules:
- Output JSON only, no prose, no code fences.
- Format: {"action":"normal|take_message|closing|farewell","reason":"<short reason>"}
- "farewell": the caller is saying goodbye or asking to hang up.
- "take_message": the caller wants to leave a message for a person.
- "closing": the caller has fully stated the purpose of the call and it has been understood.
- "normal": anything else.

The input states whether the closing question was already asked."#;

/// Classifies one caller utterance. Never fails upward: every error path
/// logs and resolves to `Normal`.
pub async fn classify(user_text: &str, closing_asked: bool) -> IntentAction {
    let input = format!(
        "{{\"closing_asked\":{},\"user_message\":{}}}",
        closing_asked,
        serde_json::json!(user_text)
    );
    match classify_inner(&input).await {
        Ok(action) => {
            info!("[intent] action={}", action.as_str());
            action
        }
        Err(err) => {
            warn!("[intent] classifier failed, falling back to normal: {}", err);
            IntentAction::Normal
        }
    }
}

async fn classify_inner(input: &str) -> Result<IntentAction, DownstreamError> {
    let model = &config::turn_settings().classifier_model;
    let raw = chat_completion(
        model,
        vec![system_message(CLASSIFIER_PROMPT), user_message(input)],
        0.0,
        60,
    )
    .await
    .map_err(|e| DownstreamError::Classifier(e.to_string()))?;
    Ok(parse_action(&raw))
}

#[derive(Deserialize)]
struct ActionPayload {
    action: String,
}

/// Strict parse of the classifier answer. Model output is occasionally
/// wrapped in code fences; strip those before parsing.
pub fn parse_action(raw: &str) -> IntentAction {
    let sanitized = sanitize_json_block(raw.trim());
    match serde_json::from_str::<ActionPayload>(&sanitized) {
        Ok(payload) => match payload.action.to_ascii_lowercase().as_str() {
            "normal" => IntentAction::Normal,
            "take_message" => IntentAction::TakeMessage,
            "closing" => IntentAction::Closing,
            "farewell" => IntentAction::Farewell,
            other => {
                warn!("[intent] unknown action '{}', using normal", other);
                IntentAction::Normal
            }
        },
        Err(err) => {
            warn!("[intent] unparsable answer ({}): {}", err, raw);
            IntentAction::Normal
        }
    }
}

fn sanitize_json_block(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_actions() {
        assert_eq!(
            parse_action(r#"{"action":"closing","reason":"purpose stated"}"#),
            IntentAction::Closing
        );
        assert_eq!(
            parse_action(r#"{"action":"FAREWELL","reason":"bye"}"#),
            IntentAction::Farewell
        );
        assert_eq!(
            parse_action(r#"{"action":"take_message","reason":"wants to leave one"}"#),
            IntentAction::TakeMessage
        );
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(
            parse_action("```json\n{\"action\":\"closing\",\"reason\":\"x\"}\n```"),
            IntentAction::Closing
        );
    }

    #[test]
    fn garbage_falls_back_to_normal() {
        assert_eq!(parse_action("I think this is a farewell."), IntentAction::Normal);
        assert_eq!(parse_action(r#"{"action":"transfer"}"#), IntentAction::Normal);
        assert_eq!(parse_action(""), IntentAction::Normal);
    }
}
