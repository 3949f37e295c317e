// The guessing-game oracle. A model reply is an optional Markdown fence around
// a `question` or `guess` JSON object; anything else becomes a low-confidence
// question carrying the raw text.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use crate::bounded::{run_bounded, BoundedCallError};
use crate::model::selection::ModelSelection;
use crate::model::{ChatBackend, ChatCompletion, LlmError, SettlementMode};
use crate::web::models::{AskRequest, Message, Role};

pub const MAX_TOKENS: u32 = 300;
pub const TEMPERATURE: f32 = 0.3;
pub const FALLBACK_CONFIDENCE: u64 = 10;
pub const FALLBACK_QUESTION: &str = "Is it a living thing?";

const FENCE: &str = "```";

pub fn system_prompt(category: &str) -> String {
    format!(
        r#"You are an Akinator-style oracle AI. The player is thinking of a {category}.
Ask clever yes/no questions to deduce what they're thinking of, then guess.
RULES:
- Ask ONE question at a time: Yes/No/Maybe/Probably Yes/Probably No/I don't know
- After 15-20 questions (or confidence > 80%), make your final guess
- Guessing: respond ONLY with JSON (nothing else): {{"type":"guess","name":"X","description":"Y","confidence":85}}
- Asking: respond ONLY with JSON (nothing else): {{"type":"question","text":"Q?","confidence":30}}"#
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OracleReply {
    Question {
        text: String,
        #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
        confidence: Number,
    },
    Guess {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
        confidence: Number,
    },
}

fn default_confidence() -> Number {
    Number::from(FALLBACK_CONFIDENCE)
}

// Models sometimes quote the number or add a percent sign
fn lenient_confidence<'de, D>(deserializer: D) -> Result<Number, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n,
        Value::String(text) => confidence_from_text(&text).unwrap_or_else(default_confidence),
        _ => default_confidence(),
    })
}

fn confidence_from_text(text: &str) -> Option<Number> {
    let digits = text.trim().trim_end_matches('%').trim_end();
    if let Ok(whole) = digits.parse::<u64>() {
        return Some(Number::from(whole));
    }
    digits.parse::<f64>().ok().and_then(Number::from_f64)
}

impl OracleReply {
    pub fn fallback(raw: &str) -> Self {
        let text = if raw.is_empty() { FALLBACK_QUESTION } else { raw };
        OracleReply::Question {
            text: text.to_string(),
            confidence: Number::from(FALLBACK_CONFIDENCE),
        }
    }
}

// Body of the first fenced block (minus a `json` tag), else the trimmed input
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.split_once(FENCE) {
        None => trimmed,
        Some((_, after)) => {
            let body = after.split_once(FENCE).map_or(after, |(body, _)| body);
            let body = body.strip_prefix("json").unwrap_or(body);
            body.trim()
        }
    }
}

pub fn parse_reply(raw: &str) -> OracleReply {
    serde_json::from_str(strip_fences(raw)).unwrap_or_else(|_| OracleReply::fallback(raw))
}

pub fn sanitize_history(history: &[Value]) -> Vec<Message> {
    history.iter().filter_map(history_entry).collect()
}

fn history_entry(entry: &Value) -> Option<Message> {
    let role = match entry.get("role")?.as_str()? {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };
    // only truthy content survives; structured content is sent as JSON text
    let raw = entry.get("content")?;
    let content = match raw {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Bool(true) => "true".to_string(),
        Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
        Value::Array(items) if !items.is_empty() => raw.to_string(),
        Value::Object(fields) if !fields.is_empty() => raw.to_string(),
        _ => return None,
    };
    Some(Message { role, content })
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleAnswer {
    pub reply: OracleReply,
    pub payment_hash: Option<String>,
}

pub struct Oracle {
    backend: Arc<dyn ChatBackend>,
    selection: ModelSelection,
    settlement: SettlementMode,
    timeout: Duration,
}

impl Oracle {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        selection: ModelSelection,
        settlement: SettlementMode,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            selection,
            settlement,
            timeout,
        }
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub fn completion_for(&self, request: &AskRequest) -> ChatCompletion {
        let mut messages = vec![Message {
            role: Role::System,
            content: system_prompt(&request.category),
        }];
        messages.extend(sanitize_history(&request.history));

        ChatCompletion {
            model: self.selection.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            settlement: self.settlement,
        }
    }

    pub async fn ask(
        &self,
        request: &AskRequest,
    ) -> Result<OracleAnswer, BoundedCallError<LlmError>> {
        info!("-> {} q#{}", self.selection.label, request.question_num);

        let completion = self.completion_for(request);
        let output = match run_bounded(self.timeout, self.backend.chat(completion)).await {
            Ok(output) => output,
            Err(e) => {
                if e.is_timeout() {
                    warn!(
                        "<- {} gave no answer within {}s",
                        self.selection.label,
                        self.timeout.as_secs()
                    );
                }
                return Err(e);
            }
        };

        let preview: String = output.content.chars().take(80).collect();
        info!(
            "<- {} | tx:{}",
            preview,
            output.payment_hash.as_deref().unwrap_or("none")
        );

        Ok(OracleAnswer {
            reply: parse_reply(&output.content),
            payment_hash: output.payment_hash,
        })
    }
}
