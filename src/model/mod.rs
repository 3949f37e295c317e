pub mod selection;
#[cfg(test)]
pub mod stub;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::web::models::Message;

const PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";
const SETTLEMENT_HEADER: &str = "X-SETTLEMENT-TYPE";

// Models served from the inference network's TEE nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeeModel {
    Claude35Haiku,
    Gpt4o,
    Gemini20Flash,
    Grok3MiniBeta,
}

impl TeeModel {
    pub fn id(&self) -> &'static str {
        match self {
            TeeModel::Claude35Haiku => "anthropic/claude-3.5-haiku",
            TeeModel::Gpt4o => "openai/gpt-4o",
            TeeModel::Gemini20Flash => "google/gemini-2.0-flash",
            TeeModel::Grok3MiniBeta => "x-ai/grok-3-mini-beta",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TeeModel::Claude35Haiku => "CLAUDE_3_5_HAIKU",
            TeeModel::Gpt4o => "GPT_4O",
            TeeModel::Gemini20Flash => "GEMINI_2_0_FLASH",
            TeeModel::Grok3MiniBeta => "GROK_3_MINI_BETA",
        }
    }
}

impl fmt::Display for TeeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// How the per-call payment is settled on chain: each call on its own, batched,
// or with the full request metadata recorded alongside the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementMode {
    Settle,
    #[default]
    SettleBatch,
    SettleMetadata,
}

impl SettlementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementMode::Settle => "settle",
            SettlementMode::SettleBatch => "settle-batch",
            SettlementMode::SettleMetadata => "settle-metadata",
        }
    }
}

impl FromStr for SettlementMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "settle" => Ok(SettlementMode::Settle),
            "settle-batch" => Ok(SettlementMode::SettleBatch),
            "settle-metadata" => Ok(SettlementMode::SettleMetadata),
            other => Err(format!("unknown settlement mode {other}")),
        }
    }
}

impl fmt::Display for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub model: TeeModel,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub settlement: SettlementMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOutput {
    pub content: String,
    pub payment_hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to inference service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference service returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatCompletion) -> Result<ChatOutput, LlmError>;
}

// Client for the hosted inference service's OpenAI-compatible chat API
pub struct OpenGradientClient {
    server_url: String,
    client: Client,
}

impl OpenGradientClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        info!("Using inference service at: {}", server_url);
        Self {
            server_url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenGradientClient {
    async fn chat(&self, request: ChatCompletion) -> Result<ChatOutput, LlmError> {
        let url = format!("{}/v1/chat/completions", self.server_url);

        let payload = json!({
            "model": request.model.id(),
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        debug!("Payload: {}", payload);

        let response = self
            .client
            .post(&url)
            .header(SETTLEMENT_HEADER, request.settlement.as_str())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(LlmError::Api { status, body });
        }

        let header_hash = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        Ok(chat_output_from(&response_json, header_hash))
    }
}

// A missing content field is an empty reply, not an error
fn chat_output_from(response_json: &Value, header_hash: Option<String>) -> ChatOutput {
    let content = response_json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .unwrap_or_default()
        .to_string();

    let payment_hash = response_json
        .get("payment_hash")
        .and_then(|hash| hash.as_str())
        .map(str::to_string)
        .or(header_hash);

    ChatOutput {
        content,
        payment_hash,
    }
}
