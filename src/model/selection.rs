use std::time::Duration;

use log::{info, warn};

use super::{ChatBackend, ChatCompletion, SettlementMode, TeeModel};
use crate::bounded::run_bounded;
use crate::web::models::{Message, Role};

pub const MODEL_PRIORITY: [TeeModel; 4] = [
    TeeModel::Claude35Haiku,
    TeeModel::Gpt4o,
    TeeModel::Gemini20Flash,
    TeeModel::Grok3MiniBeta,
];

pub const FALLBACK_MODEL: TeeModel = TeeModel::Claude35Haiku;

// The model every request is routed to, chosen once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: TeeModel,
    pub label: String,
    pub fallback: bool,
}

impl ModelSelection {
    pub fn chosen(model: TeeModel) -> Self {
        Self {
            model,
            label: model.label().to_string(),
            fallback: false,
        }
    }

    pub fn fallback() -> Self {
        Self {
            model: FALLBACK_MODEL,
            label: format!("{} (fallback)", FALLBACK_MODEL.label()),
            fallback: true,
        }
    }
}

fn readiness_request(model: TeeModel, settlement: SettlementMode) -> ChatCompletion {
    ChatCompletion {
        model,
        messages: vec![
            Message {
                role: Role::System,
                content: "Reply with one word: OK".to_string(),
            },
            Message {
                role: Role::User,
                content: "Ready?".to_string(),
            },
        ],
        max_tokens: 10,
        temperature: 0.0,
        settlement,
    }
}

// First candidate that answers with non-empty text wins
pub async fn select_model(
    backend: &dyn ChatBackend,
    candidates: &[TeeModel],
    settlement: SettlementMode,
    timeout: Duration,
) -> ModelSelection {
    info!("Testing models...");
    for &model in candidates {
        match run_bounded(timeout, backend.chat(readiness_request(model, settlement))).await {
            Ok(output) if !output.content.trim().is_empty() => {
                let preview: String = output.content.trim().chars().take(20).collect();
                info!("  {}... ok ({})", model.label(), preview);
                return ModelSelection::chosen(model);
            }
            Ok(_) => warn!("  {}... empty response", model.label()),
            Err(e) => {
                let message: String = e.to_string().chars().take(80).collect();
                warn!("  {}... {}", model.label(), message);
            }
        }
    }

    warn!("No model answered the readiness check, falling back to {}", FALLBACK_MODEL);
    ModelSelection::fallback()
}
