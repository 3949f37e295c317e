use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{ChatBackend, ChatCompletion, ChatOutput, LlmError, TeeModel};

#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(&'static str),
    Fail,
    Hang,
}

// Backend that answers from a per-model script and records every request
#[derive(Default)]
pub struct ScriptedBackend {
    script: HashMap<&'static str, Scripted>,
    pub payment_hash: Option<String>,
    pub requests: Mutex<Vec<ChatCompletion>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: TeeModel, reply: Scripted) -> Self {
        self.script.insert(model.label(), reply);
        self
    }

    pub fn replying(model: TeeModel, content: &'static str) -> Self {
        Self::new().with(model, Scripted::Reply(content))
    }

    pub fn calls(&self) -> Vec<ChatCompletion> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: ChatCompletion) -> Result<ChatOutput, LlmError> {
        let model = request.model;
        self.requests.lock().unwrap().push(request);
        match self.script.get(model.label()).cloned().unwrap_or(Scripted::Fail) {
            Scripted::Reply(content) => Ok(ChatOutput {
                content: content.to_string(),
                payment_hash: self.payment_hash.clone(),
            }),
            Scripted::Fail => Err(LlmError::Api {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: format!("{} unavailable", model.label()),
            }),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ChatOutput::default())
            }
        }
    }
}
