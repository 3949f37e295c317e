use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};

// Ethereum JSON-RPC transport. Returns the `result` member, `null` included.
#[async_trait]
pub trait JsonRpc: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, String>;
}

pub struct HttpJsonRpc {
    url: String,
    client: Client,
}

impl HttpJsonRpc {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl JsonRpc for HttpJsonRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value, String> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        debug!("rpc {} -> {}", method, self.url);

        let value: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|error| error.to_string())?
            .json()
            .await
            .map_err(|error| format!("failed to parse {method} response JSON: {error}"))?;
        if let Some(error) = value.get("error") {
            return Err(format!("rpc returned error for {method}: {error}"));
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}
