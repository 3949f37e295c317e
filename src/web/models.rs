use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::oracle::OracleReply;
use crate::wallet::Balance;

pub const DEFAULT_CATEGORY: &str = "thing";
pub const DEFAULT_QUESTION_NUM: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

// Body of `POST /api/ask`. A missing or mistyped field takes its default.
// `question_num` is echoed back exactly as sent, so it stays a JSON number.
#[derive(Debug, Clone, PartialEq)]
pub struct AskRequest {
    pub category: String,
    pub history: Vec<Value>,
    pub question_num: Number,
}

impl Default for AskRequest {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            history: Vec::new(),
            question_num: Number::from(DEFAULT_QUESTION_NUM),
        }
    }
}

impl AskRequest {
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        Self {
            category: value
                .get("category")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(defaults.category),
            history: value
                .get("history")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or(defaults.history),
            question_num: match value.get("question_num") {
                Some(Value::Number(n)) => n.clone(),
                _ => defaults.question_num,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub success: bool,
    pub response: OracleReply,
    pub payment_hash: Option<String>,
    pub question_num: Number,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub wallet: String,
    pub balance: Balance,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let request = AskRequest::from_body(b"{}");
        assert_eq!(request, AskRequest::default());
        assert_eq!(request.category, "thing");
        assert_eq!(request.question_num, Number::from(1));
    }

    #[test]
    fn wrong_types_take_defaults() {
        let request = AskRequest::from_value(&json!({
            "category": 42,
            "history": "not a list",
            "question_num": "seven"
        }));
        assert_eq!(request, AskRequest::default());
    }

    #[test]
    fn non_json_body_is_treated_as_empty() {
        assert_eq!(AskRequest::from_body(b"category=animal"), AskRequest::default());
        assert_eq!(AskRequest::from_body(b""), AskRequest::default());
    }

    #[test]
    fn well_formed_body_is_kept() {
        let request = AskRequest::from_body(
            br#"{"category":"animal","history":[{"role":"user","content":"Yes"}],"question_num":4}"#,
        );
        assert_eq!(request.category, "animal");
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.question_num, Number::from(4));
    }

    #[test]
    fn question_num_keeps_its_json_form() {
        let fractional = AskRequest::from_body(br#"{"question_num":3.0}"#);
        assert_eq!(serde_json::to_string(&fractional.question_num).unwrap(), "3.0");

        let huge = AskRequest::from_body(br#"{"question_num":18446744073709551615}"#);
        assert_eq!(huge.question_num.as_u64(), Some(u64::MAX));

        let negative = AskRequest::from_body(br#"{"question_num":-2}"#);
        assert_eq!(negative.question_num.as_i64(), Some(-2));
    }

    #[test]
    fn error_body_shape() {
        let value = serde_json::to_value(ErrorResponse::new("Timed out after 90s")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Timed out after 90s"}));
    }
}
