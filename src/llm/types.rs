use crate::error::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseConfig {
    pub response_mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

/// One text-in, text-out model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: String,
    pub config: ResponseConfig,
}

impl GenerateRequest {
    /// A request asking for JSON, optionally constrained by `schema`.
    pub fn json(model: impl Into<String>, contents: impl Into<String>, schema: Option<Value>) -> Self {
        Self {
            model: model.into(),
            contents: contents.into(),
            config: ResponseConfig {
                response_mime_type: JSON_MIME_TYPE.to_string(),
                response_schema: schema,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// The LLM boundary. Implementations must be usable from a single async task;
/// the generators never issue concurrent calls.
pub trait ContentGenerator: Send + Sync {
    fn generate_content(&self, request: GenerateRequest) -> BoxFuture<'_, Result<LlmResponse>>;
}
