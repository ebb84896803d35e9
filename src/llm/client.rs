use crate::error::{HistoryError, Result};
use crate::llm::types::{ContentGenerator, GenerateRequest, LlmResponse, Usage};
use futures::future::BoxFuture;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked for an API key, in order.
pub const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    response_mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Gemini `generateContent` over HTTPS.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Reads the key from the first non-empty variable in [`API_KEY_VARS`].
    pub fn from_env() -> Result<Self> {
        resolve_api_key(|key| std::env::var(key).ok()).map(Self::new)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send(&self, request: GenerateRequest) -> Result<LlmResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key
        );

        let payload = WireRequest {
            contents: vec![WireContent {
                role: "user",
                parts: vec![WirePart {
                    text: &request.contents,
                }],
            }],
            generation_config: WireGenerationConfig {
                response_mime_type: &request.config.response_mime_type,
                response_schema: request.config.response_schema.as_ref(),
            },
        };

        debug!(
            "Calling {} with a {}-character prompt",
            request.model,
            request.contents.chars().count()
        );

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(HistoryError::Request(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: WireResponse = res.json().await?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| HistoryError::Request("No candidates returned".to_string()))?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.is_empty() {
            return Err(HistoryError::Request(
                "Model returned no text content".to_string(),
            ));
        }

        Ok(LlmResponse {
            text,
            usage: body.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        })
    }
}

impl ContentGenerator for GeminiClient {
    fn generate_content(&self, request: GenerateRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(self.send(request))
    }
}

fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    API_KEY_VARS
        .iter()
        .find_map(|var| lookup(var).filter(|value| !value.trim().is_empty()))
        .map(|value| value.trim().to_string())
        .ok_or_else(|| HistoryError::MissingCredential(API_KEY_VARS.join(", ")))
}
