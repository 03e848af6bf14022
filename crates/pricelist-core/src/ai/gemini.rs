//! Gemini `generateContent` client over blocking reqwest.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Attachment, GenerativeModel};
use crate::error::AiError;
use crate::models::config::AiConfig;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Client bound to one model name.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    /// Build a client for `model`. Fails when no API key is configured.
    pub fn new(config: &AiConfig, model: &str) -> Result<Self, AiError> {
        let api_key = config.resolve_api_key().ok_or(AiError::MissingApiKey)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn for_extraction(config: &AiConfig) -> Result<Self, AiError> {
        Self::new(config, &config.extraction_model)
    }

    pub fn for_matching(config: &AiConfig) -> Result<Self, AiError> {
        Self::new(config, &config.matching_model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

fn build_request<'a>(prompt: &'a str, attachment: Option<Attachment<'a>>, temperature: f32) -> GenerateRequest<'a> {
    let mut parts = Vec::with_capacity(2);
    if let Some(att) = attachment {
        parts.push(RequestPart::Inline {
            inline_data: InlineData {
                mime_type: att.mime_type,
                data: BASE64_STANDARD.encode(att.data),
            },
        });
    }
    parts.push(RequestPart::Text { text: prompt });

    GenerateRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig { temperature },
    }
}

fn response_text(response: GenerateResponse) -> Result<String, AiError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text)
}

impl GenerativeModel for GeminiClient {
    fn generate(&self, prompt: &str, attachment: Option<Attachment<'_>>) -> Result<String, AiError> {
        let body = build_request(prompt, attachment, self.temperature);
        debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            attachment_bytes = attachment.map(|a| a.data.len()).unwrap_or(0),
            "calling generative model"
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(model = %self.model, status = status.as_u16(), "generative model returned an error");
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json()?;
        response_text(parsed)
    }
}
