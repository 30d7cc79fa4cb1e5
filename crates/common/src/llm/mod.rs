//! Text generation clients
//!
//! Provides:
//! - A `generate(system_instruction, input)` abstraction
//! - Gemini (`generateContent`) with optional web-search grounding
//! - OpenAI-compatible chat completions
//! - A rule-based mock for development and tests

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use crate::upstream::{services, with_timeout};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `input` under `system_instruction`
    async fn generate(&self, system_instruction: &str, input: &str) -> Result<String>;

    /// Same as [`TextGenerator::generate`], allowing the provider to ground
    /// the answer with web search when it supports it
    async fn generate_grounded(&self, system_instruction: &str, input: &str) -> Result<String> {
        self.generate(system_instruction, input).await
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini REST client
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    web_search: bool,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "generation.api_key is required for the gemini provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            timeout: config.timeout(),
            web_search: config.web_search,
        })
    }

    async fn call(&self, system_instruction: &str, input: &str, grounded: bool) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let tools = if grounded && self.web_search {
            vec![serde_json::json!({ "google_search": {} })]
        } else {
            Vec::new()
        };

        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system_instruction }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: input }],
            }],
            generation_config: GeminiGenerationConfig { temperature: 0.0 },
            tools,
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::upstream(services::GENERATION, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                services::GENERATION,
                format!("API error {}: {}", status, body),
            ));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            AppError::upstream(services::GENERATION, format!("Failed to parse response: {}", e))
        })?;

        extract_gemini_text(parsed)
    }
}

fn extract_gemini_text(response: GeminiResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AppError::upstream(services::GENERATION, "Empty response from model"));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, system_instruction: &str, input: &str) -> Result<String> {
        with_timeout(
            services::GENERATION,
            self.timeout,
            self.call(system_instruction, input, false),
        )
        .await
    }

    async fn generate_grounded(&self, system_instruction: &str, input: &str) -> Result<String> {
        with_timeout(
            services::GENERATION,
            self.timeout,
            self.call(system_instruction, input, true),
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChatGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "generation.api_key is required for the openai provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base),
            timeout: config.timeout(),
        })
    }

    async fn call(&self, system_instruction: &str, input: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::upstream(services::GENERATION, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                services::GENERATION,
                format!("API error {}: {}", status, body),
            ));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AppError::upstream(services::GENERATION, format!("Failed to parse response: {}", e))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AppError::upstream(services::GENERATION, "Empty response from model"))
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    async fn generate(&self, system_instruction: &str, input: &str) -> Result<String> {
        with_timeout(services::GENERATION, self.timeout, self.call(system_instruction, input)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Rule-based generator for development and tests.
///
/// The first rule whose needle occurs in the system instruction supplies
/// the answer; without a match the input is echoed back.
#[derive(Default)]
pub struct MockGenerator {
    rules: Vec<(String, String)>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `response` whenever the system instruction contains `needle`
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, system_instruction: &str, input: &str) -> Result<String> {
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| system_instruction.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| input.to_string()))
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a text generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiChatGenerator::new(config)?)),
        "mock" => Ok(Arc::new(MockGenerator::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "December " }, { "text": "2024" }] }
            }]
        }))
        .unwrap();
        assert_eq!(extract_gemini_text(response).unwrap(), "December 2024");
    }

    #[test]
    fn test_gemini_empty_candidates_is_upstream_error() {
        let response: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            extract_gemini_text(response),
            Err(AppError::Upstream { .. })
        ));
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "extract" }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: "CPI report" }],
            }],
            generation_config: GeminiGenerationConfig { temperature: 0.0 },
            tools: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "extract");
        assert!(json.get("tools").is_none());
        assert!(json["system_instruction"].get("role").is_none());
    }

    #[tokio::test]
    async fn test_mock_generator_rules() {
        let generator = MockGenerator::new()
            .with_rule("LATEST", "December 2024")
            .with_rule("EARLIEST", "June 2023");

        assert_eq!(
            generator.generate("output the LATEST date", "q").await.unwrap(),
            "December 2024"
        );
        assert_eq!(
            generator.generate("output the EARLIEST date", "q").await.unwrap(),
            "June 2023"
        );
        assert_eq!(generator.generate("rephrase", "as is").await.unwrap(), "as is");
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let config = GenerationConfig::default();
        assert!(matches!(
            GeminiGenerator::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
