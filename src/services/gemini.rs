use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::GenerativeModel;
use crate::models::AnalysisFailure;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

/// Base64 payload sent inline with the user turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: &str, data: String) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data,
            },
        }
    }
}

impl GenerateContentRequest {
    /// A single user turn, optionally preceded by a system instruction.
    pub fn user_turn(parts: Vec<Part>, system_prompt: Option<&str>) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            system_instruction: system_prompt.map(|prompt| SystemInstruction {
                parts: vec![Part::text(prompt)],
            }),
        }
    }
}

// Every level is optional: a successful call with an odd shape degrades to a
// fallback text instead of a decode error.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate, if it has any content.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

pub struct GeminiClient {
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_url: String, api_key: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_url,
            api_key,
            client: builder.build()?,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// reqwest errors carry the request URL, which carries the API key.
fn transport_failure(error: reqwest::Error) -> AnalysisFailure {
    AnalysisFailure::Transport(error.without_url().to_string())
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AnalysisFailure> {
        log::info!("🤖 Sending request to Gemini: {}", self.api_url);
        if let Ok(payload) = serde_json::to_string(request) {
            log::debug!("📤 Request payload size: {} bytes", payload.len());
        }

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(request);

        if let Some(key) = &self.api_key {
            builder = builder.query(&[("key", key)]);
        }

        let response = builder.send().await.map_err(|e| {
            let failure = transport_failure(e);
            log::error!("❌ Gemini request failed: {}", failure.detail());
            failure
        })?;

        let status = response.status();
        log::debug!("📥 Gemini response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ Gemini API error response ({}): {}", status, error_text);
            return Err(AnalysisFailure::Transport(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let response_text = response.text().await.map_err(transport_failure)?;
        log::debug!("📄 Raw Gemini response size: {} bytes", response_text.len());

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("❌ Could not parse Gemini response: {}", e);
            AnalysisFailure::General(format!("Invalid response from model API: {}", e))
        })?;

        log::debug!("✅ Parsed Gemini response with {} candidate(s)", parsed.candidates.len());
        Ok(parsed)
    }
}
