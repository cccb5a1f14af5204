use crate::payload::{decode_image_payload, encode_base64};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),
    #[error("upstream returned status {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("Network error occurred: {0}")]
    Network(String),
    #[error("could not decode generated image: {0}")]
    Decode(String),
}

/// Reference image as sent over the wire: declared type plus base64 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64_data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            base64_data: encode_base64(bytes),
        }
    }
}

/// One remote call: every prompt of a batch plus the number of images wanted.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub prompts: Vec<String>,
    pub image_count: usize,
    pub reference_image: Option<InlineImage>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Issues exactly one request and returns the decoded image payloads in
    /// response order. Never retries.
    async fn generate(&self, call: &GenerationCall) -> Result<Vec<Vec<u8>>, GenerationError>;
}

// ────────────────────────── Wire format ──────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineDataPart },
}

#[derive(Debug, Serialize)]
struct InlineDataPart {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "candidateCount")]
    candidate_count: usize,
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
}

fn build_request_body(call: &GenerationCall) -> GenerateContentBody {
    let mut parts: Vec<Part> = call
        .prompts
        .iter()
        .map(|prompt| Part::Text {
            text: prompt.clone(),
        })
        .collect();

    if let Some(image) = &call.reference_image {
        parts.push(Part::InlineData {
            inline_data: InlineDataPart {
                mime_type: image.mime_type.clone(),
                data: image.base64_data.clone(),
            },
        });
    }

    GenerateContentBody {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            candidate_count: call.image_count.max(1),
            response_modalities: ["TEXT", "IMAGE"],
        },
    }
}

/// Where an image payload can live in a success body, in lookup priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadLocation {
    /// `data` at the top level, a string or an array of strings.
    TopLevelData,
    /// `candidates[].content.parts[].inlineData.data`
    CamelInlineData,
    /// `candidates[].content.parts[].inline_data.data`
    SnakeInlineData,
}

const PAYLOAD_LOOKUP_ORDER: [PayloadLocation; 3] = [
    PayloadLocation::TopLevelData,
    PayloadLocation::CamelInlineData,
    PayloadLocation::SnakeInlineData,
];

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|text| !text.is_empty())
}

fn collect_at(body: &Value, location: PayloadLocation) -> Vec<String> {
    match location {
        PayloadLocation::TopLevelData => match body.get("data") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(non_empty_str)
                .map(ToString::to_string)
                .collect(),
            Some(value) => non_empty_str(value)
                .map(|text| vec![text.to_string()])
                .unwrap_or_default(),
            None => Vec::new(),
        },
        PayloadLocation::CamelInlineData | PayloadLocation::SnakeInlineData => {
            let field = if location == PayloadLocation::CamelInlineData {
                "inlineData"
            } else {
                "inline_data"
            };
            let candidates = body
                .get("candidates")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            candidates
                .iter()
                .filter_map(|candidate| candidate.pointer("/content/parts"))
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(|part| part.get(field))
                .filter_map(|inline| inline.get("data"))
                .filter_map(non_empty_str)
                .map(ToString::to_string)
                .collect()
        }
    }
}

/// Returns the base64 payloads from the first location that yields any.
pub fn extract_image_payloads(body: &Value) -> Vec<String> {
    for location in PAYLOAD_LOOKUP_ORDER {
        let found = collect_at(body, location);
        if !found.is_empty() {
            log::debug!("Found {} image payload(s) at {:?}", found.len(), location);
            return found;
        }
    }
    Vec::new()
}

// ────────────────────────── HTTP client ──────────────────────────

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: build_generate_endpoint(base_url, model),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, call: &GenerationCall) -> Result<Vec<Vec<u8>>, GenerationError> {
        let body = build_request_body(call);
        log::debug!(
            "POST {} with {} prompt(s), {} image(s) requested, reference image: {}",
            self.endpoint,
            call.prompts.len(),
            call.image_count,
            call.reference_image.is_some()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| GenerationError::Network(format_transport_error(&self.endpoint, &error)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|error| GenerationError::Network(error.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Remote {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|error| GenerationError::Decode(format!("invalid JSON body: {}", error)))?;
        Ok(decode_payloads(&extract_image_payloads(&parsed)))
    }
}

/// Decodes every payload, skipping the ones that are not valid base64.
fn decode_payloads(payloads: &[String]) -> Vec<Vec<u8>> {
    let mut images = Vec::with_capacity(payloads.len());
    for (index, payload) in payloads.iter().enumerate() {
        match decode_image_payload(payload) {
            Ok((bytes, _mime)) => images.push(bytes),
            Err(error) => log::warn!("Skipping image payload {}: {}", index + 1, error),
        }
    }
    images
}

fn build_generate_endpoint(base_url: &str, model: &str) -> String {
    let normalized = normalize_base_url(base_url);
    let model = model.trim().trim_start_matches("models/");
    format!("{normalized}/models/{model}:generateContent")
}

fn normalize_base_url(base_url: &str) -> String {
    let mut normalized = base_url.trim().trim_end_matches('/').to_string();
    if normalized.is_empty() {
        return DEFAULT_API_BASE_URL.to_string();
    }
    while let Some(stripped) = normalized.strip_suffix("/models") {
        normalized = stripped.trim_end_matches('/').to_string();
    }
    normalized
}

fn format_transport_error(endpoint: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        return format!("request to {} timed out", endpoint);
    }
    if error.is_connect() {
        return format!("could not connect to {}", endpoint);
    }
    format!("transport error at {}: {}", endpoint, error)
}

fn build_client(
    api_key: Option<&str>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, GenerationError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key {
        let token = key.trim();
        if !token.is_empty() {
            let value = HeaderValue::from_str(token)
                .map_err(|error| GenerationError::Validation(format!("invalid API key: {}", error)))?;
            headers.insert(API_KEY_HEADER, value);
        }
    }

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|error| GenerationError::Network(error.to_string()))
}
