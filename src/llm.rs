//! Chat-completion client for flashcard extraction
//!
//! Thin wrapper around an OpenRouter-compatible completion endpoint. Builds a
//! system + user message payload, POSTs it, and validates the model's reply
//! into a list of front/back pairs. Retryable failures (network, 5xx, 429)
//! back off exponentially; deterministic failures (4xx, malformed replies)
//! surface immediately.

use crate::config::LlmConfig;
use serde::Deserialize;
use std::time::Duration;

/// Instruction appended to every system message so the model replies with
/// machine-readable output.
const JSON_FORMAT_INSTRUCTION: &str = "IMPORTANT: You must respond ONLY with a valid JSON object \
in the exact format: { \"flashcards\": [{ \"front\": \"question\", \"back\": \"answer\" }] }. \
Do not include any other text or explanation.";

/// A front/back pair proposed by the model
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProposedCard {
    pub front: String,
    pub back: String,
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Partial model-config override; `None` fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Error type for completion requests
#[derive(Debug)]
pub enum LlmError {
    /// Missing or invalid client configuration
    Config(String),
    /// Transport-level failure
    Network(reqwest::Error),
    /// Endpoint answered with a non-2xx status
    Status { status: u16, body: String },
    /// Reply did not match the expected shape
    Format(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Config(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::Network(e) => write!(f, "LLM request failed: {}", e),
            LlmError::Status { status, body } => {
                write!(f, "LLM endpoint returned HTTP {}: {}", status, body)
            }
            LlmError::Format(msg) => write!(f, "Invalid response format from AI: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e)
    }
}

impl LlmError {
    /// Whether retrying could plausibly succeed. A malformed reply or a 4xx
    /// is deterministic; backing off on it only burns tokens.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) => true,
            LlmError::Status { status, .. } => *status >= 500 || *status == 429,
            LlmError::Config(_) | LlmError::Format(_) => false,
        }
    }

    /// Short stable code stored in generation error logs
    pub fn code(&self) -> String {
        match self {
            LlmError::Config(_) => "config".to_string(),
            LlmError::Network(_) => "network".to_string(),
            LlmError::Status { status, .. } => format!("http_{}", status),
            LlmError::Format(_) => "format".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Completion endpoint client
#[derive(Debug)]
pub struct LlmClient {
    api_key: String,
    endpoint: String,
    system_message: String,
    user_message: String,
    model_config: ModelConfig,
    retries: u32,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    /// Build a client from config. Fails if the API key or endpoint is missing.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("API key is required".to_string()));
        }
        if config.endpoint.trim().is_empty() {
            return Err(LlmError::Config("API endpoint is required".to_string()));
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            system_message: "You are an AI assistant specialized in chatting.".to_string(),
            user_message: String::new(),
            model_config: ModelConfig {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            retries: config.retries.max(1),
            http: reqwest::blocking::Client::new(),
        })
    }

    pub fn set_system_message(&mut self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(LlmError::Config("System message cannot be empty".to_string()));
        }
        self.system_message = message.to_string();
        Ok(())
    }

    pub fn set_user_message(&mut self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(LlmError::Config("User message cannot be empty".to_string()));
        }
        self.user_message = message.to_string();
        Ok(())
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    /// Merge partial overrides into the current model config
    pub fn merge_model_config(&mut self, overrides: ModelOverrides) {
        if let Some(model) = overrides.model {
            self.model_config.model = model;
        }
        if let Some(temperature) = overrides.temperature {
            self.model_config.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            self.model_config.max_tokens = max_tokens;
        }
    }

    fn build_payload(&self) -> Result<serde_json::Value> {
        if self.user_message.is_empty() {
            return Err(LlmError::Config(
                "User message must be set before sending a request".to_string(),
            ));
        }

        Ok(serde_json::json!({
            "messages": [
                {
                    "role": "system",
                    "content": format!("{}\n{}", self.system_message, JSON_FORMAT_INSTRUCTION),
                },
                {
                    "role": "user",
                    "content": self.user_message,
                },
            ],
            "model": self.model_config.model,
            "temperature": self.model_config.temperature,
            "max_tokens": self.model_config.max_tokens,
        }))
    }

    /// Send the configured request, retrying retryable failures with
    /// 2^attempt-second backoff. The last error is surfaced once attempts
    /// are exhausted.
    pub fn send_request(&self) -> Result<Vec<ProposedCard>> {
        let payload = self.build_payload()?;

        let mut attempt: u32 = 0;
        loop {
            match self.execute(&payload) {
                Ok(cards) => return Ok(cards),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retries || !e.is_retryable() {
                        return Err(e);
                    }
                    std::thread::sleep(Duration::from_secs(2u64.pow(attempt)));
                }
            }
        }
    }

    fn execute(&self, payload: &serde_json::Value) -> Result<Vec<ProposedCard>> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "cardbox")
            .json(payload)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Format(format!("unexpected completion shape: {}", e)))?;

        let choice = completion
            .choices
            .first()
            .ok_or_else(|| LlmError::Format("completion has no choices".to_string()))?;

        parse_flashcards(&choice.message.content)
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct FlashcardsEnvelope {
    flashcards: Vec<ProposedCard>,
}

/// Parse the inner message content into flashcards. Models sometimes wrap the
/// JSON in a markdown fence or preamble text, so the object is extracted by
/// brace matching before parsing.
pub fn parse_flashcards(content: &str) -> Result<Vec<ProposedCard>> {
    let json_str = extract_json_object(content)
        .ok_or_else(|| LlmError::Format("no JSON object in model reply".to_string()))?;

    let envelope: FlashcardsEnvelope = serde_json::from_str(json_str)
        .map_err(|e| LlmError::Format(format!("reply is not a flashcards object: {}", e)))?;

    if envelope.flashcards.is_empty() {
        return Err(LlmError::Format("flashcards array is empty".to_string()));
    }

    for card in &envelope.flashcards {
        if card.front.trim().is_empty() || card.back.trim().is_empty() {
            return Err(LlmError::Format("flashcard with blank front or back".to_string()));
        }
    }

    Ok(envelope.flashcards)
}

/// Extract the outermost JSON object substring from raw LLM output
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}
