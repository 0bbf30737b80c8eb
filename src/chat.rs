//! Text chat against the provider's `generateContent` API.
//!
//! The chat panel shares the provider account with the voice session. Two
//! modes are offered: a thinking model with a large reasoning budget, and a
//! fast model grounded in web search.

use std::time::Duration;

use serde_json::{json, Value};

use crate::transport::message::Content;
use crate::ChatError;

/// Default REST base URL.
pub const CHAT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Persona prefixed to every chat prompt.
pub const DEFAULT_SYSTEM_CONTEXT: &str = "\
You are an expert Financial Advisor assistant for the Indian market.
You act as the \"Brain\" of a CRM system called Lumina Wealth.
You have deep knowledge of:
1. Indian Mutual Funds (Equity, Debt, Hybrid, ELSS).
2. Insurance products (Term, Endowment, ULIP, Health).
3. Market regulations (SEBI, IRDAI).
Your goal is to help the advisor brainstorm strategies, analyze client portfolios, and suggest features for this CRM.";

/// Returned when the model answers with no text.
pub const EMPTY_RESPONSE_TEXT: &str = "I couldn't generate a response.";

/// How a query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    /// Deep reasoning with a thinking budget.
    #[default]
    Thinking,
    /// Fast answers grounded in web search.
    Research,
}

/// Chat client settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Provider API key.
    pub api_key: String,
    /// REST base URL, without a trailing slash.
    pub base_url: String,
    /// Model used in [`ChatMode::Thinking`].
    pub thinking_model: String,
    /// Model used in [`ChatMode::Research`].
    pub research_model: String,
    /// Reasoning token budget for the thinking model.
    pub thinking_budget: u32,
    /// Persona prefixed to each prompt.
    pub system_context: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl ChatConfig {
    /// Creates a configuration with default models for the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: CHAT_BASE_URL.to_string(),
            thinking_model: "gemini-3-pro-preview".to_string(),
            research_model: "gemini-2.5-flash".to_string(),
            thinking_budget: 32_768,
            system_context: DEFAULT_SYSTEM_CONTEXT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Reads the API key from `GEMINI_API_KEY` or `API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `MissingApiKey` if neither is set.
    pub fn from_env() -> Result<Self, ChatError> {
        crate::api_key_from_env()
            .map(Self::new)
            .ok_or(ChatError::MissingApiKey)
    }

    /// Returns the model used for a mode.
    pub fn model_for(&self, mode: ChatMode) -> &str {
        match mode {
            ChatMode::Thinking => &self.thinking_model,
            ChatMode::Research => &self.research_model,
        }
    }

    fn url(&self, mode: ChatMode) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model_for(mode),
            self.api_key
        )
    }
}

/// A chat answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Answer text, never empty.
    pub text: String,
    /// Search grounding (sources, queries) in research mode, passed through
    /// as returned by the provider.
    pub grounding_metadata: Option<Value>,
}

/// Async client for text chat.
///
/// # Example
///
/// ```no_run
/// use lumina_voice::chat::{ChatClient, ChatConfig, ChatMode};
///
/// # async fn run() -> Result<(), lumina_voice::ChatError> {
/// let client = ChatClient::new(ChatConfig::from_env()?)?;
/// let reply = client
///     .send_query("Compare ELSS with PPF for a 30 year old", &[], ChatMode::Research)
///     .await?;
/// println!("{}", reply.text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `Http` if the HTTP client cannot be built.
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Returns the client's configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Sends one user query after the given history.
    ///
    /// # Errors
    ///
    /// Returns `Http` on network failure and `Api` for error statuses.
    /// [`ChatError::user_message`] gives the text to show instead.
    pub async fn send_query(
        &self,
        prompt: &str,
        history: &[Content],
        mode: ChatMode,
    ) -> Result<ChatResponse, ChatError> {
        let body = build_request(&self.config, prompt, history, mode);
        let model = self.config.model_for(mode);
        tracing::debug!(model, ?mode, history = history.len(), "sending chat query");

        let resp = self
            .client
            .post(self.config.url(mode))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(&text);
            tracing::error!(status = status.as_u16(), %message, "chat request failed");
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = resp.json().await?;
        Ok(parse_response(&value))
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.config.base_url)
            .field("thinking_model", &self.config.thinking_model)
            .field("research_model", &self.config.research_model)
            .finish_non_exhaustive()
    }
}

/// Builds the `generateContent` request body.
fn build_request(config: &ChatConfig, prompt: &str, history: &[Content], mode: ChatMode) -> Value {
    let full_prompt = format!("{}\n\nUser Query: {prompt}", config.system_context);
    let mut contents: Vec<Content> = history.to_vec();
    contents.push(Content::text(Some("user"), full_prompt));

    let mut body = json!({ "contents": contents });
    match mode {
        ChatMode::Thinking => {
            body["generationConfig"] = json!({
                "thinkingConfig": { "thinkingBudget": config.thinking_budget }
            });
        }
        ChatMode::Research => {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }
    }
    body
}

/// Extracts the answer text and grounding of the first candidate.
fn parse_response(value: &Value) -> ChatResponse {
    let candidate = value.get("candidates").and_then(|c| c.get(0));

    let text = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| serde_json::from_value::<Content>(c.clone()).ok())
        .map(|content| content.joined_text())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| EMPTY_RESPONSE_TEXT.to_string());

    let grounding_metadata = candidate
        .and_then(|c| c.get("groundingMetadata"))
        .filter(|g| !g.is_null())
        .cloned();

    ChatResponse {
        text,
        grounding_metadata,
    }
}

/// Pulls `error.message` out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
