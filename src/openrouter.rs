//! OpenRouter chat-completions client used for field completion.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

const COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Speaker of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Sampling and routing knobs sent with every request.
#[derive(Debug, Clone)]
struct CompletionSettings {
    model: String,
    max_tokens: u32,
    temperature: f32,
    /// Providers to pin; fallback routing is disabled when set.
    providers: Vec<String>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            providers: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    settings: CompletionSettings,
}

impl OpenRouterClient {
    /// Reads `OPENROUTER_API_KEY`. `LSI_LLM_MODEL` overrides the model.
    pub fn from_env() -> Result<Self> {
        let key = env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY is not set")?;
        let mut client = Self::new(key)?;
        if let Some(model) = env::var("LSI_LLM_MODEL").ok().filter(|m| !m.trim().is_empty()) {
            client = client.with_model(model.trim());
        }
        Ok(client)
    }

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            settings: CompletionSettings::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.settings.max_tokens = max_tokens;
        self
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.settings.providers = providers;
        self
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Text of the first choice, empty when the model returned none.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let body = self.body(&messages, false);
        let reply = self.post(&body).await?;
        Ok(first_choice_text(&reply))
    }

    /// Like [`chat`](Self::chat) with `json_object` output, decoded into `T`.
    pub async fn chat_json<T: for<'de> Deserialize<'de>>(&self, messages: Vec<Message>) -> Result<T> {
        let body = self.body(&messages, true);
        let reply = self.post(&body).await?;
        crate::completion::parse_llm_json(&first_choice_text(&reply))
    }

    fn body(&self, messages: &[Message], json_output: bool) -> Value {
        let s = &self.settings;
        let mut body = json!({
            "model": s.model,
            "messages": messages,
            "max_tokens": s.max_tokens,
            "temperature": s.temperature,
        });
        if json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if !s.providers.is_empty() {
            body["provider"] = json!({ "only": s.providers, "allow_fallbacks": false });
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<Value> {
        debug!("OpenRouter request, model {}", self.settings.model);
        let response = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("OpenRouter request did not complete")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("OpenRouter rate limited the request");
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter returned {}: {}", status, detail);
        }

        let reply: Value = response.json().await.context("OpenRouter reply was not JSON")?;
        if let Some(total) = reply.pointer("/usage/total_tokens").and_then(Value::as_u64) {
            info!("OpenRouter used {} tokens on {}", total, self.settings.model);
        }
        Ok(reply)
    }
}

fn first_choice_text(reply: &Value) -> String {
    reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_with_json_output_and_pinned_provider() {
        let client = OpenRouterClient::new("key")
            .unwrap()
            .with_model("m")
            .with_providers(vec!["Google".into()]);
        let body = client.body(&[Message::user("hi")], true);
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["provider"]["allow_fallbacks"], false);
    }

    #[test]
    fn test_plain_body_has_no_routing() {
        let client = OpenRouterClient::new("key").unwrap();
        let body = client.body(&[Message::system("s")], false);
        assert!(body.get("provider").is_none());
        assert!(body.get("response_format").is_none());
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_first_choice_text() {
        let reply = json!({"choices": [{"message": {"content": "ok"}}]});
        assert_eq!(first_choice_text(&reply), "ok");
        assert_eq!(first_choice_text(&json!({"choices": []})), "");
    }
}
