use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("empty response from server")]
    EmptyResponse,

    #[error("could not deserialize response: {0}")]
    UnexpectedFormat(String),
}

impl ChatError {
    /// Text shown in the transcript in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::UnexpectedFormat(_) => "API returned unexpected format".to_string(),
            other => {
                let text = other.to_string();
                let short: String = text.chars().take(MAX_ERROR_CHARS).collect();
                format!("Error: {}", short)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Sampling parameters sent with every prompt.
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// A text-in, text-out language model endpoint.
pub trait ChatClient: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ChatError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
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
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the hosted `generateContent` REST endpoint.
pub struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        generation: GenerationConfig,
    ) -> Result<Self, ChatError> {
        if api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.trim().to_string(),
            generation,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl ChatClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let body = request_body(prompt, self.generation);
        debug!(model = %self.model, chars = prompt.len(), "sending chat prompt");

        let response = self
            .agent
            .post(&self.url())
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", &self.api_key)
            .send_string(&body);

        let text = match response {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| ChatError::Transport(e.to_string()))?,
            Err(ureq::Error::Status(code, resp)) => {
                let raw = resp.into_string().unwrap_or_default();
                let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                    .map(|env| env.error.message)
                    .unwrap_or(raw);
                warn!(code, "chat request rejected: {}", message);
                return Err(ChatError::Status { code, message });
            }
            Err(err) => {
                warn!("chat request failed: {}", err);
                return Err(ChatError::Transport(err.to_string()));
            }
        };

        parse_response(&text).map(|reply| clean_response(&reply))
    }
}

fn request_body(prompt: &str, generation: GenerationConfig) -> String {
    let request = GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        }],
        generation_config: generation,
    };
    // Plain strings and numbers always serialize.
    serde_json::to_string(&request).unwrap_or_default()
}

fn parse_response(body: &str) -> Result<String, ChatError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ChatError::UnexpectedFormat(e.to_string()))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ChatError::EmptyResponse);
    }
    Ok(text)
}

/// Strips bold markers and surrounding whitespace from a model reply.
pub fn clean_response(text: &str) -> String {
    text.replace("**", "").trim().to_string()
}

/// Light markdown-to-plain-text pass for transcript display.
pub fn format_for_display(text: &str) -> String {
    text.replace("**", "")
        .replace("* ", "• ")
        .replace('\n', "\n   ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Default, Clone)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Records a prompt; blank input is ignored and returns `None`.
    pub fn push_prompt(&mut self, prompt: &str) -> Option<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return None;
        }
        self.messages.push(ChatMessage {
            speaker: Speaker::User,
            text: format_for_display(&format!("You: {}", prompt)),
        });
        Some(prompt.to_string())
    }

    pub fn push_reply(&mut self, reply: Result<String, ChatError>) {
        let message = match reply {
            Ok(text) => ChatMessage {
                speaker: Speaker::Assistant,
                text: format_for_display(&format!("AI: {}", text)),
            },
            Err(err) => ChatMessage {
                speaker: Speaker::Error,
                text: err.user_message(),
            },
        };
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_prompt_and_sampling() {
        let body = request_body("hello", GenerationConfig::default());
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(v["generationConfig"]["topK"], 40);
        let top_p = v["generationConfig"]["topP"].as_f64().unwrap();
        assert!((top_p - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parse_joins_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi "},{"text":"there"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Hi there");
    }

    #[test]
    fn parse_without_text_is_empty_response() {
        let body = r#"{"candidates":[]}"#;
        assert!(matches!(parse_response(body), Err(ChatError::EmptyResponse)));
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert!(matches!(parse_response(body), Err(ChatError::EmptyResponse)));
    }

    #[test]
    fn malformed_body_is_unexpected_format() {
        let err = parse_response("<html>").unwrap_err();
        assert!(matches!(err, ChatError::UnexpectedFormat(_)));
        assert_eq!(err.user_message(), "API returned unexpected format");
    }

    #[test]
    fn long_errors_are_truncated_for_display() {
        let err = ChatError::Transport("x".repeat(500));
        let msg = err.user_message();
        assert!(msg.starts_with("Error: request failed: "));
        assert_eq!(msg.chars().count(), "Error: ".len() + 100);
    }

    #[test]
    fn replies_are_cleaned_and_formatted() {
        assert_eq!(clean_response("  **Bold** answer \n"), "Bold answer");
        assert_eq!(
            format_for_display("List:\n* one\n* two"),
            "List:\n   • one\n   • two"
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = GeminiClient::new(DEFAULT_ENDPOINT, DEFAULT_MODEL, "  ", GenerationConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::MissingApiKey));
    }

    #[test]
    fn client_builds_model_url() {
        let client = GeminiClient::new(
            "https://example.test/v1beta/",
            "gemini-1.5-flash",
            "key",
            GenerationConfig::default(),
        )
        .unwrap();
        assert_eq!(
            client.url(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn transcript_tracks_prompts_and_replies() {
        let mut t = ChatTranscript::default();
        assert_eq!(t.push_prompt("   "), None);
        assert_eq!(t.push_prompt(" hi ").as_deref(), Some("hi"));
        t.push_reply(Ok("hello".into()));
        t.push_reply(Err(ChatError::EmptyResponse));

        let speakers: Vec<Speaker> = t.messages().iter().map(|m| m.speaker).collect();
        assert_eq!(speakers, vec![Speaker::User, Speaker::Assistant, Speaker::Error]);
        assert_eq!(t.messages()[0].text, "You: hi");
        assert_eq!(t.messages()[1].text, "AI: hello");
        assert_eq!(t.messages()[2].text, "Error: empty response from server");
    }

    #[test]
    fn prompts_and_replies_share_display_formatting() {
        let mut t = ChatTranscript::default();
        let sent = t.push_prompt("make it **pop**\n* warmer").unwrap();
        assert_eq!(sent, "make it **pop**\n* warmer");
        t.push_reply(Ok("sure **thing**\n* done".into()));

        assert_eq!(t.messages()[0].text, "You: make it pop\n   • warmer");
        assert_eq!(t.messages()[1].text, "AI: sure thing\n   • done");
    }
}
