use serde::{Deserialize, Serialize};

/// Message in a chat-completions conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Chat-completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new request with model and messages
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat-completions response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

/// Message content of a completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// The first choice's content, if any
    pub fn completion(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// Drafted challenger content for a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDraft {
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub js: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl VariantDraft {
    /// Parse a draft from completion text.
    ///
    /// The prompt asks for JSON; a model that answers with bare markup is
    /// still accepted by treating the whole completion as HTML.
    pub fn from_completion(completion: &str) -> Self {
        if let Ok(parsed) = serde_json::from_str::<VariantDraft>(completion) {
            return parsed;
        }

        Self {
            html: completion.to_string(),
            css: None,
            js: None,
            rationale: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_parses_json_completion() {
        let draft = VariantDraft::from_completion(
            r#"{"html": "<h1>Buy now</h1>", "css": ".cta { color: red }", "rationale": "urgency"}"#,
        );
        assert_eq!(draft.html, "<h1>Buy now</h1>");
        assert_eq!(draft.css.as_deref(), Some(".cta { color: red }"));
        assert!(draft.js.is_none());
    }

    #[test]
    fn draft_falls_back_to_raw_markup() {
        let draft = VariantDraft::from_completion("<section>hello</section>");
        assert_eq!(draft.html, "<section>hello</section>");
        assert!(draft.css.is_none());
    }
}
