//! OpenAI-compatible wire types. Unknown fields are ignored; `maxTokens` and
//! `topP` camelCase aliases are accepted alongside the canonical names.

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "qwen2.5-coder".to_string()
}

fn default_top_p() -> f32 {
    0.95
}

/// A stop parameter may be a single string or an ordered list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopSpec {
    One(String),
    Many(Vec<String>),
}

impl StopSpec {
    /// Appends the client stops after the derived defaults.
    pub fn extend_into(self, stops: &mut Vec<String>) {
        match self {
            StopSpec::One(s) => stops.push(s),
            StopSpec::Many(list) => stops.extend(list),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default, alias = "maxTokens")]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_top_p", alias = "topP")]
    pub top_p: f32,
    #[serde(default)]
    pub stop: Option<StopSpec>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, alias = "maxTokens")]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_top_p", alias = "topP")]
    pub top_p: f32,
    #[serde(default)]
    pub stop: Option<StopSpec>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: usize,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChunkChoice {
    pub index: usize,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_defaults() {
        let req: CompletionRequest = serde_json::from_str(r#"{"prompt": "x ="}"#)
            .expect("minimal request parses");
        assert_eq!(req.model, "qwen2.5-coder");
        assert_eq!(req.max_tokens, None);
        assert_eq!(req.temperature, None);
        assert_eq!(req.top_p, 0.95);
        assert!(!req.stream);
    }

    #[test]
    fn camel_case_aliases_accepted() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"prompt": "x", "maxTokens": 32, "topP": 0.5}"#)
                .expect("aliased request parses");
        assert_eq!(req.max_tokens, Some(32));
        assert_eq!(req.top_p, 0.5);
    }

    #[test]
    fn unknown_fields_ignored() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"prompt": "x", "best_of": 3}"#).expect("extra field ignored");
        assert_eq!(req.prompt, "x");
    }

    #[test]
    fn stop_accepts_string_or_list() {
        let one: CompletionRequest =
            serde_json::from_str(r#"{"prompt": "x", "stop": "\n"}"#).expect("string stop");
        let many: CompletionRequest =
            serde_json::from_str(r#"{"prompt": "x", "stop": ["\n", ";"]}"#).expect("list stop");

        let mut stops = vec!["<|im_end|>".to_string()];
        one.stop.expect("present").extend_into(&mut stops);
        assert_eq!(stops, vec!["<|im_end|>", "\n"]);

        let mut stops = Vec::new();
        many.stop.expect("present").extend_into(&mut stops);
        assert_eq!(stops, vec!["\n", ";"]);
    }

    #[test]
    fn empty_chat_delta_serializes_without_content() {
        let delta = ChatDelta { content: None };
        assert_eq!(serde_json::to_string(&delta).expect("serializes"), "{}");
    }
}
