//! Inference engine adapter.
//!
//! The service treats the language model as an opaque engine with a blocking
//! call contract: tokenize, detokenize, and generate. The llama.cpp-backed
//! implementation lives in [`llama`] behind the `llama-backend` feature.

use thiserror::Error;

#[cfg(feature = "llama-backend")]
pub mod llama;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("engine worker error: {0}")]
    Worker(String),
}

/// Sampling parameters for one generation call. Built fresh per request and
/// immutable once constructed.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Ordered stop sequences, defaults first then client additions.
    /// Matching truncates at the first occurrence of any listed string.
    pub stop: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Blocking contract over the loaded model. Implementations must be safe to
/// share across requests; the single-in-flight guarantee is enforced inside
/// the implementation, not by callers.
pub trait InferenceEngine: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<i32>, EngineError>;

    fn detokenize(&self, tokens: &[i32]) -> Result<String, EngineError>;

    fn generate(
        &self,
        prompt: &str,
        suffix: Option<&str>,
        params: &GenerationParams,
    ) -> Result<InferenceResult, EngineError>;
}

/// Bounds the generation length by the remaining context-window room.
/// Only a prompt that itself exceeds the window is an error; a prompt that
/// merely leaves less room than requested shortens the completion instead.
pub(crate) fn clamp_to_context(
    prompt_tokens: usize,
    max_tokens: usize,
    n_ctx: usize,
) -> Result<usize, EngineError> {
    if prompt_tokens > n_ctx {
        return Err(EngineError::Inference(format!(
            "prompt of {prompt_tokens} tokens does not fit the {n_ctx}-token context window"
        )));
    }
    Ok(max_tokens.min(n_ctx - prompt_tokens))
}

/// Truncates `text` at the earliest occurrence of any stop sequence.
/// Returns the (possibly shortened) text and whether a stop fired.
pub(crate) fn truncate_at_stop(text: &str, stops: &[String]) -> (String, bool) {
    let cut = stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min();
    match cut {
        Some(pos) => (text[..pos].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_request_is_clamped_not_rejected() {
        // A prompt that fits still generates, just shorter.
        let room = clamp_to_context(500, 64, 512).expect("prompt fits");
        assert_eq!(room, 12);
    }

    #[test]
    fn request_within_room_is_unchanged() {
        assert_eq!(clamp_to_context(10, 64, 512).expect("fits"), 64);
    }

    #[test]
    fn prompt_filling_the_window_leaves_no_room() {
        assert_eq!(clamp_to_context(512, 64, 512).expect("fits"), 0);
    }

    #[test]
    fn prompt_over_the_window_is_an_error() {
        let err = clamp_to_context(513, 64, 512).expect_err("too long");
        assert!(matches!(err, EngineError::Inference(_)));
    }

    #[test]
    fn earliest_stop_wins() {
        let stops = vec!["\n\n".to_string(), ";".to_string()];
        let (out, hit) = truncate_at_stop("a = 1;\n\nb = 2", &stops);
        assert!(hit);
        assert_eq!(out, "a = 1");
    }

    #[test]
    fn no_stop_passes_through() {
        let stops = vec!["\n".to_string()];
        let (out, hit) = truncate_at_stop("return x", &stops);
        assert!(!hit);
        assert_eq!(out, "return x");
    }

    #[test]
    fn empty_stops_ignored() {
        let stops = vec![String::new()];
        let (out, hit) = truncate_at_stop("abc", &stops);
        assert!(!hit);
        assert_eq!(out, "abc");
    }
}
