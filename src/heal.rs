//! Token healing for the prompt boundary.
//!
//! Sub-word tokenizers can drop a trailing partial token when a prompt is cut
//! mid-word or mid-UTF-8 sequence. Re-encoding and decoding the prompt
//! detects the loss: the decoded text comes back strictly shorter. The caller
//! feeds the healed (shorter) prompt to the engine and prepends the lost
//! suffix verbatim to the generated text, so the client-visible concatenation
//! of prompt and completion never silently drops characters.

use crate::engine::InferenceEngine;

/// Returns `(healed_prompt, lost_text)`.
///
/// Any tokenizer failure, or a decode that is not a prefix of the original,
/// degrades to a no-op: the prompt is returned unchanged with empty lost
/// text. This is never surfaced as an error.
pub fn heal_prompt(engine: &dyn InferenceEngine, prompt: &str) -> (String, String) {
    let Ok(tokens) = engine.tokenize(prompt) else {
        return (prompt.to_string(), String::new());
    };
    if tokens.is_empty() {
        return (prompt.to_string(), String::new());
    }
    let Ok(decoded) = engine.detokenize(&tokens) else {
        return (prompt.to_string(), String::new());
    };

    if decoded.len() < prompt.len() && prompt.starts_with(&decoded) {
        let lost = prompt[decoded.len()..].to_string();
        return (decoded, lost);
    }
    (prompt.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, GenerationParams, InferenceResult};

    /// Byte-level tokenizer that drops the last `drop` bytes on decode.
    struct LossyTokenizer {
        drop: usize,
        fail: bool,
    }

    impl InferenceEngine for LossyTokenizer {
        fn tokenize(&self, text: &str) -> Result<Vec<i32>, EngineError> {
            if self.fail {
                return Err(EngineError::Tokenization("boom".into()));
            }
            Ok(text.bytes().map(i32::from).collect())
        }

        fn detokenize(&self, tokens: &[i32]) -> Result<String, EngineError> {
            let end = tokens.len().saturating_sub(self.drop);
            let bytes: Vec<u8> = tokens[..end].iter().map(|&t| t as u8).collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }

        fn generate(
            &self,
            _prompt: &str,
            _suffix: Option<&str>,
            _params: &GenerationParams,
        ) -> Result<InferenceResult, EngineError> {
            unreachable!("healing never generates")
        }
    }

    #[test]
    fn aligned_prompt_is_untouched() {
        let engine = LossyTokenizer { drop: 0, fail: false };
        let (healed, lost) = heal_prompt(&engine, "import pandas as");
        assert_eq!(healed, "import pandas as");
        assert_eq!(lost, "");
    }

    #[test]
    fn dropped_suffix_is_recovered() {
        let engine = LossyTokenizer { drop: 2, fail: false };
        let (healed, lost) = heal_prompt(&engine, "import pandas as");
        assert_eq!(healed, "import pandas ");
        assert_eq!(lost, "as");
        assert_eq!(format!("{healed}{lost}"), "import pandas as");
    }

    #[test]
    fn tokenizer_failure_is_a_noop() {
        let engine = LossyTokenizer { drop: 2, fail: true };
        let (healed, lost) = heal_prompt(&engine, "let x =");
        assert_eq!(healed, "let x =");
        assert_eq!(lost, "");
    }

    #[test]
    fn empty_prompt_is_a_noop() {
        let engine = LossyTokenizer { drop: 0, fail: false };
        let (healed, lost) = heal_prompt(&engine, "");
        assert_eq!(healed, "");
        assert_eq!(lost, "");
    }
}
