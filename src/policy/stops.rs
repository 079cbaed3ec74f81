use super::{CompletionMode, Language};

/// Sentinel markers the model was trained with; always stop on these.
const SPECIAL_STOPS: [&str; 6] = [
    "<|im_end|>",
    "<|im_start|>",
    "<|fim_prefix|>",
    "<|fim_suffix|>",
    "<|fim_middle|>",
    "<|endoftext|>",
];

/// Turn markers for the chat endpoint; chat is free-form so no language or
/// mode derivation applies.
pub fn chat_stops() -> Vec<String> {
    vec!["<|im_end|>".to_string(), "<|im_start|>".to_string()]
}

/// Derives the stop sequences for a completion request. Prevents runaway
/// generation past the current statement (inline) or scope (block).
pub fn stop_sequences(language: Language, mode: CompletionMode) -> Vec<String> {
    let mut stops: Vec<String> = SPECIAL_STOPS.iter().map(|s| s.to_string()).collect();

    match mode {
        CompletionMode::Block => {
            let openers: &[&str] = match language {
                Language::Python => &["\n\n", "\ndef ", "\nclass ", "\n@"],
                Language::Cpp => &["\n\n", "\nint ", "\nvoid ", "\nclass ", "};"],
                Language::Java => &["\n\n", "\npublic ", "\nprivate ", "\nclass ", "};"],
                _ => &["\n\n", "\ndef ", "\nclass "],
            };
            stops.extend(openers.iter().map(|s| s.to_string()));
        }
        CompletionMode::Inline => {
            stops.push("\n".to_string());
            stops.push("\r".to_string());
            if matches!(
                language,
                Language::Cpp | Language::Java | Language::Javascript
            ) {
                stops.push(";".to_string());
                stops.push("{".to_string());
            }
        }
    }

    stops
}
