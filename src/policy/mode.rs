#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Short same-line suggestion.
    Inline,
    /// Multi-line structural continuation (function/class body etc.).
    Block,
}

impl CompletionMode {
    /// Classifies a prompt by its trailing syntax.
    ///
    /// Comment-only lines (`// ...`) are ignored. Block mode applies when the
    /// last surviving line opens a scope (`:` or `{`) or when the prompt ends
    /// with a newline, i.e. the cursor sits on a fresh line.
    pub fn classify(prompt: &str) -> Self {
        let last_line = prompt
            .lines()
            .filter(|line| !line.trim_start().starts_with("// "))
            .next_back()
            .map(str::trim)
            .unwrap_or("");

        let opens_scope = last_line.ends_with(':') || last_line.ends_with('{');
        if opens_scope || prompt.ends_with('\n') {
            CompletionMode::Block
        } else {
            CompletionMode::Inline
        }
    }

    pub fn default_max_tokens(self) -> usize {
        match self {
            CompletionMode::Block => 16,
            CompletionMode::Inline => 8,
        }
    }

    pub fn default_temperature(self) -> f32 {
        match self {
            CompletionMode::Block => 0.1,
            CompletionMode::Inline => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompletionMode::Block => "BLOCK",
            CompletionMode::Inline => "INLINE",
        }
    }
}
