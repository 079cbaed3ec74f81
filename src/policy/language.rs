#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Cpp,
    Java,
    Javascript,
    Unknown,
}

impl Language {
    /// Heuristic classification from the trailing context of a snippet.
    ///
    /// Only the last 5 lines are examined, lower-cased, and the rules are
    /// checked in priority order; the first match wins.
    pub fn detect(code: &str) -> Self {
        if code.is_empty() {
            return Language::Unknown;
        }

        let lines: Vec<&str> = code.trim().lines().collect();
        let tail = lines.len().saturating_sub(5);
        let text = lines[tail..].join("\n").to_lowercase();

        let has_python_keyword =
            text.contains("def ") || text.contains("import ") || text.contains("from ");
        if has_python_keyword && (text.contains(':') || text.contains("import ")) {
            return Language::Python;
        }

        if text.contains("#include")
            || text.contains("std::")
            || text.contains("cout")
            || text.contains("using namespace")
        {
            return Language::Cpp;
        }

        if text.contains("public class")
            || text.contains("public static")
            || text.contains("system.out")
            || text.contains("@override")
        {
            return Language::Java;
        }

        if text.contains("const ")
            || text.contains("let ")
            || text.contains("function ")
            || text.contains("=>")
        {
            return Language::Javascript;
        }

        Language::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Unknown => "unknown",
        }
    }
}
