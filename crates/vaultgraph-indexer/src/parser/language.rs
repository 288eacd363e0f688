//! Language detection for source files.

use std::path::Path;

/// Source languages with dedicated extraction patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Go,
    Python,
    TypeScript,
    JavaScript,
    Java,
    C,
    Cpp,
    Ruby,
    Shell,
    Lua,
    Unknown,
}

impl Language {
    /// Identifier stored on `Code` nodes.
    pub fn id(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Shell => "shell",
            Language::Lua => "lua",
            Language::Unknown => "unknown",
        }
    }
}

/// Detect the language of a file based on its extension.
pub fn detect_language(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "rs" => Some(Language::Rust),
        "go" => Some(Language::Go),
        "py" | "pyi" | "pyw" => Some(Language::Python),
        "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
        "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
        "java" => Some(Language::Java),
        "c" | "h" => Some(Language::C),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Some(Language::Cpp),
        "rb" => Some(Language::Ruby),
        "sh" | "bash" | "zsh" => Some(Language::Shell),
        "lua" => Some(Language::Lua),
        _ => None,
    }
}

/// Detect language from the shebang line.
pub fn detect_language_from_content(content: &str) -> Option<Language> {
    let first_line = content.lines().next()?;

    if first_line.starts_with("#!") {
        if first_line.contains("python") {
            return Some(Language::Python);
        }
        if first_line.contains("node") || first_line.contains("deno") || first_line.contains("bun")
        {
            return Some(Language::JavaScript);
        }
        if first_line.contains("ruby") {
            return Some(Language::Ruby);
        }
        if first_line.contains("lua") {
            return Some(Language::Lua);
        }
        if first_line.ends_with("sh") || first_line.contains("bash") {
            return Some(Language::Shell);
        }
    }

    None
}
