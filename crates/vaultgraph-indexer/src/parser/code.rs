//! Source code extraction with per-language line patterns.
//!
//! Patterns are anchored to line starts and declaration keywords. Exotic
//! syntax may be missed; that is preferred over false positives.

use super::{compute_hash, detect_language, detect_language_from_content, file_stem};
use super::{CodeMeta, Language};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// A declared construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed line of the declaration
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    /// Graph label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
        }
    }
}

/// A TODO-style comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Todo,
    Fixme,
    Note,
    Hack,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Todo => "TODO",
            MarkerKind::Fixme => "FIXME",
            MarkerKind::Note => "NOTE",
            MarkerKind::Hack => "HACK",
        }
    }
}

struct Patterns {
    functions: Vec<Regex>,
    classes: Vec<Regex>,
    imports: Vec<Regex>,
}

impl Patterns {
    fn new(functions: &[&str], classes: &[&str], imports: &[&str]) -> Self {
        let compile = |ps: &[&str]| ps.iter().map(|p| Regex::new(p).unwrap()).collect();
        Self {
            functions: compile(functions),
            classes: compile(classes),
            imports: compile(imports),
        }
    }
}

static PATTERNS: LazyLock<HashMap<Language, Patterns>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        Language::Rust,
        Patterns::new(
            &[r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern\s+"[^"]*")\s+)*fn\s+([A-Za-z_]\w*)"#],
            &[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union|type)\s+([A-Za-z_]\w*)"],
            &[
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;{]+?)(?:::\{.*)?;",
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;",
                r"^\s*extern\s+crate\s+([A-Za-z_]\w*)",
            ],
        ),
    );
    m.insert(
        Language::Go,
        Patterns::new(
            &[r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)"],
            &[r"^\s*type\s+([A-Za-z_]\w*)\s+(?:struct|interface)\b"],
            &[r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#],
        ),
    );
    m.insert(
        Language::Python,
        Patterns::new(
            &[r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"],
            &[r"^\s*class\s+([A-Za-z_]\w*)"],
            &[
                r"^\s*import\s+([\w.]+)",
                r"^\s*from\s+([\w.]+)\s+import\b",
            ],
        ),
    );
    let js_functions = [
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
    ];
    let js_imports = [
        r#"^\s*import\s+(?:[^'"]*\s+from\s+)?['"]([^'"]+)['"]"#,
        r#"^\s*(?:const|let|var)\s+.*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
    ];
    m.insert(
        Language::TypeScript,
        Patterns::new(
            &js_functions,
            &[
                r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+([A-Za-z_$][\w$]*)",
                r"^\s*(?:export\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^=]*>)?\s*=",
            ],
            &js_imports,
        ),
    );
    m.insert(
        Language::JavaScript,
        Patterns::new(
            &js_functions,
            &[r"^\s*(?:export\s+)?(?:default\s+)?class\s+([A-Za-z_$][\w$]*)"],
            &js_imports,
        ),
    );
    m.insert(
        Language::Java,
        Patterns::new(
            &[r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|native)\s+)+(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+([a-zA-Z_]\w*)\s*\("],
            &[r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)"],
            &[r"^\s*import\s+(?:static\s+)?([\w.*]+)\s*;"],
        ),
    );
    let c_functions = [
        r"^(?:static\s+|inline\s+|extern\s+)*[A-Za-z_][\w:<>]*(?:\s*[*&]+\s*|\s+)([A-Za-z_][\w:~]*)\s*\([^;]*$",
    ];
    let c_imports = [r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#];
    m.insert(
        Language::C,
        Patterns::new(
            &c_functions,
            &[r"^\s*(?:typedef\s+)?(?:struct|enum|union)\s+([A-Za-z_]\w*)\s*\{?\s*$"],
            &c_imports,
        ),
    );
    m.insert(
        Language::Cpp,
        Patterns::new(
            &c_functions,
            &[r"^\s*(?:template\s*<[^>]*>\s*)?(?:typedef\s+)?(?:class|struct|enum(?:\s+class)?|union)\s+([A-Za-z_]\w*)(?:\s*[:{]|\s*$)"],
            &c_imports,
        ),
    );
    m.insert(
        Language::Ruby,
        Patterns::new(
            &[r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!=]?)"],
            &[r"^\s*(?:class|module)\s+([A-Z]\w*(?:::\w+)*)"],
            &[r#"^\s*require(?:_relative)?\s*\(?\s*['"]([^'"]+)['"]"#],
        ),
    );
    m.insert(
        Language::Shell,
        Patterns::new(
            &[
                r"^\s*function\s+([A-Za-z_][\w-]*)",
                r"^\s*([A-Za-z_][\w-]*)\s*\(\)\s*\{?",
            ],
            &[],
            &[r"^\s*(?:source|\.)\s+(\S+)"],
        ),
    );
    m.insert(
        Language::Lua,
        Patterns::new(
            &[r"^\s*(?:local\s+)?function\s+([\w.:]+)"],
            &[],
            &[r#"require\s*\(?\s*['"]([^'"]+)['"]"#],
        ),
    );
    m
});

// Comment leader followed by a marker word, e.g. "// TODO: x", "# FIXME x"
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?://+|#+|--|/\*+|^\s*\*)\s*(TODO|FIXME|NOTE|HACK)\b[:(]?\)?\s*(.*)").unwrap()
});

// Lines inside a Go `import ( ... )` block
static GO_BLOCK_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

// Control-flow keywords the C function pattern would otherwise catch.
const C_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "else"];

/// Parse a source file. Never fails: unrecognised languages yield no symbols.
pub fn parse_code(path: &Path, content: &str) -> CodeMeta {
    let language = detect_language(path)
        .or_else(|| detect_language_from_content(content))
        .unwrap_or(Language::Unknown);

    let mut functions: Vec<Symbol> = Vec::new();
    let mut classes: Vec<Symbol> = Vec::new();
    let mut imports: Vec<String> = Vec::new();
    let mut markers = Vec::new();
    let mut in_go_imports = false;

    let patterns = PATTERNS.get(&language);

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(cap) = MARKER_RE.captures(line) {
            let kind = match &cap[1] {
                "TODO" => MarkerKind::Todo,
                "FIXME" => MarkerKind::Fixme,
                "NOTE" => MarkerKind::Note,
                _ => MarkerKind::Hack,
            };
            markers.push(Marker {
                kind,
                line: line_no,
                text: cap[2].trim().trim_end_matches("*/").trim().to_string(),
            });
        }

        let Some(patterns) = patterns else {
            continue;
        };

        if language == Language::Go {
            let trimmed = line.trim();
            if trimmed.starts_with("import (") {
                in_go_imports = true;
                continue;
            }
            if in_go_imports {
                if trimmed.starts_with(')') {
                    in_go_imports = false;
                } else if let Some(cap) = GO_BLOCK_IMPORT_RE.captures(line) {
                    push_import(&mut imports, &cap[1]);
                }
                continue;
            }
        }

        if let Some(name) = first_capture(&patterns.functions, line) {
            let is_keyword = matches!(language, Language::C | Language::Cpp)
                && C_KEYWORDS.contains(&name.as_str());
            if !is_keyword {
                push_symbol(&mut functions, name, SymbolKind::Function, line_no);
            }
            continue;
        }

        if let Some(name) = first_capture(&patterns.classes, line) {
            push_symbol(&mut classes, name, SymbolKind::Class, line_no);
            continue;
        }

        if let Some(target) = first_capture(&patterns.imports, line) {
            push_import(&mut imports, &target);
        }
    }

    CodeMeta {
        path: path.to_path_buf(),
        name: file_stem(path),
        language,
        functions,
        classes,
        imports,
        markers,
        line_count: content.lines().count(),
        hash: compute_hash(content),
    }
}

fn first_capture(patterns: &[Regex], line: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(line))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
}

// A name declared twice (overloads, methods on different types) is one symbol
// per file; the first declaration wins.
fn push_symbol(symbols: &mut Vec<Symbol>, name: String, kind: SymbolKind, line: usize) {
    if !symbols.iter().any(|s| s.name == name) {
        symbols.push(Symbol { name, kind, line });
    }
}

fn push_import(imports: &mut Vec<String>, target: &str) {
    let target = target.trim();
    if !target.is_empty() && !imports.iter().any(|i| i == target) {
        imports.push(target.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[Symbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_parse_go_file() {
        let code = r#"package main

import (
	"fmt"
	str "strings"
)

import "os"

// Config holds settings.
type Config struct {
	Name string
}

type Runner interface {
	Run() error
}

func main() {
	fmt.Println("Hello")
}

func (c *Config) helper() string {
	// TODO: handle empty name
	return strings.ToUpper(c.Name)
}
"#;
        let meta = parse_code(Path::new("/src/main.go"), code);
        assert_eq!(meta.language, Language::Go);
        assert_eq!(names(&meta.functions), vec!["main", "helper"]);
        assert_eq!(names(&meta.classes), vec!["Config", "Runner"]);
        assert_eq!(meta.imports, vec!["fmt", "strings", "os"]);
        assert_eq!(meta.markers.len(), 1);
        assert_eq!(meta.markers[0].kind, MarkerKind::Todo);
        assert_eq!(meta.markers[0].line, 24);
        assert_eq!(meta.markers[0].text, "handle empty name");
        assert_eq!(meta.functions[0].line, 19);
    }

    #[test]
    fn test_parse_rust_file() {
        let code = r#"use std::collections::HashMap;
use crate::{a, b};
mod config;

pub struct Point {
    x: f64,
}

pub(crate) enum Shape { Circle }

pub trait Draw {}

pub async fn load() {}

impl Point {
    pub const fn origin() -> Self { todo!() }
}
"#;
        let meta = parse_code(Path::new("lib.rs"), code);
        assert_eq!(names(&meta.functions), vec!["load", "origin"]);
        assert_eq!(names(&meta.classes), vec!["Point", "Shape", "Draw"]);
        assert_eq!(meta.imports, vec!["std::collections::HashMap", "crate", "config"]);
    }

    #[test]
    fn test_parse_python_file() {
        let code = "import os\nfrom typing import List\n\nclass Greeter:\n    def greet(self, name):\n        pass  # FIXME escape name\n\nasync def main():\n    pass\n";
        let meta = parse_code(Path::new("app.py"), code);
        assert_eq!(names(&meta.functions), vec!["greet", "main"]);
        assert_eq!(names(&meta.classes), vec!["Greeter"]);
        assert_eq!(meta.imports, vec!["os", "typing"]);
        assert_eq!(meta.markers[0].kind, MarkerKind::Fixme);
        assert_eq!(meta.markers[0].text, "escape name");
    }

    #[test]
    fn test_parse_typescript_file() {
        let code = "import { x } from './x';\nexport interface Props {}\nexport type Id = string;\nexport const handler = async (req) => {};\nexport default function App() {}\nclass Store {}\n";
        let meta = parse_code(Path::new("app.tsx"), code);
        assert_eq!(names(&meta.functions), vec!["handler", "App"]);
        assert_eq!(names(&meta.classes), vec!["Props", "Id", "Store"]);
        assert_eq!(meta.imports, vec!["./x"]);
    }

    #[test]
    fn test_c_control_flow_not_functions() {
        let code = "#include <stdio.h>\n\nstruct node {\n  int v;\n};\n\nint main(int argc, char **argv)\n{\n  if (argc > 1)\n    return 1;\n}\nvoid helper(void);\n";
        let meta = parse_code(Path::new("main.c"), code);
        assert_eq!(names(&meta.functions), vec!["main"]);
        assert_eq!(names(&meta.classes), vec!["node"]);
        assert_eq!(meta.imports, vec!["stdio.h"]);
    }

    #[test]
    fn test_unknown_language_still_collects_markers() {
        let meta = parse_code(Path::new("build.zig"), "// NOTE: experimental\nfn x() {}\n");
        assert_eq!(meta.language, Language::Unknown);
        assert!(meta.functions.is_empty());
        assert_eq!(meta.markers.len(), 1);
        assert_eq!(meta.markers[0].kind, MarkerKind::Note);
    }

    #[test]
    fn test_shebang_detection() {
        let meta = parse_code(Path::new("bin/tool"), "#!/usr/bin/env python3\ndef run():\n    pass\n");
        assert_eq!(meta.language, Language::Python);
        assert_eq!(names(&meta.functions), vec!["run"]);
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let code = "def run():\n    pass\n\ndef run():\n    pass\n";
        let meta = parse_code(Path::new("x.py"), code);
        assert_eq!(meta.functions.len(), 1);
        assert_eq!(meta.functions[0].line, 1);
    }
}
