//! Prose note extraction: front matter, tags, wikilinks, embeds, title.

use super::{compute_hash, file_stem, NoteMeta};
use crate::IndexerError;
use regex::Regex;
use serde_yaml::Value;
use std::path::Path;
use std::sync::LazyLock;

// [[target]], [[target|alias]], [[target#heading]] and the ![[...]] embed form
static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[\[([^\]|#\n]+)(?:#[^\]|\n]*)?(?:\|[^\]\n]*)?\]\]").unwrap()
});

// Inline #tag: must follow start of line or whitespace and start with a letter,
// so headings ("# Title") and issue numbers ("#42") are not tags.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([A-Za-z][\w/-]*)").unwrap());

struct FrontMatter<'a> {
    fields: Option<serde_yaml::Mapping>,
    body: &'a str,
}

/// Parse a prose note.
pub fn parse_prose(path: &Path, content: &str) -> Result<NoteMeta, IndexerError> {
    let fm = split_frontmatter(content).map_err(|message| IndexerError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    let mut tags = Vec::new();
    let mut title = None;

    if let Some(fields) = &fm.fields {
        for key in ["tags", "tag"] {
            if let Some(value) = fields.get(key) {
                collect_frontmatter_tags(value, &mut tags);
            }
        }
        title = fields
            .get("title")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    let mut links = Vec::new();
    let mut embeds = Vec::new();
    let mut in_fence = false;

    for line in fm.body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        for cap in WIKILINK_RE.captures_iter(line) {
            let target = cap[2].trim();
            if target.is_empty() {
                continue;
            }
            if &cap[1] == "!" {
                push_unique(&mut embeds, target);
            } else {
                push_unique(&mut links, target);
            }
        }

        // Strip links first so "[[a#b]]" does not yield a tag.
        let without_links = WIKILINK_RE.replace_all(line, " ");
        for cap in TAG_RE.captures_iter(&without_links) {
            push_unique(&mut tags, cap[1].trim_end_matches('/'));
        }
    }

    let name = file_stem(path);

    Ok(NoteMeta {
        path: path.to_path_buf(),
        title: title.unwrap_or_else(|| name.clone()),
        name,
        tags,
        links,
        embeds,
        hash: compute_hash(content),
    })
}

/// Split a leading `---` delimited YAML block from the body.
///
/// A block without a closing delimiter is treated as body text.
/// Malformed YAML inside a closed block is an error.
fn split_frontmatter(content: &str) -> Result<FrontMatter<'_>, String> {
    let no_fm = FrontMatter {
        fields: None,
        body: content,
    };

    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return Ok(no_fm),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let fields = if yaml.trim().is_empty() {
                serde_yaml::Mapping::new()
            } else {
                match serde_yaml::from_str::<Value>(yaml) {
                    Ok(Value::Mapping(map)) => map,
                    Ok(Value::Null) => serde_yaml::Mapping::new(),
                    Ok(_) => return Err("front matter is not a key/value block".to_string()),
                    Err(e) => return Err(format!("invalid front matter: {}", e)),
                }
            };
            return Ok(FrontMatter {
                fields: Some(fields),
                body,
            });
        }
        offset += line.len();
    }

    Ok(no_fm)
}

fn collect_frontmatter_tags(value: &Value, tags: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for tag in s.split([',', ' ']) {
                push_tag(tags, tag);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                match item {
                    Value::String(s) => push_tag(tags, s),
                    Value::Number(n) => push_tag(tags, &n.to_string()),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = raw.trim().trim_start_matches('#');
    if !tag.is_empty() {
        push_unique(tags, tag);
    }
}

fn push_unique(items: &mut Vec<String>, value: &str) {
    if !items.iter().any(|existing| existing == value) {
        items.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> NoteMeta {
        parse_prose(Path::new("/vault/Some Note.md"), content).unwrap()
    }

    #[test]
    fn test_title_falls_back_to_filename() {
        let note = parse("just text");
        assert_eq!(note.title, "Some Note");
        assert_eq!(note.name, "Some Note");
    }

    #[test]
    fn test_frontmatter_title_and_tags() {
        let note = parse("---\ntitle: Real Title\ntags: [x, y]\n---\nbody #z and #x\n");
        assert_eq!(note.title, "Real Title");
        assert_eq!(note.tags, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_frontmatter_tag_string_forms() {
        let note = parse("---\ntags: \"#alpha, beta\"\n---\n");
        assert_eq!(note.tags, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_tags_case_sensitive_and_deduplicated() {
        let note = parse("#Rust #rust #Rust #nested/tag");
        assert_eq!(note.tags, vec!["Rust", "rust", "nested/tag"]);
    }

    #[test]
    fn test_headings_and_numbers_are_not_tags() {
        let note = parse("# Heading\n## Sub\nissue #42\ncolor:#fff");
        assert!(note.tags.is_empty(), "got {:?}", note.tags);
    }

    #[test]
    fn test_wikilinks_alias_ignored() {
        let note = parse("see [[B]] and [[C|the c note]] and [[B]] and [[D#Section]]");
        assert_eq!(note.links, vec!["B", "C", "D"]);
        assert!(note.embeds.is_empty());
    }

    #[test]
    fn test_embeds_kept_separate() {
        let note = parse("![[diagram.png]] then [[Other]] and ![[Quoted Note]]");
        assert_eq!(note.embeds, vec!["diagram.png", "Quoted Note"]);
        assert_eq!(note.links, vec!["Other"]);
    }

    #[test]
    fn test_code_fences_skipped() {
        let note = parse("```\n[[NotALink]] #notatag\n```\n[[Real]]");
        assert_eq!(note.links, vec!["Real"]);
        assert!(note.tags.is_empty());
    }

    #[test]
    fn test_unclosed_frontmatter_is_body() {
        let note = parse("---\ntitle: x\n[[Link]]");
        assert_eq!(note.links, vec!["Link"]);
        assert_eq!(note.title, "Some Note");
    }

    #[test]
    fn test_malformed_frontmatter_is_error() {
        let result = parse_prose(Path::new("/v/a.md"), "---\ntags: [unclosed\n---\n");
        assert!(matches!(result, Err(IndexerError::Parse { .. })));
    }

    #[test]
    fn test_empty_frontmatter() {
        let note = parse("---\n---\nhello");
        assert_eq!(note.title, "Some Note");
    }
}
