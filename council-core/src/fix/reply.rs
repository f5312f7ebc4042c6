//! Tolerant parser for `<file path="...">` replacement blocks in a fixer reply

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

const CLOSE_TAG: &str = "</file>";

/// A `<file path="...">` opener at the start of a line
fn file_opener() -> Option<&'static Regex> {
    static OPENER: OnceLock<Option<Regex>> = OnceLock::new();
    OPENER
        .get_or_init(|| Regex::new(r#"(?m)^[ \t]*<file\s+path\s*=\s*"([^"]+)"\s*>[ \t]*\r?\n?"#).ok())
        .as_ref()
}

/// Body of one block: everything before the last line that is only `</file>`
///
/// `segment` runs from the opener to the next opener or end of input, so a
/// closing tag inside file content never ends the block early. A segment
/// with no standalone closing line is unterminated.
fn block_body(segment: &str) -> Option<&str> {
    let mut offset = 0;
    let mut close = None;
    for line in segment.split_inclusive('\n') {
        if line.trim() == CLOSE_TAG {
            close = Some(offset);
        }
        offset += line.len();
    }
    close.map(|end| &segment[..end])
}

/// File replacements found in a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    /// path -> complete new content, for paths that were asked about
    pub files: BTreeMap<String, String>,
    /// Paths that were asked about but not returned
    pub missing: Vec<String>,
    /// Blocks for paths that were never sent; ignored
    pub unknown: Vec<String>,
}

impl ParsedReply {
    /// Number of requested files the reply did not account for
    pub fn unmatched(&self) -> usize {
        self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Extract replacement blocks for `requested` paths
///
/// Never fails: malformed or empty replies yield no replacements. When a
/// path appears more than once the last block wins.
pub fn parse_reply(reply: &str, requested: &[String]) -> ParsedReply {
    let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
    let mut parsed = ParsedReply::default();

    if let Some(re) = file_opener() {
        let openers: Vec<_> = re.captures_iter(reply).collect();
        for (index, caps) in openers.iter().enumerate() {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = openers
                .get(index + 1)
                .and_then(|next| next.get(0))
                .map_or(reply.len(), |m| m.start());
            let Some(body) = block_body(&reply[whole.end()..end]) else {
                tracing::debug!(path = path.as_str(), "Skipping unterminated file block");
                continue;
            };
            let path = path.as_str().trim();
            if wanted.contains(path) {
                parsed.files.insert(path.to_string(), strip_fence(body));
            } else if !parsed.unknown.iter().any(|p| p == path) {
                parsed.unknown.push(path.to_string());
            }
        }
    }

    parsed.missing = requested
        .iter()
        .filter(|p| !parsed.files.contains_key(p.as_str()))
        .cloned()
        .collect();

    if !parsed.unknown.is_empty() {
        tracing::warn!(paths = ?parsed.unknown, "Fixer returned files that were not requested");
    }

    parsed
}

/// Drop a markdown fence wrapped around the whole block body
fn strip_fence(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() > 6 {
        let inner = &trimmed[3..trimmed.len() - 3];
        // drop the info string line (e.g. "rust")
        let inner = match inner.find('\n') {
            Some(nl) => &inner[nl + 1..],
            None => inner,
        };
        let mut out = inner.to_string();
        if !out.ends_with('\n') {
            out.push('\n');
        }
        return out;
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested() -> Vec<String> {
        vec!["src/a.rs".to_string(), "src/b.rs".to_string()]
    }

    #[test]
    fn test_parses_blocks() {
        let reply = "Sure.\n<file path=\"src/a.rs\">\nfn a() {}\n</file>\n";
        let parsed = parse_reply(reply, &requested());
        assert_eq!(parsed.files.get("src/a.rs").map(String::as_str), Some("fn a() {}\n"));
        assert_eq!(parsed.missing, vec!["src/b.rs".to_string()]);
        assert_eq!(parsed.unmatched(), 1);
    }

    #[test]
    fn test_empty_and_garbage_replies() {
        assert!(parse_reply("", &requested()).is_empty());
        let parsed = parse_reply("<file path=\"src/a.rs\">never closed", &requested());
        assert!(parsed.is_empty());
        assert_eq!(parsed.unmatched(), 2);
    }

    #[test]
    fn test_unknown_paths_ignored() {
        let reply = "<file path=\"etc/passwd\">\nroot\n</file>";
        let parsed = parse_reply(reply, &requested());
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.unknown, vec!["etc/passwd".to_string()]);
    }

    #[test]
    fn test_strips_fences() {
        let reply = "<file path=\"src/b.rs\">\n```rust\nfn b() {}\n```\n</file>";
        let parsed = parse_reply(reply, &requested());
        assert_eq!(parsed.files.get("src/b.rs").map(String::as_str), Some("fn b() {}\n"));
    }

    #[test]
    fn test_matches_rendered_blocks() {
        use crate::snapshot::{render_file_blocks, FileEntry};
        let entries = [FileEntry::new("src/a.rs", "x\n"), FileEntry::new("src/b.rs", "y\n")];
        let parsed = parse_reply(&render_file_blocks(entries.iter()), &requested());
        assert_eq!(parsed.files.get("src/a.rs").map(String::as_str), Some("x\n"));
        assert_eq!(parsed.files.get("src/b.rs").map(String::as_str), Some("y\n"));
        assert_eq!(parsed.unmatched(), 0);
    }

    #[test]
    fn test_closing_tag_inside_content() {
        use crate::snapshot::{render_file_blocks, FileEntry};
        let tricky = "let s = \"</file>\";\nfn tail() {}\n";
        let markup = "<template>\n</file>\n</template>\n";
        let entries = [FileEntry::new("src/a.rs", tricky), FileEntry::new("src/b.rs", markup)];
        let parsed = parse_reply(&render_file_blocks(entries.iter()), &requested());
        assert_eq!(parsed.files.get("src/a.rs").map(String::as_str), Some(tricky));
        assert_eq!(parsed.files.get("src/b.rs").map(String::as_str), Some(markup));
    }

    #[test]
    fn test_trailing_prose_after_block() {
        let reply = "<file path=\"src/a.rs\">\nfn a() {}\n</file>\nLet me know if you need more.\n";
        let parsed = parse_reply(reply, &requested());
        assert_eq!(parsed.files.get("src/a.rs").map(String::as_str), Some("fn a() {}\n"));
    }
}
