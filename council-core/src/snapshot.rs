//! File snapshots reviewed and rewritten by the loops
//!
//! A snapshot is replaced wholesale each fix iteration; entries the fixer
//! did not touch keep their previous content.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// One `{path, content}` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Ordered list of file entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    entries: Vec<FileEntry>,
}

impl FileSnapshot {
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    /// Read `paths` (relative to `root`) into a snapshot
    ///
    /// Missing or non-UTF-8 files are skipped with a warning.
    pub fn load(root: &Path, paths: &[String]) -> Self {
        let entries = paths
            .iter()
            .filter_map(|p| match std::fs::read_to_string(root.join(p)) {
                Ok(content) => Some(FileEntry::new(p.clone(), content)),
                Err(e) => {
                    tracing::warn!(path = %p, error = %e, "Skipping unreadable file");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.content.as_str())
    }

    /// Copy-on-write replacement: paths in `replacements` get new content,
    /// every other entry is carried over unchanged
    pub fn replaced(&self, replacements: &BTreeMap<String, String>) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|e| match replacements.get(&e.path) {
                Some(content) => FileEntry::new(e.path.clone(), content.clone()),
                None => e.clone(),
            })
            .collect();
        Self { entries }
    }

    /// Paths whose content differs from `other`
    pub fn changed_paths(&self, other: &FileSnapshot) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| other.get(&e.path) != Some(e.content.as_str()))
            .map(|e| e.path.clone())
            .collect()
    }

    /// Write entries that differ from `original` back under `root`
    pub fn write_changes(&self, root: &Path, original: &FileSnapshot) -> Result<Vec<String>> {
        let changed = self.changed_paths(original);
        for path in &changed {
            if let Some(content) = self.get(path) {
                std::fs::write(root.join(path), content)?;
                tracing::debug!(path = %path, "Wrote fixed file");
            }
        }
        Ok(changed)
    }

    /// Render every entry as `<file path="...">` blocks
    pub fn to_prompt_blocks(&self) -> String {
        render_file_blocks(self.entries.iter())
    }
}

/// Render entries as `<file path="...">` blocks
pub fn render_file_blocks<'a>(entries: impl Iterator<Item = &'a FileEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("<file path=\"{}\">\n", entry.path));
        out.push_str(&entry.content);
        if !entry.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("</file>\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot() -> FileSnapshot {
        FileSnapshot::new(vec![
            FileEntry::new("a.rs", "fn a() {}\n"),
            FileEntry::new("b.rs", "fn b() {}\n"),
        ])
    }

    #[test]
    fn test_replaced_keeps_untouched_entries() {
        let original = snapshot();
        let mut replacements = BTreeMap::new();
        replacements.insert("b.rs".to_string(), "fn b2() {}\n".to_string());

        let next = original.replaced(&replacements);
        assert_eq!(next.get("a.rs"), Some("fn a() {}\n"));
        assert_eq!(next.get("b.rs"), Some("fn b2() {}\n"));
        assert_eq!(next.changed_paths(&original), vec!["b.rs".to_string()]);
    }

    #[test]
    fn test_load_skips_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("present.rs"), "x").unwrap();
        let snap = FileSnapshot::load(
            dir.path(),
            &["present.rs".to_string(), "missing.rs".to_string()],
        );
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("present.rs"), Some("x"));
    }

    #[test]
    fn test_write_changes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}\n").unwrap();

        let original = snapshot();
        let mut replacements = BTreeMap::new();
        replacements.insert("a.rs".to_string(), "fn fixed() {}\n".to_string());
        let fixed = original.replaced(&replacements);

        let written = fixed.write_changes(dir.path(), &original).unwrap();
        assert_eq!(written, vec!["a.rs".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.rs")).unwrap(),
            "fn fixed() {}\n"
        );
    }

    #[test]
    fn test_prompt_blocks() {
        let blocks = FileSnapshot::new(vec![FileEntry::new("x.py", "pass")]).to_prompt_blocks();
        assert_eq!(blocks, "<file path=\"x.py\">\npass\n</file>\n");
    }
}
