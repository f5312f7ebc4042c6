//! Repository conventions injected into per-issue fix prompts

use std::path::PathBuf;

use crate::Result;

/// Root-level files read first, in this order
const ROOT_FILES: &[&str] = &["CLAUDE.md", "AGENTS.md", "CONTRIBUTING.md"];

/// Extra conventions directory, relative to the root
const CONVENTIONS_DIR: &str = ".council/conventions";

/// One named conventions document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convention {
    pub name: String,
    pub text: String,
}

/// Source of conventions text
pub trait ConventionsLoader: Send + Sync {
    fn load(&self) -> Result<Vec<Convention>>;
}

/// Loads conventions from well-known files in a repository
#[derive(Debug, Clone)]
pub struct FsConventions {
    root: PathBuf,
}

impl FsConventions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ConventionsLoader for FsConventions {
    fn load(&self) -> Result<Vec<Convention>> {
        let mut conventions = Vec::new();

        for name in ROOT_FILES {
            let path = self.root.join(name);
            if path.is_file() {
                conventions.push(Convention {
                    name: name.to_string(),
                    text: std::fs::read_to_string(&path)?,
                });
            }
        }

        let dir = self.root.join(CONVENTIONS_DIR);
        if dir.is_dir() {
            let mut extra: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
                .collect();
            extra.sort();
            for path in extra {
                let name = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                conventions.push(Convention {
                    name,
                    text: std::fs::read_to_string(&path)?,
                });
            }
        }

        tracing::debug!(count = conventions.len(), "Loaded conventions");
        Ok(conventions)
    }
}

/// Render conventions as a prompt section; empty when there are none
pub fn render_conventions(conventions: &[Convention]) -> String {
    if conventions.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Repository conventions\n");
    for convention in conventions {
        out.push_str(&format!("\n### {}\n\n{}\n", convention.name, convention.text.trim_end()));
    }
    out
}
