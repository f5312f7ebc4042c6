//! Collaborator prompt templates
//!
//! Templates are embedded at compile time and use `{{VARIABLE}}`
//! placeholders. Unset placeholders render as `(not specified)`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const QA_PROMPT: &str = include_str!("prompts/qa.md");
const ARCHITECT_PROMPT: &str = include_str!("prompts/architect.md");
const LIBRARIAN_PROMPT: &str = include_str!("prompts/librarian.md");
const WARDEN_PROMPT: &str = include_str!("prompts/warden.md");
const REVIEW_FORMAT: &str = include_str!("prompts/review_format.md");
const FIXER_PROMPT: &str = include_str!("prompts/fixer.md");
const EDITOR_PROMPT: &str = include_str!("prompts/editor.md");

/// Built-in reviewer personas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    Qa,
    Architect,
    Librarian,
    Warden,
}

impl Persona {
    /// Every persona, in the order the council seats them
    pub const ALL: [Persona; 4] = [
        Persona::Qa,
        Persona::Architect,
        Persona::Librarian,
        Persona::Warden,
    ];

    /// Registry name, also the config key under `[review.collaborators]`
    pub fn name(&self) -> &'static str {
        match self {
            Persona::Qa => "qa",
            Persona::Architect => "architect",
            Persona::Librarian => "librarian",
            Persona::Warden => "warden",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Persona::Qa => "QA Engineer",
            Persona::Architect => "Architect",
            Persona::Librarian => "Librarian",
            Persona::Warden => "Domain Warden",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            Persona::Qa => QA_PROMPT,
            Persona::Architect => ARCHITECT_PROMPT,
            Persona::Librarian => LIBRARIAN_PROMPT,
            Persona::Warden => WARDEN_PROMPT,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Persona::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown persona '{}'", s))
    }
}

/// Context for rendering a prompt template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Render a list of paths as a markdown bullet list
    pub fn with_files(self, key: &str, files: &[String]) -> Self {
        let files_str = if files.is_empty() {
            "(no specific files)".to_string()
        } else {
            files
                .iter()
                .map(|f| format!("- `{}`", f))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.with(key, files_str)
    }
}

/// Render a reviewer prompt for `persona` over already-rendered file blocks
pub fn render_review(persona: Persona, code: &str) -> String {
    let context = PromptContext::new()
        .with("OUTPUT_FORMAT", REVIEW_FORMAT.trim_end())
        .with("CODE", code.trim_end());
    render_template(persona.template(), &context)
}

/// Render the fix-verify loop payload
pub fn render_fixer(issues: &str, files: &str) -> String {
    let context = PromptContext::new()
        .with("ISSUES", issues.trim_end())
        .with("FILES", files.trim_end());
    render_template(FIXER_PROMPT, &context)
}

/// Render a per-issue correction prompt; the context must set
/// `PRIORITY`, `CATEGORY`, `INSTRUCTION`, `CONTEXT`, `AFFECTED_FILES`
/// and `CONVENTIONS`
pub fn render_editor(context: &PromptContext) -> String {
    render_template(EDITOR_PROMPT, context)
}

/// Render a template string with variable substitution
///
/// The template is scanned once, so substituted values are never
/// re-interpreted as placeholders.
pub fn render_template(template: &str, context: &PromptContext) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) if is_placeholder(&after[..end]) => {
                let key = &after[..end];
                match context.variables.get(key) {
                    Some(value) => result.push_str(value),
                    None => result.push_str("(not specified)"),
                }
                rest = &after[end + 2..];
            }
            _ => {
                result.push_str("{{");
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}

fn is_placeholder(inside: &str) -> bool {
    !inside.is_empty() && inside.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}
