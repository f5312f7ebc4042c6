//! Reviewer backed by a Claude Code collaborator and a persona prompt

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::{render_review, Backend, Persona};
use crate::error::ValidationError;
use crate::fix::extract_error_message;
use crate::snapshot::FileSnapshot;
use crate::{Error, Result};

use super::dispatcher::Reviewer;
use super::verdict::{Issue, RawIssue, ReviewStatus, ReviewVerdict, Severity};

/// Reply a reviewer gives when it has nothing to report
pub const NO_ISSUES_SENTINEL: &str = "NO ISSUES FOUND";

/// A persona reviewer that asks a collaborator for a JSON verdict
pub struct AgentReviewer {
    persona: Persona,
    backend: Arc<dyn Backend>,
    workdir: PathBuf,
}

impl AgentReviewer {
    pub fn new(persona: Persona, backend: Arc<dyn Backend>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            persona,
            backend,
            workdir: workdir.into(),
        }
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }
}

#[async_trait]
impl Reviewer for AgentReviewer {
    fn name(&self) -> &str {
        self.persona.name()
    }

    async fn review(&self, snapshot: &FileSnapshot) -> Result<ReviewVerdict> {
        if snapshot.is_empty() {
            return Ok(ReviewVerdict::new(
                self.name(),
                ReviewStatus::Pass,
                Vec::new(),
                "Nothing to review",
            )?);
        }

        let prompt = render_review(self.persona, &snapshot.to_prompt_blocks());
        tracing::debug!(reviewer = self.name(), files = snapshot.len(), "Requesting review");

        // The dispatcher owns the timeout
        let run = self.backend.run(&prompt, &self.workdir, None).await?;
        if !run.success {
            return Err(Error::Agent(format!(
                "{} reviewer failed: {}",
                self.persona.title(),
                extract_error_message(run.diagnostics())
            )));
        }

        Ok(parse_verdict(self.name(), &run.text)?)
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    issues: Vec<serde_json::Value>,
}

/// Turn a collaborator's free-text reply into a verdict
///
/// A JSON object anywhere in the reply wins. Otherwise the no-issues
/// sentinel means pass, and anything else is a warn verdict with no issues.
/// Issue entries that fail validation are dropped.
pub fn parse_verdict(collaborator: &str, reply: &str) -> std::result::Result<ReviewVerdict, ValidationError> {
    let raw = match extract_json_object(reply).and_then(|json| serde_json::from_str::<RawVerdict>(json).ok()) {
        Some(raw) => raw,
        None if reply.contains(NO_ISSUES_SENTINEL) => {
            return ReviewVerdict::new(collaborator, ReviewStatus::Pass, Vec::new(), "No issues found");
        }
        None => {
            tracing::warn!(collaborator, "Could not parse reviewer reply as a verdict");
            return ReviewVerdict::new(
                collaborator,
                ReviewStatus::Warn,
                Vec::new(),
                "Reviewer reply could not be parsed",
            );
        }
    };

    let issues: Vec<Issue> = raw
        .issues
        .into_iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<RawIssue>(value)
                .map_err(|e| e.to_string())
                .and_then(|r| Issue::try_from(r).map_err(|e| e.to_string()));
            match parsed {
                Ok(issue) => Some(issue),
                Err(e) => {
                    tracing::warn!(collaborator, error = %e, "Dropping invalid issue");
                    None
                }
            }
        })
        .collect();

    let status = match raw.status.as_deref().map(str::parse::<ReviewStatus>) {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            tracing::warn!(collaborator, error = %e, "Ignoring reported status");
            derive_status(&issues)
        }
        None => derive_status(&issues),
    };

    let summary = raw.summary.unwrap_or_else(|| format!("{} issue(s) reported", issues.len()));
    ReviewVerdict::new(collaborator, status, issues, summary)
}

/// fail on any error, warn on any warning, else pass
fn derive_status(issues: &[Issue]) -> ReviewStatus {
    if issues.iter().any(|i| i.severity() == Severity::Error) {
        ReviewStatus::Fail
    } else if issues.iter().any(|i| i.severity() == Severity::Warning) {
        ReviewStatus::Warn
    } else {
        ReviewStatus::Pass
    }
}

/// The outermost `{...}` span, which also skips markdown fences
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}
