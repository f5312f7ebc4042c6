//! Review findings and verdicts
//!
//! Issues and verdicts are validated when constructed. Raw collaborator
//! payloads go through `RawIssue`/`RawVerdict` so that a bad severity, a
//! negative line or a missing field is rejected instead of coerced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Suggestion,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Suggestion => "suggestion",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "suggestion" => Ok(Severity::Suggestion),
            _ => Err(ValidationError::InvalidSeverity(s.to_string())),
        }
    }
}

/// A collaborator's pass/warn/fail judgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pass,
    Warn,
    Fail,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pass => "pass",
            ReviewStatus::Warn => "warn",
            ReviewStatus::Fail => "fail",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ReviewStatus::Pass)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" => Ok(ReviewStatus::Pass),
            "warn" => Ok(ReviewStatus::Warn),
            "fail" => Ok(ReviewStatus::Fail),
            _ => Err(ValidationError::InvalidStatus(s.to_string())),
        }
    }
}

/// One finding reported by a review collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIssue")]
pub struct Issue {
    severity: Severity,
    file: String,
    line: u32,
    message: String,
    suggested_fix: Option<String>,
}

impl Issue {
    /// Create a validated issue
    pub fn new(
        severity: Severity,
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let file = file.into();
        let message = message.into();
        if file.trim().is_empty() {
            return Err(ValidationError::MissingField("file"));
        }
        if message.trim().is_empty() {
            return Err(ValidationError::MissingField("message"));
        }
        Ok(Self {
            severity,
            file,
            line,
            message,
            suggested_fix: None,
        })
    }

    /// Attach a suggested fix
    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        let fix = fix.into();
        self.suggested_fix = (!fix.trim().is_empty()).then_some(fix);
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggested_fix(&self) -> Option<&str> {
        self.suggested_fix.as_deref()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}",
            self.file, self.line, self.severity, self.message
        )?;
        if let Some(ref fix) = self.suggested_fix {
            write!(f, " (fix: {})", fix)?;
        }
        Ok(())
    }
}

/// Untyped issue as emitted by a collaborator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "suggestedFix")]
    pub suggested_fix: Option<String>,
}

impl TryFrom<RawIssue> for Issue {
    type Error = ValidationError;

    fn try_from(raw: RawIssue) -> Result<Self, Self::Error> {
        let severity: Severity = raw
            .severity
            .ok_or(ValidationError::MissingField("severity"))?
            .parse()?;
        let file = raw.file.ok_or(ValidationError::MissingField("file"))?;
        let line = parse_line(raw.line.ok_or(ValidationError::MissingField("line"))?)?;
        let message = raw.message.ok_or(ValidationError::MissingField("message"))?;

        let issue = Issue::new(severity, file, line, message)?;
        Ok(match raw.suggested_fix {
            Some(fix) => issue.with_suggested_fix(fix),
            None => issue,
        })
    }
}

fn parse_line(value: serde_json::Value) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidLine(value.to_string());
    match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(invalid),
        serde_json::Value::String(s) => s.trim().parse::<u32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// One collaborator's output for one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    collaborator: String,
    status: ReviewStatus,
    issues: Vec<Issue>,
    summary: String,
}

impl ReviewVerdict {
    /// Create a validated verdict
    pub fn new(
        collaborator: impl Into<String>,
        status: ReviewStatus,
        issues: Vec<Issue>,
        summary: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let collaborator = collaborator.into();
        if collaborator.trim().is_empty() {
            return Err(ValidationError::MissingField("collaborator"));
        }
        Ok(Self {
            collaborator,
            status,
            issues,
            summary: summary.into(),
        })
    }

    pub fn collaborator(&self) -> &str {
        &self.collaborator
    }

    pub fn status(&self) -> ReviewStatus {
        self.status
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}
