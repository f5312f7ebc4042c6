//! Correction instructions: discrete units of work for the fixing collaborator

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::review::{Issue, Severity};

/// How urgently an instruction should be applied
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// error -> high, warning -> medium, suggestion -> low
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Priority::High,
            Severity::Warning => Priority::Medium,
            Severity::Suggestion => Priority::Low,
        }
    }

    /// Map a free-text severity; unrecognized values become medium
    pub fn from_severity_str(severity: &str) -> Self {
        severity
            .parse::<Severity>()
            .map(Self::from_severity)
            .unwrap_or(Priority::Medium)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ValidationError::InvalidPriority(s.to_string())),
        }
    }
}

/// A unit of work for the fixing collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInstruction")]
pub struct CorrectionInstruction {
    priority: Priority,
    category: String,
    instruction: String,
    context: String,
    affected_files: Vec<String>,
}

impl CorrectionInstruction {
    pub fn new(
        priority: Priority,
        category: impl Into<String>,
        instruction: impl Into<String>,
        context: impl Into<String>,
        affected_files: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(ValidationError::MissingField("instruction"));
        }
        if affected_files.iter().any(|f| f.trim().is_empty()) {
            return Err(ValidationError::InvalidAffectedFiles);
        }
        Ok(Self {
            priority,
            category: category.into(),
            instruction,
            context: context.into(),
            affected_files,
        })
    }

    /// Derive an instruction from a reviewer's issue
    pub fn from_issue(issue: &Issue, collaborator: &str) -> Self {
        let mut context = format!("{}:{}", issue.file(), issue.line());
        if let Some(fix) = issue.suggested_fix() {
            context.push_str(&format!("\nSuggested fix: {}", fix));
        }
        Self {
            priority: Priority::from_severity(issue.severity()),
            category: collaborator.to_string(),
            instruction: issue.message().to_string(),
            context,
            affected_files: vec![issue.file().to_string()],
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn affected_files(&self) -> &[String] {
        &self.affected_files
    }
}

/// Untyped instruction as stored on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInstruction {
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, alias = "affectedFiles")]
    pub affected_files: Option<serde_json::Value>,
}

impl TryFrom<RawInstruction> for CorrectionInstruction {
    type Error = ValidationError;

    fn try_from(raw: RawInstruction) -> Result<Self, Self::Error> {
        let priority = match raw.priority {
            Some(p) => p.parse()?,
            None => Priority::default(),
        };
        let instruction = raw
            .instruction
            .ok_or(ValidationError::MissingField("instruction"))?;
        let affected_files = match raw.affected_files {
            None => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => Ok(s),
                    _ => Err(ValidationError::InvalidAffectedFiles),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ValidationError::InvalidAffectedFiles),
        };

        CorrectionInstruction::new(
            priority,
            raw.category.unwrap_or_default(),
            instruction,
            raw.context.unwrap_or_default(),
            affected_files,
        )
    }
}
