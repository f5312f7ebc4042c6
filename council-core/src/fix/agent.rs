//! Collaborator-backed fixer and editor

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::Backend;
use crate::{Error, Result};

use super::extract::extract_error_message;
use super::pipeline::{EditResult, Editor};
use super::verify_loop::{Fixer, FixerReply};

/// Fixer that sends the combined payload to a collaborator
pub struct AgentFixer {
    backend: Arc<dyn Backend>,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl AgentFixer {
    pub fn new(backend: Arc<dyn Backend>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Fixer for AgentFixer {
    async fn fix(&self, payload: &str) -> Result<FixerReply> {
        let run = self.backend.run(payload, &self.workdir, self.timeout).await?;
        if !run.success {
            return Err(Error::Agent(format!(
                "Fixer failed: {}",
                extract_error_message(run.diagnostics())
            )));
        }
        Ok(FixerReply {
            text: run.text,
            usage: run.usage,
        })
    }
}

/// Editor that lets a collaborator change files in the working tree
///
/// The backend should be built with edit tools allowed.
pub struct AgentEditor {
    backend: Arc<dyn Backend>,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl AgentEditor {
    pub fn new(backend: Arc<dyn Backend>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Editor for AgentEditor {
    async fn apply(&self, prompt: &str, affected_files: &[String]) -> Result<EditResult> {
        tracing::debug!(files = ?affected_files, "Requesting edit");
        let scoped = self.backend.scoped_to_files(affected_files);
        let backend = scoped.as_deref().unwrap_or(self.backend.as_ref());
        let run = backend.run(prompt, &self.workdir, self.timeout).await?;
        let output = if run.success {
            run.text.clone()
        } else {
            run.diagnostics().to_string()
        };
        Ok(EditResult {
            success: run.success,
            output,
            usage: run.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentHandle, AgentRun};
    use crate::budget::Usage;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::process::Command;

    struct CannedBackend {
        run: AgentRun,
        prompts: Mutex<Vec<String>>,
        scopes: Mutex<Vec<Vec<String>>>,
    }

    impl CannedBackend {
        fn new(run: AgentRun) -> Arc<Self> {
            Arc::new(Self {
                run,
                prompts: Mutex::new(Vec::new()),
                scopes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Backend for CannedBackend {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn build_command(&self, workdir: &Path) -> Command {
            let mut cmd = Command::new("true");
            cmd.current_dir(workdir);
            cmd
        }

        async fn spawn(&self, _prompt: &str, _workdir: &Path) -> Result<AgentHandle> {
            Err(Error::Agent("canned backend does not spawn".to_string()))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn scoped_to_files(&self, files: &[String]) -> Option<Box<dyn Backend>> {
            self.scopes.lock().unwrap().push(files.to_vec());
            None
        }

        async fn run(&self, prompt: &str, _workdir: &Path, _timeout: Option<Duration>) -> Result<AgentRun> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.run.clone())
        }
    }

    #[tokio::test]
    async fn test_fixer_returns_reply_and_usage() {
        let backend = CannedBackend::new(AgentRun {
            text: "<file path=\"a.rs\">\nfn a() {}\n</file>".to_string(),
            usage: Some(Usage {
                input_units: 10,
                output_units: 5,
                ..Default::default()
            }),
            success: true,
            ..Default::default()
        });
        let fixer = AgentFixer::new(backend.clone(), ".");

        let reply = fixer.fix("payload").await.unwrap();
        assert!(reply.text.contains("fn a()"));
        assert_eq!(reply.usage.unwrap().total_units(), 15);
        assert_eq!(backend.prompts.lock().unwrap().as_slice(), ["payload"]);
    }

    #[tokio::test]
    async fn test_fixer_failure_is_error() {
        let backend = CannedBackend::new(AgentRun {
            stderr: "Error: rate limited\n".to_string(),
            ..Default::default()
        });
        let err = AgentFixer::new(backend, ".").fix("payload").await.unwrap_err();
        assert!(matches!(err, Error::Agent(ref msg) if msg == "Fixer failed: Error: rate limited"));
    }

    #[tokio::test]
    async fn test_editor_reports_diagnostics_on_failure() {
        let backend = CannedBackend::new(AgentRun {
            text: "partial".to_string(),
            stderr: "permission denied: src/lib.rs".to_string(),
            ..Default::default()
        });
        let result = AgentEditor::new(backend, ".")
            .apply("prompt", &["src/lib.rs".to_string()])
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "permission denied: src/lib.rs");
    }

    #[tokio::test]
    async fn test_editor_success() {
        let backend = CannedBackend::new(AgentRun {
            text: "Renamed the helper.".to_string(),
            success: true,
            ..Default::default()
        });
        let result = AgentEditor::new(backend.clone(), ".")
            .apply("prompt", &["src/lib.rs".to_string()])
            .await
            .unwrap();
        assert_eq!(backend.scopes.lock().unwrap().as_slice(), [vec!["src/lib.rs".to_string()]]);
        assert!(result.success);
        assert_eq!(result.output, "Renamed the helper.");
        assert!(result.usage.is_none());
    }
}
