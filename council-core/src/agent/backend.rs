//! Backend abstraction for collaborator processes

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::budget::Usage;
use crate::config::AgentConfig;
use crate::{Error, Result};

use super::output::{CollectingHandler, OutputStreamer};
use super::spawn::AgentHandle;

/// Tools a read-only collaborator must never use
const EDIT_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "NotebookEdit", "Bash"];

/// Everything one collaborator invocation produced
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    /// Final reply text
    pub text: String,
    /// Authoritative usage, when the collaborator reported it
    pub usage: Option<Usage>,
    /// Process exited zero and did not flag an error result
    pub success: bool,
    pub stderr: String,
    pub duration_ms: u64,
}

impl AgentRun {
    /// stderr when present, else the reply text; the raw material for
    /// failure reasons
    pub fn diagnostics(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.text
        } else {
            &self.stderr
        }
    }
}

/// Trait for collaborator backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &'static str;

    /// Build the command to spawn this backend
    fn build_command(&self, workdir: &Path) -> Command;

    /// Spawn a collaborator; the prompt is written to its stdin
    async fn spawn(&self, prompt: &str, workdir: &Path) -> Result<AgentHandle>;

    /// Check if this backend is available on the system
    fn is_available(&self) -> bool;

    /// A copy whose edit permissions cover only `files`, if this backend
    /// edits files and can narrow its permissions
    fn scoped_to_files(&self, _files: &[String]) -> Option<Box<dyn Backend>> {
        None
    }

    /// Spawn, stream output to completion and collect the result
    ///
    /// On timeout the process is killed and `Error::Timeout` is returned.
    async fn run(&self, prompt: &str, workdir: &Path, timeout: Option<Duration>) -> Result<AgentRun> {
        let started = Instant::now();
        let mut handle = self.spawn(prompt, workdir).await?;

        let stdout = handle
            .child_mut()
            .stdout
            .take()
            .ok_or_else(|| Error::Agent("Collaborator stdout was not captured".to_string()))?;
        let stderr = handle.child_mut().stderr.take();

        let collect = async {
            let mut handler = CollectingHandler::new();
            let mut streamer = OutputStreamer::new(stdout);
            let read_stderr = async move {
                let mut buf = String::new();
                if let Some(mut err) = stderr {
                    if let Err(e) = err.read_to_string(&mut buf).await {
                        tracing::debug!(error = %e, "Failed to read collaborator stderr");
                    }
                }
                buf
            };
            let (streamed, stderr_text) = tokio::join!(streamer.stream(&mut handler), read_stderr);
            streamed?;
            let status = handle.wait().await?;
            Ok::<_, Error>((handler, stderr_text, status))
        };

        let (handler, stderr_text, status) = match timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, collect).await;
                match outcome {
                    Ok(collected) => collected?,
                    Err(_) => {
                        if let Err(e) = handle.kill().await {
                            tracing::warn!(error = %e, "Failed to kill timed-out collaborator");
                        }
                        return Err(Error::Timeout(limit));
                    }
                }
            }
            None => collect.await?,
        };

        let run = AgentRun {
            text: handler.text(),
            usage: handler.usage(),
            success: status.success() && !handler.is_error(),
            stderr: stderr_text,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            backend = self.name(),
            success = run.success,
            duration_ms = run.duration_ms,
            tool_calls = handler.tool_calls(),
            "Collaborator finished"
        );

        Ok(run)
    }
}

/// Claude Code backend implementation
#[derive(Debug, Clone)]
pub struct ClaudeBackend {
    claude_path: String,
    model: Option<String>,
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    skip_permissions: bool,
}

impl ClaudeBackend {
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            skip_permissions: false,
        }
    }

    /// Build from the `[agent]` config section
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut backend = Self::new()
            .with_path(config.claude_path.clone())
            .with_skip_permissions(config.skip_permissions);
        if let Some(ref model) = config.model {
            backend = backend.with_model(model.clone());
        }
        backend
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.claude_path = path.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set allowed tools
    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    /// Deny every editing tool; used for reviewers and the loop fixer,
    /// which answer in text only
    pub fn read_only(mut self) -> Self {
        self.allowed_tools.clear();
        self.disallowed_tools = EDIT_TOOLS.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Allow file edits; used by the per-issue editor
    pub fn editing(self) -> Self {
        self.with_allowed_tools(vec!["Read".into(), "Edit".into(), "Write".into()])
    }

    /// Allow reads anywhere but edits only to `files`; an empty list
    /// falls back to unscoped editing
    pub fn editing_files(self, files: &[String]) -> Self {
        if files.is_empty() {
            return self.editing();
        }
        let mut tools = vec!["Read".to_string()];
        tools.extend(files.iter().map(|f| format!("Edit({})", f)));
        tools.extend(files.iter().map(|f| format!("Write({})", f)));
        self.with_allowed_tools(tools)
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn build_command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json");

        if self.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }

        if let Some(ref model) = self.model {
            cmd.arg("--model").arg(model);
        }

        if !self.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(self.allowed_tools.join(","));
        }

        if !self.disallowed_tools.is_empty() {
            cmd.arg("--disallowedTools").arg(self.disallowed_tools.join(","));
        }

        cmd.current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }

    async fn spawn(&self, prompt: &str, workdir: &Path) -> Result<AgentHandle> {
        let workdir_str = workdir
            .to_str()
            .ok_or_else(|| Error::Agent("Invalid working directory path".to_string()))?
            .to_string();

        if !workdir.exists() {
            return Err(Error::Agent(format!(
                "Working directory does not exist: {}",
                workdir_str
            )));
        }

        let mut child = self.build_command(workdir).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Agent(format!(
                    "Claude executable not found at '{}'. Is Claude Code installed?",
                    self.claude_path
                ))
            } else {
                Error::Io(e)
            }
        })?;

        // Prompts can exceed the per-argument size limit, so they go through stdin
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::debug!(error = %e, "Collaborator closed stdin early");
            }
        }

        Ok(AgentHandle::new(child, self.name(), workdir_str))
    }

    fn scoped_to_files(&self, files: &[String]) -> Option<Box<dyn Backend>> {
        if !self.allowed_tools.iter().any(|t| t == "Edit") {
            return None;
        }
        Some(Box::new(self.clone().editing_files(files)))
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.claude_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn fake_claude(dir: &TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_claude_backend_builder() {
        let backend = ClaudeBackend::new()
            .with_path("/custom/claude")
            .with_model("opus");

        assert_eq!(backend.claude_path, "/custom/claude");
        assert_eq!(backend.model, Some("opus".to_string()));
        assert_eq!(backend.name(), "claude");
    }

    #[test]
    fn test_from_config() {
        let config = AgentConfig {
            claude_path: "/opt/claude".to_string(),
            model: Some("sonnet".to_string()),
            ..Default::default()
        };
        let backend = ClaudeBackend::from_config(&config);
        assert_eq!(backend.claude_path, "/opt/claude");
        assert_eq!(backend.model.as_deref(), Some("sonnet"));
        assert_eq!(backend.skip_permissions, config.skip_permissions);
    }

    #[test]
    fn test_tool_scoping() {
        let reviewer = ClaudeBackend::new().read_only();
        assert!(reviewer.allowed_tools.is_empty());
        assert!(reviewer.disallowed_tools.contains(&"Edit".to_string()));

        let editor = ClaudeBackend::new().editing();
        assert_eq!(editor.allowed_tools, vec!["Read", "Edit", "Write"]);
    }

    fn allowed_tools_arg(backend: &dyn Backend) -> Option<String> {
        let cmd = backend.build_command(Path::new("."));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        args.iter()
            .position(|a| a == "--allowedTools")
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_edits_scoped_to_affected_files() {
        let files = vec!["src/lib.rs".to_string(), "src/parser.rs".to_string()];
        let editor = ClaudeBackend::new().editing();

        let scoped = editor.scoped_to_files(&files).unwrap();
        assert_eq!(
            allowed_tools_arg(scoped.as_ref()).as_deref(),
            Some("Read,Edit(src/lib.rs),Edit(src/parser.rs),Write(src/lib.rs),Write(src/parser.rs)")
        );
        // the original keeps its unscoped profile
        assert_eq!(allowed_tools_arg(&editor).as_deref(), Some("Read,Edit,Write"));
    }

    #[test]
    fn test_scoping_without_files_or_edit_rights() {
        let unscoped = ClaudeBackend::new().editing().scoped_to_files(&[]).unwrap();
        assert_eq!(allowed_tools_arg(unscoped.as_ref()).as_deref(), Some("Read,Edit,Write"));

        let reviewer = ClaudeBackend::new().read_only();
        assert!(reviewer.scoped_to_files(&["src/lib.rs".to_string()]).is_none());
    }

    #[tokio::test]
    async fn test_spawn_invalid_workdir() {
        let backend = ClaudeBackend::new();
        let result = backend.spawn("test", Path::new("/nonexistent/path")).await;
        assert!(matches!(result, Err(Error::Agent(_))));
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let dir = TempDir::new().unwrap();
        let backend = ClaudeBackend::new().with_path("/usr/bin/nonexistent-claude-binary");
        let result = backend.spawn("test", dir.path()).await;
        assert!(matches!(result, Err(Error::Agent(msg)) if msg.contains("not found")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_collects_result_and_usage() {
        let dir = TempDir::new().unwrap();
        let script = fake_claude(
            &dir,
            r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}'
echo '{"type":"result","is_error":false,"result":"NO ISSUES FOUND","total_cost_usd":0.5,"usage":{"input_tokens":10,"output_tokens":5}}'"#,
        );
        let backend = ClaudeBackend::new().with_path(script);

        let run = backend.run("review this", dir.path(), None).await.unwrap();
        assert!(run.success);
        assert_eq!(run.text, "NO ISSUES FOUND");
        let usage = run.usage.unwrap();
        assert_eq!(usage.total_units(), 15);
        assert_eq!(usage.cost, 0.5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_failure() {
        let dir = TempDir::new().unwrap();
        let script = fake_claude(&dir, "echo 'Error: quota exceeded' >&2\nexit 3");
        let backend = ClaudeBackend::new().with_path(script);

        let run = backend.run("fix", dir.path(), None).await.unwrap();
        assert!(!run.success);
        assert!(run.diagnostics().contains("quota exceeded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout() {
        let dir = TempDir::new().unwrap();
        let script = fake_claude(&dir, "sleep 5");
        let backend = ClaudeBackend::new().with_path(script);

        let result = backend
            .run("slow", dir.path(), Some(Duration::from_millis(100)))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
