//! Handle to a spawned collaborator process

use tokio::process::Child;

use crate::{Error, Result};

/// Handle to a running collaborator process
pub struct AgentHandle {
    child: Child,
    /// Which backend spawned this process
    backend: &'static str,
    workdir: String,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("backend", &self.backend)
            .field("workdir", &self.workdir)
            .field("child", &"<Child>")
            .finish()
    }
}

impl AgentHandle {
    pub(crate) fn new(child: Child, backend: &'static str, workdir: String) -> Self {
        Self {
            child,
            backend,
            workdir,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Get mutable access to the child process for output streaming
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Wait for the process to complete and return the exit status
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(Error::Io)
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(Error::Io)
    }
}
