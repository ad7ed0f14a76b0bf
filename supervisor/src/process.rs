use crate::Supervisor;
use crate::error::SupervisorError;
use async_trait::async_trait;
use cutover_core::Layout;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the supervisor's stdin, stdout and stderr.
    #[default]
    Inherit,
    Null,
    /// Append stdout and stderr to a file, reopened on every launch so each
    /// binary's output lands in the same log. Stdin is closed.
    Log(PathBuf),
}

impl StdioMode {
    /// Fresh stdin, stdout and stderr handles for one launch.
    fn streams(&self) -> Result<(Stdio, Stdio, Stdio), SupervisorError> {
        match self {
            StdioMode::Inherit => Ok((Stdio::inherit(), Stdio::inherit(), Stdio::inherit())),
            StdioMode::Null => Ok((Stdio::null(), Stdio::null(), Stdio::null())),
            StdioMode::Log(path) => {
                let log_err = |source| SupervisorError::Log {
                    path: path.clone(),
                    source,
                };
                let out = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(log_err)?;
                let err = out.try_clone().map_err(log_err)?;
                Ok((Stdio::null(), Stdio::from(out), Stdio::from(err)))
            }
        }
    }
}

/// A running node started by [`ProcessSupervisor`].
#[derive(Debug)]
pub struct NodeProcess {
    child: Child,
    binary: PathBuf,
    pid: Option<u32>,
}

impl NodeProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Reaps the child if it has already exited.
    pub fn try_status(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

/// Runs the binary selected by the `current` link as a child process.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    layout: Layout,
    stdio: StdioMode,
}

impl ProcessSupervisor {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            stdio: StdioMode::default(),
        }
    }

    pub fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    type Handle = NodeProcess;

    async fn launch(&self, args: &[String]) -> Result<NodeProcess, SupervisorError> {
        let binary = self.layout.current_bin()?;
        let (stdin, stdout, stderr) = self.stdio.streams()?;

        let child = Command::new(&binary)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                path: binary.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(binary = ?binary, pid = ?pid, "Launched node");
        Ok(NodeProcess { child, binary, pid })
    }

    async fn kill(&self, handle: &mut NodeProcess) -> Result<(), SupervisorError> {
        match handle.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid = ?handle.pid, status = %status, "Node already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(pid = ?handle.pid, error = %e, "Cannot query node status"),
        }

        handle
            .child
            .kill()
            .await
            .map_err(|source| SupervisorError::Kill {
                pid: handle.pid,
                source,
            })?;
        tracing::info!(pid = ?handle.pid, binary = ?handle.binary, "Killed node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::Config;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn layout_with_genesis(script: Option<&str>) -> (Layout, TempDir) {
        let home = TempDir::new().unwrap();
        let layout = Layout::new(&Config::new(home.path(), "noded"));
        std::fs::create_dir_all(layout.genesis_bin().parent().unwrap()).unwrap();
        if let Some(script) = script {
            std::fs::write(layout.genesis_bin(), script).unwrap();
            std::fs::set_permissions(layout.genesis_bin(), std::fs::Permissions::from_mode(0o755))
                .unwrap();
        }
        (layout, home)
    }

    #[tokio::test]
    async fn test_launch_and_kill() {
        let (layout, _home) = layout_with_genesis(Some("#!/bin/sh\nexec sleep 30\n"));
        let supervisor = ProcessSupervisor::new(layout.clone()).with_stdio(StdioMode::Null);

        let mut node = supervisor
            .launch(&["--datadir".to_string(), "/tmp".to_string()])
            .await
            .unwrap();
        assert!(node.pid().is_some());
        assert_eq!(node.binary(), layout.genesis_bin());
        assert!(node.try_status().unwrap().is_none());

        supervisor.kill(&mut node).await.unwrap();
        assert!(node.try_status().unwrap().is_some());

        // a second kill on an exited child is fine
        supervisor.kill(&mut node).await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_missing_binary() {
        let (layout, _home) = layout_with_genesis(None);
        let supervisor = ProcessSupervisor::new(layout).with_stdio(StdioMode::Null);

        let err = supervisor.launch(&[]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_output_goes_to_log() {
        let (layout, home) = layout_with_genesis(Some("#!/bin/sh\necho \"out $1\"\necho err >&2\n"));
        let log = home.path().join("node.log");
        std::fs::write(&log, "earlier\n").unwrap();
        let supervisor = ProcessSupervisor::new(layout).with_stdio(StdioMode::Log(log.clone()));

        for arg in ["one", "two"] {
            let mut node = supervisor.launch(&[arg.to_string()]).await.unwrap();
            node.child.wait().await.unwrap();
        }

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("earlier\n"));
        assert!(content.contains("out one\n"));
        assert!(content.contains("out two\n"));
        assert_eq!(content.matches("err\n").count(), 2);
    }

    #[tokio::test]
    async fn test_unopenable_log() {
        let (layout, home) = layout_with_genesis(Some("#!/bin/sh\n"));
        let log = home.path().join("missing/node.log");
        let supervisor = ProcessSupervisor::new(layout).with_stdio(StdioMode::Log(log));

        let err = supervisor.launch(&[]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Log { .. }));
    }
}
