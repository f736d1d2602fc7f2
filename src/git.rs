//! Running the `git` binary inside throwaway workspaces.

use async_trait::async_trait;
use log::debug;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;

use crate::error::{BotError, Result};
use crate::request_log::RequestLog;

/// Runs one `git` invocation.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in `dir` and return its combined output.
    async fn run(&self, dir: &Path, args: &[String]) -> Result<String>;
}

/// Invokes the system `git` binary.
pub struct SystemGit;

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, dir: &Path, args: &[String]) -> Result<String> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(BotError::Git {
                args: args.to_vec(),
                output: combined,
                status: output.status.to_string(),
            });
        }
        Ok(combined)
    }
}

/// Records invocations in the request log and reports success with no output.
pub struct DryRunGit {
    log: RequestLog,
}

impl DryRunGit {
    pub fn new(log: RequestLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl GitRunner for DryRunGit {
    async fn run(&self, _dir: &Path, args: &[String]) -> Result<String> {
        self.log.push(format!("git.Run: git {}", args.join(" ")));
        Ok(String::new())
    }
}

/// A freshly created temporary directory for one logical git operation.
///
/// The directory is removed when the workspace is dropped, on every exit path.
pub struct GitWorkspace<'a> {
    dir: TempDir,
    git: &'a dyn GitRunner,
}

impl<'a> GitWorkspace<'a> {
    /// Create an empty workspace directory, without initialising a repository.
    pub fn empty(git: &'a dyn GitRunner) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("gitcmd").tempdir()?;
        Ok(Self { dir, git })
    }

    /// Create a workspace holding an empty repository.
    pub async fn init(git: &'a dyn GitRunner) -> Result<Self> {
        let workspace = Self::empty(git)?;
        workspace.run(["init", "."]).await?;
        Ok(workspace)
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.run(["remote", "add", name, url]).await.map(|_| ())
    }

    pub async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        self.git.run(self.dir.path(), &args).await
    }
}
