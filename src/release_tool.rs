//! Release metadata held in the integration repository checkout.

use async_trait::async_trait;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{BotError, Result};
use crate::git::GitRunner;

/// Limit on refreshing the integration checkout.
const UPDATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers which revisions of which repositories make up an integration version.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Integration branches referencing `repo` at `version`, remote prefix removed.
    async fn integration_versions_including(
        &self,
        repo: &str,
        version: &str,
        feature_branches: bool,
    ) -> Result<Vec<String>>;

    /// Revision of `repo` pinned by `integration_version`, remote prefix removed.
    async fn version_of(&self, repo: &str, integration_version: &str) -> Result<String>;

    /// Every repository versioned in `integration_version`.
    async fn versioned_repositories(&self, integration_version: &str) -> Result<Vec<String>>;

    /// Pull the latest state of the checkout.
    async fn update_checkout(&self) -> Result<()>;
}

/// `release_tool.py` from `<integration>/extra`.
pub struct ReleaseTool {
    integration_dir: PathBuf,
    program: String,
    script: String,
    git: Arc<dyn GitRunner>,
}

impl ReleaseTool {
    pub fn new(integration_dir: impl Into<PathBuf>, git: Arc<dyn GitRunner>) -> Self {
        Self {
            integration_dir: integration_dir.into(),
            program: "python3".to_string(),
            script: "release_tool.py".to_string(),
            git,
        }
    }

    /// Use another interpreter and script, relative to `<integration>/extra`.
    #[cfg(test)]
    pub fn with_program(mut self, program: &str, script: &str) -> Self {
        self.program = program.to_string();
        self.script = script.to_string();
        self
    }

    async fn invoke(&self, args: &[&str]) -> Result<String> {
        debug!("{} {} {}", self.program, self.script, args.join(" "));
        let output = Command::new(&self.program)
            .arg(&self.script)
            .args(args)
            .current_dir(self.integration_dir.join("extra"))
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(BotError::Process {
                program: format!("{} {}", self.script, args.join(" ")),
                status: output.status.to_string(),
                output: format!("{stdout}{}", String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(stdout)
    }
}

/// Drop the remote from `origin/1.0.x`.
fn strip_remote(line: &str) -> &str {
    line.split_once('/').map_or(line, |(_, rest)| rest)
}

fn parse_lines(output: &str) -> Vec<String> {
    output
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[async_trait]
impl VersionResolver for ReleaseTool {
    async fn integration_versions_including(
        &self,
        repo: &str,
        version: &str,
        feature_branches: bool,
    ) -> Result<Vec<String>> {
        let mut args = vec![
            "--integration-versions-including",
            repo,
            "--version",
            version,
        ];
        if feature_branches {
            args.push("--feature-branches");
        }
        let output = self.invoke(&args).await?;
        Ok(parse_lines(&output)
            .iter()
            .map(|line| strip_remote(line).to_string())
            .collect())
    }

    async fn version_of(&self, repo: &str, integration_version: &str) -> Result<String> {
        let output = self
            .invoke(&[
                "--version-of",
                repo,
                "--in-integration-version",
                integration_version,
            ])
            .await?;
        Ok(strip_remote(&output).trim().to_string())
    }

    async fn versioned_repositories(&self, integration_version: &str) -> Result<Vec<String>> {
        let output = self
            .invoke(&["--list", "--in-integration-version", integration_version])
            .await?;
        Ok(parse_lines(&output))
    }

    async fn update_checkout(&self) -> Result<()> {
        let args: Vec<String> = ["pull", "--rebase", "origin"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let outcome =
            tokio::time::timeout(UPDATE_TIMEOUT, self.git.run(&self.integration_dir, &args)).await;
        match outcome {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(BotError::Git {
                args,
                output: format!("timed out after {}s", UPDATE_TIMEOUT.as_secs()),
                status: "killed".to_string(),
            }),
        }
    }
}

/// Serializes every use of the shared integration checkout.
pub struct IntegrationCheckout {
    lock: Mutex<()>,
    resolver: Arc<dyn VersionResolver>,
}

/// Exclusive access to the integration checkout, held until dropped.
pub struct CheckoutGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    resolver: &'a dyn VersionResolver,
}

impl IntegrationCheckout {
    pub fn new(resolver: Arc<dyn VersionResolver>) -> Self {
        Self {
            lock: Mutex::new(()),
            resolver,
        }
    }

    pub async fn lock(&self) -> CheckoutGuard<'_> {
        let guard = self.lock.lock().await;
        CheckoutGuard {
            _guard: guard,
            resolver: self.resolver.as_ref(),
        }
    }
}

impl CheckoutGuard<'_> {
    pub fn resolver(&self) -> &dyn VersionResolver {
        self.resolver
    }

    /// Refresh the checkout; a failure leaves the previous state usable.
    pub async fn refresh(&self) {
        if let Err(err) = self.resolver.update_checkout().await {
            log::warn!("failed to 'git pull' integration folder: {err}");
        } else {
            info!("Updated the integration checkout");
        }
    }
}
