//! Mirroring GitHub refs to the GitLab projects that run CI.

use log::{error, info, warn};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::{GitProtocol, Registry};
use crate::error::{BotError, Result};
use crate::git::{GitRunner, GitWorkspace};
use crate::providers::CiService;
use crate::remotes::{github_remote_url, gitlab_project_path, gitlab_remote_url};
use crate::retry::{RetryPolicy, Sleeper, FETCH_DEPTHS};

/// Branches whose mirrored pushes start a pipeline.
const PIPELINE_BRANCHES: [&str; 4] = ["master", "staging", "production", "hosted"];

static PIPELINE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"^[0-9]+\.[0-9]+\.x").expect("valid regex"),
        Regex::new(r"^pr_[0-9]+$").expect("valid regex"),
    ]
});

/// Whether a push of `branch` to GitLab should start a pipeline.
pub fn should_start_pipeline(branch: &str) -> bool {
    PIPELINE_BRANCHES.contains(&branch) || PIPELINE_PATTERNS.iter().any(|re| re.is_match(branch))
}

/// A ref a push event can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PushedRef<'a> {
    Tag(&'a str),
    Branch(&'a str),
}

impl<'a> PushedRef<'a> {
    fn parse(git_ref: &'a str) -> Result<Self> {
        if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
            Ok(Self::Tag(tag))
        } else if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
            Ok(Self::Branch(branch))
        } else {
            Err(BotError::UnrecognizedRef(git_ref.to_string()))
        }
    }
}

/// Where to mirror a repository from and to.
pub struct Mirror<'a> {
    pub git: &'a dyn GitRunner,
    pub registry: &'a Registry,
    pub protocol: GitProtocol,
    pub org: &'a str,
    pub repo: &'a str,
}

impl Mirror<'_> {
    fn github_url(&self) -> String {
        github_remote_url(self.protocol, self.org, self.repo)
    }

    /// A fresh repository with the `github` and `gitlab` remotes.
    async fn workspace(&self) -> Result<GitWorkspace<'_>> {
        let gitlab_url = gitlab_remote_url(self.registry, self.org, self.repo)?;
        let workspace = GitWorkspace::init(self.git).await?;
        workspace.add_remote("github", &self.github_url()).await?;
        workspace.add_remote("gitlab", &gitlab_url).await?;
        Ok(workspace)
    }

    /// Force-push `git_ref` (`refs/heads/...` or `refs/tags/...`) to GitLab.
    ///
    /// History is fetched shallow first and deepened on failure. When every
    /// depth fails the failure is logged and the call still succeeds.
    pub async fn sync_remote_ref(&self, sleeper: &dyn Sleeper, git_ref: &str) -> Result<()> {
        let pushed = PushedRef::parse(git_ref)?;
        gitlab_remote_url(self.registry, self.org, self.repo)?;

        let result = RetryPolicy::fetch_depths()
            .run(
                sleeper,
                |attempt| self.push_ref_at_depth(&pushed, FETCH_DEPTHS[attempt as usize]),
                |_| true,
            )
            .await;

        match result {
            Ok(()) => info!("Pushed ref to GitLab: {}:{git_ref}", self.repo),
            Err(e) => error!(
                "Failed to push ref {git_ref} of {} to GitLab at any fetch depth: {e}",
                self.repo
            ),
        }
        Ok(())
    }

    async fn push_ref_at_depth(&self, pushed: &PushedRef<'_>, depth: Option<u32>) -> Result<()> {
        let outcome = self.push_ref(pushed, depth).await;
        if let Err(e) = &outcome {
            let depth = depth.map_or("full".to_string(), |d| d.to_string());
            warn!(
                "Mirroring {} failed with fetch depth {depth}: {e}",
                self.repo
            );
        }
        outcome
    }

    async fn push_ref(&self, pushed: &PushedRef<'_>, depth: Option<u32>) -> Result<()> {
        let workspace = self.workspace().await?;
        let mut fetch: Vec<String> = vec!["fetch".into()];
        if let Some(depth) = depth {
            fetch.extend(["--depth".to_string(), depth.to_string()]);
        }
        fetch.push("github".into());

        match *pushed {
            PushedRef::Tag(tag) => {
                fetch.extend(["tag".to_string(), tag.to_string()]);
                workspace.run(&fetch).await?;
                workspace.run(["push", "-f", "gitlab", tag]).await?;
            }
            PushedRef::Branch(branch) => {
                fetch.push(branch.to_string());
                workspace.run(&fetch).await?;
                let tracking = format!("github/{branch}");
                workspace
                    .run(["checkout", "-b", branch, tracking.as_str()])
                    .await?;

                let mut push = vec!["push", "-f"];
                let always_skip = self.registry.always_skip_ci.iter().any(|r| r == self.repo);
                if always_skip || !should_start_pipeline(branch) {
                    push.extend(["-o", "ci.skip"]);
                }
                push.extend(["gitlab", branch]);
                workspace.run(push).await?;
            }
        }
        Ok(())
    }

    /// Mirror `pull/<n>/head` to `pr_<n>` without starting a pipeline.
    pub async fn sync_pull_request_branch(&self, number: u64) -> Result<String> {
        let workspace = self.workspace().await?;
        let branch = format!("pr_{number}");

        let refspec = format!("pull/{number}/head:{branch}");
        workspace.run(["fetch", "github", refspec.as_str()]).await?;
        workspace
            .run([
                "push",
                "-f",
                "-o",
                "ci.skip",
                "--set-upstream",
                "gitlab",
                branch.as_str(),
            ])
            .await?;

        info!("Created branch: {}:{branch}", self.repo);
        Ok(branch)
    }
}

/// Delete the `pr_<n>` mirror of a closed pull request.
pub async fn delete_stale_pr_branch(
    ci: &dyn CiService,
    registry: &Registry,
    org: &str,
    repo: &str,
    number: u64,
) -> Result<()> {
    let project = gitlab_project_path(registry, org, repo)?;
    ci.delete_branch(&project, &format!("pr_{number}")).await?;
    info!("Deleted branch: {repo}:pr_{number}");
    Ok(())
}
