//! Changelog previews posted on pull requests.

use async_trait::async_trait;
use log::{debug, error, info};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tokio::process::Command;

use crate::error::{BotError, Result};
use crate::providers::github::types::PullRequest;
use crate::providers::HostingService;

pub const CHANGELOG_PREFIX: &str =
    "Merging these commits will result in the following changelog entries:\n\n";
const WARNING_HEADER: &str =
    "\n\n## Warning\n\nGenerating changelogs also resulted in these warnings:\n\n";
const EMPTY_CHANGELOG_SUFFIX: &str = "### Changelogs\n\n";

static NUMBERED_COMMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Commit [0-9a-f]{40} had a number").expect("valid regex"));

/// Generator output: the Markdown changelog and any warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changelog {
    pub text: String,
    pub warnings: String,
}

impl Changelog {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() || self.text.ends_with(EMPTY_CHANGELOG_SUFFIX)
    }

    pub fn comment_text(&self) -> String {
        let mut comment = format!("{CHANGELOG_PREFIX}{}", self.text);
        if !self.warnings.is_empty() {
            comment.push_str(WARNING_HEADER);
            comment.push_str(&self.warnings);
        }
        comment
    }
}

#[async_trait]
pub trait ChangelogSource: Send + Sync {
    /// Changelog of `repo` for a `base..head` range.
    async fn generate(&self, repo: &str, range: &str) -> Result<Changelog>;
}

/// `changelog-generator` shipped in the integration repository.
pub struct ChangelogGenerator {
    program: PathBuf,
}

impl ChangelogGenerator {
    pub fn new(integration_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: integration_dir
                .into()
                .join("extra/changelog-generator/changelog-generator"),
        }
    }
}

/// Hide commit ids in warnings so amended commits do not produce a new comment.
pub fn normalize_warnings(stderr: &str) -> String {
    NUMBERED_COMMIT
        .replace_all(stderr, "One commit had a number")
        .into_owned()
}

#[async_trait]
impl ChangelogSource for ChangelogGenerator {
    async fn generate(&self, repo: &str, range: &str) -> Result<Changelog> {
        let output = Command::new(&self.program)
            .args([
                "--repo",
                "--sort-changelog",
                "--query-github",
                "--github-repo",
                repo,
                range,
            ])
            .output()
            .await?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        let warnings = normalize_warnings(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return Err(BotError::Process {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                output: format!("{text}{warnings}"),
            });
        }
        Ok(Changelog { text, warnings })
    }
}

/// Changelog of a pull request, with the SHAs of its range shown as ref names.
pub async fn changelog_for_pull_request(
    source: &dyn ChangelogSource,
    repo: &str,
    pr: &PullRequest,
) -> Result<Changelog> {
    let (base, head) = (&pr.base, &pr.head);
    let range = format!("{}..{}", base.sha, head.sha);
    debug!("Getting changelog for repo ({repo}) and range ({range})");

    let mut changelog = source.generate(repo, &range).await?;
    if !base.sha.is_empty() {
        changelog.text = changelog.text.replace(&base.sha, &base.ref_);
    }
    if !head.sha.is_empty() {
        changelog.text = changelog.text.replace(&head.sha, &head.ref_);
    }
    Ok(changelog)
}

/// Keep exactly one up-to-date changelog comment from the bot on the pull request.
pub async fn refresh_changelog_comment(
    hosting: &dyn HostingService,
    bot_login: &str,
    org: &str,
    repo: &str,
    number: u64,
    changelog: &Changelog,
) -> Result<()> {
    let comment_text = changelog.comment_text();
    let previous = hosting
        .list_comments(org, repo, number)
        .await?
        .into_iter()
        .find(|c| c.user.login == bot_login && c.body.contains(CHANGELOG_PREFIX));

    match previous {
        Some(comment) if comment.body == comment_text => {
            debug!(
                "The changelog hasn't changed (comment ID: {}). Leave it alone.",
                comment.id
            );
            return Ok(());
        }
        Some(comment) => {
            debug!(
                "Deleting old changelog comment (comment ID: {}).",
                comment.id
            );
            if let Err(e) = hosting.delete_comment(org, repo, comment.id).await {
                error!("Could not delete changelog comment: {e}");
            }
        }
        None if changelog.is_empty() => {
            info!("Changelog is empty, and there is no previous changelog comment. Stay silent.");
            return Ok(());
        }
        None => {}
    }

    hosting
        .create_comment(org, repo, number, &comment_text)
        .await
}
