//! Rewriting the head commit of a pull request into a conventional commit.

use log::info;

use crate::command::CommitType;
use crate::error::{BotError, Result};
use crate::git::{GitRunner, GitWorkspace};
use crate::providers::github::types::PullRequest;

const CHANGELOG_TRAILERS: &str = "Changelog: All\nTicket: None\n";
const SIGN_OFF: &str = "Signed-off-by";

/// Conventional form of a commit message.
///
/// Legacy `Changelog:All: ` and `chore: ` prefixes are dropped, and the
/// changelog trailers go in front of the sign-off when there is one.
pub fn conventional_message(message: &str, commit_type: CommitType) -> String {
    let subject = message.trim();
    let subject = subject.strip_prefix("Changelog:All: ").unwrap_or(subject);
    let subject = subject.strip_prefix("chore: ").unwrap_or(subject);

    let mut rewritten = format!("{commit_type}: {subject}");
    match rewritten.find(SIGN_OFF) {
        Some(at) => rewritten.insert_str(at, CHANGELOG_TRAILERS),
        None => {
            rewritten.push('\n');
            rewritten.push_str(CHANGELOG_TRAILERS);
        }
    }
    rewritten.trim().to_string()
}

/// Amend the head commit of `pr` with a conventional message and force-push it.
pub async fn mark_conventional(
    git: &dyn GitRunner,
    pr: &PullRequest,
    commit_type: CommitType,
) -> Result<()> {
    let clone_url = pr
        .head
        .repo
        .as_ref()
        .and_then(|repo| repo.ssh_url.as_deref())
        .ok_or_else(|| {
            BotError::InvalidCommand(format!("No clone URL for the head of PR #{}", pr.number))
        })?;

    let workspace = GitWorkspace::empty(git)?;
    workspace
        .run([
            "clone",
            "--branch",
            pr.head.ref_.as_str(),
            "--single-branch",
            clone_url,
            ".",
        ])
        .await?;

    let message = workspace
        .run(["--no-pager", "show", "--no-patch", "--format=%B", "HEAD"])
        .await?;
    let rewritten = conventional_message(&message, commit_type);
    info!("Marking PR #{} as {commit_type}", pr.number);

    workspace
        .run(["commit", "--amend", "-m", rewritten.as_str()])
        .await?;
    workspace.run(["push", "--force"]).await?;
    Ok(())
}

/// Comment reporting a failed rewrite.
pub fn failure_comment(err: &BotError) -> String {
    format!("I did my very best, but:\n{err}")
}
