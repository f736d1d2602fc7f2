use log::info;

use crate::config::Registry;
use crate::error::Result;
use crate::providers::github::types::PullRequest;
use crate::release_tool::CheckoutGuard;

/// One (repository, integration branch) build a pull request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub repo: String,
    pub pr: u64,
    /// Integration branch the build runs against
    pub base_branch: String,
    pub commit_sha: String,
    /// Build and test device images
    pub qemu: bool,
}

/// Builds needed to test `pr` of `repo`.
///
/// The meta layer and the integration repository are built once against the
/// pull request's own base branch. Any other repository is built against
/// every integration branch that currently pins it at that base branch.
pub async fn build_plan(
    checkout: &CheckoutGuard<'_>,
    registry: &Registry,
    repo: &str,
    pr: &PullRequest,
) -> Result<Vec<BuildTarget>> {
    checkout.refresh().await;

    let base_branch = pr.base.branch();
    let target = |branch: &str| BuildTarget {
        repo: repo.to_string(),
        pr: pr.number,
        base_branch: branch.to_string(),
        commit_sha: pr.head.sha.clone(),
        qemu: registry.needs_qemu(repo),
    };

    if registry.is_meta(repo) || registry.is_integration(repo) {
        return Ok(vec![target(base_branch)]);
    }

    let branches = checkout
        .resolver()
        .integration_versions_including(repo, base_branch, registry.is_feature_branch(base_branch))
        .await?;

    let mut targets: Vec<BuildTarget> = Vec::with_capacity(branches.len());
    for branch in &branches {
        // integration/staging pins unreleased components at master too
        if base_branch == "master" && branch == "staging" {
            continue;
        }
        if targets.iter().any(|t| t.base_branch == *branch) {
            continue;
        }
        targets.push(target(branch));
    }

    let branches: Vec<_> = targets.iter().map(|t| t.base_branch.as_str()).collect();
    info!("{repo}/{base_branch} is being used in the following integration: {branches:?}");
    Ok(targets)
}
