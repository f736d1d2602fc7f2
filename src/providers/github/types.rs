use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub account (user, bot or organization).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub login: String,
    /// Display name, only present on some payloads
    #[serde(default)]
    pub name: Option<String>,
}

/// Repository as embedded in webhook payloads and pull requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub owner: User,
    #[serde(default)]
    pub ssh_url: Option<String>,
    /// Organization login; only push payloads carry it as a plain string
    #[serde(default)]
    pub organization: Option<String>,
}

/// One side (head or base) of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestBranch {
    /// `owner:branch`
    #[serde(default)]
    pub label: String,
    #[serde(rename = "ref", default)]
    pub ref_: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub repo: Option<Repository>,
}

impl PullRequestBranch {
    /// Branch name part of the `owner:branch` label, falling back to the ref.
    pub fn branch(&self) -> &str {
        self.label
            .split_once(':')
            .map_or(self.ref_.as_str(), |(_, branch)| branch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub head: PullRequestBranch,
    #[serde(default)]
    pub base: PullRequestBranch,
}

/// Body of a pull request creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Link to the pull request an issue represents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePullRequestLinks {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    /// Only set when the issue is a pull request
    #[serde(default)]
    pub pull_request: Option<IssuePullRequestLinks>,
}

