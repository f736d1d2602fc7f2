mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{IssueComment, NewPullRequest, PullRequest};

pub use client::{DryRunHosting, GitHubClient};

/// The source-hosting service the bot comments on and opens pull requests in.
#[async_trait]
pub trait HostingService: Send + Sync {
    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()>;

    /// Comments on an issue or pull request, oldest first.
    async fn list_comments(&self, org: &str, repo: &str, number: u64) -> Result<Vec<IssueComment>>;

    async fn delete_comment(&self, org: &str, repo: &str, comment_id: u64) -> Result<()>;

    async fn get_pull_request(&self, org: &str, repo: &str, number: u64) -> Result<PullRequest>;

    async fn create_pull_request(
        &self,
        org: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest>;

    /// Lookup failures count as "not a member".
    async fn is_organization_member(&self, org: &str, user: &str) -> bool;
}
