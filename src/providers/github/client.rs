use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::request_log::RequestLog;

use super::types::{IssueComment, NewPullRequest, PullRequest};
use super::HostingService;

const PER_PAGE: usize = 100;

/// GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for GitHub API
    base_url: String,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `token` - Optional GitHub personal access token
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("relaybot/0.4"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| BotError::Config(format!("Invalid GitHub token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(BotError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HostingService for GitHubClient {
    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        let url = self.url(&format!("/repos/{org}/{repo}/issues/{number}/comments"));
        let response = self
            .client
            .post(&url)
            .json(&CommentBody { body })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_comments(&self, org: &str, repo: &str, number: u64) -> Result<Vec<IssueComment>> {
        let mut all_comments = Vec::new();
        let mut page = 1;

        loop {
            let url = self.url(&format!(
                "/repos/{org}/{repo}/issues/{number}/comments\
                 ?sort=created&direction=asc&per_page={PER_PAGE}&page={page}"
            ));
            let response = Self::check(self.client.get(&url).send().await?).await?;
            let comments: Vec<IssueComment> = response.json().await?;
            let count = comments.len();
            all_comments.extend(comments);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(
            "Fetched {} comments on {org}/{repo}#{number}",
            all_comments.len()
        );
        Ok(all_comments)
    }

    async fn delete_comment(&self, org: &str, repo: &str, comment_id: u64) -> Result<()> {
        let url = self.url(&format!("/repos/{org}/{repo}/issues/comments/{comment_id}"));
        Self::check(self.client.delete(&url).send().await?).await?;
        Ok(())
    }

    async fn get_pull_request(&self, org: &str, repo: &str, number: u64) -> Result<PullRequest> {
        let url = self.url(&format!("/repos/{org}/{repo}/pulls/{number}"));
        let response = Self::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn create_pull_request(
        &self,
        org: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest> {
        let url = self.url(&format!("/repos/{org}/{repo}/pulls"));
        let response = Self::check(self.client.post(&url).json(pr).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn is_organization_member(&self, org: &str, user: &str) -> bool {
        let url = self.url(&format!("/orgs/{org}/members/{user}"));
        match self.client.get(&url).send().await {
            Ok(response) => response.status() == StatusCode::NO_CONTENT,
            Err(e) => {
                warn!("Failed to check membership of {user} in {org}: {e}");
                false
            }
        }
    }
}

/// Records writes in the request log; reads go to the wrapped client.
pub struct DryRunHosting {
    log: RequestLog,
    reader: GitHubClient,
}

impl DryRunHosting {
    pub fn new(log: RequestLog, reader: GitHubClient) -> Self {
        Self { log, reader }
    }
}

#[async_trait]
impl HostingService for DryRunHosting {
    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        let comment = serde_json::to_string(&CommentBody { body })?;
        self.log.push(format!(
            "github.CreateComment: org={org},repo={repo},number={number},comment={comment}"
        ));
        Ok(())
    }

    async fn list_comments(&self, org: &str, repo: &str, number: u64) -> Result<Vec<IssueComment>> {
        self.reader.list_comments(org, repo, number).await
    }

    async fn delete_comment(&self, org: &str, repo: &str, comment_id: u64) -> Result<()> {
        self.log
            .push(format!("github.DeleteComment: org={org},repo={repo},id={comment_id}"));
        Ok(())
    }

    async fn get_pull_request(&self, org: &str, repo: &str, number: u64) -> Result<PullRequest> {
        self.reader.get_pull_request(org, repo, number).await
    }

    async fn create_pull_request(
        &self,
        org: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest> {
        let body = serde_json::to_string(pr)?;
        self.log
            .push(format!("github.CreatePullRequest: org={org},repo={repo},pr={body}"));
        Ok(PullRequest::default())
    }

    async fn is_organization_member(&self, org: &str, user: &str) -> bool {
        self.log
            .push(format!("github.IsOrganizationMember: org={org},user={user}"));
        true
    }
}
