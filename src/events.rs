//! Inbound webhook deliveries.

use serde::Deserialize;

use crate::error::Result;
use crate::providers::github::types::{Issue, IssueComment, PullRequest, Repository, User};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    #[serde(default)]
    pub organization: Option<Organization>,
    #[serde(default)]
    pub sender: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentEvent {
    pub action: String,
    pub issue: Issue,
    pub comment: IssueComment,
    pub repository: Repository,
    #[serde(default)]
    pub sender: User,
}

/// The webhook deliveries the bot acts on.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PullRequest(PullRequestEvent),
    Push(PushEvent),
    Comment(CommentEvent),
}

impl WebhookEvent {
    /// Decode a delivery given its `X-GitHub-Event` type.
    ///
    /// Event types the bot does not handle yield `Ok(None)`.
    pub fn parse(event_type: &str, payload: &[u8]) -> Result<Option<Self>> {
        let event = match event_type {
            "pull_request" => Self::PullRequest(serde_json::from_slice(payload)?),
            "push" => Self::Push(serde_json::from_slice(payload)?),
            "issue_comment" => Self::Comment(serde_json::from_slice(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PullRequest(_) => "pull_request",
            Self::Push(_) => "push",
            Self::Comment(_) => "issue_comment",
        }
    }

    /// GitHub organization the event belongs to.
    pub fn organization(&self) -> Option<&str> {
        let org = match self {
            Self::PullRequest(event) => event.organization.as_ref().map(|o| o.login.as_str()),
            Self::Push(event) => event.repository.organization.as_deref(),
            Self::Comment(event) => Some(event.repository.owner.login.as_str()),
        };
        org.filter(|org| !org.is_empty())
    }
}

impl PullRequestEvent {
    pub fn repo(&self) -> &str {
        &self.repository.name
    }
}

impl CommentEvent {
    /// Pull request number, when the comment was made on a pull request.
    pub fn pull_request_number(&self) -> Option<u64> {
        let link = self.issue.pull_request.as_ref()?;
        link.url.rsplit('/').next()?.parse().ok()
    }
}
