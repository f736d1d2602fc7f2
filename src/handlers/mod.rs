//! Webhook event handling.

mod comment;
mod pull_request;
mod push;

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::changelog::{ChangelogGenerator, ChangelogSource};
use crate::cherry_pick::CherryPicker;
use crate::config::Config;
use crate::error::Result;
use crate::events::WebhookEvent;
use crate::git::{DryRunGit, GitRunner, SystemGit};
use crate::providers::{
    CiService, DryRunCi, DryRunHosting, GitHubClient, GitLabClient, HostingService,
};
use crate::release_tool::{IntegrationCheckout, ReleaseTool, VersionResolver};
use crate::request_log::RequestLog;
use crate::retry::{Sleeper, TokioSleeper};
use crate::sync::Mirror;

/// Shown when mirroring a pull request branch fails.
pub const SYNC_ERROR: &str = "There was an error syncing branches, see the bot logs for details.";

/// Shown when a pipeline could not be started.
pub const PIPELINE_ERROR: &str =
    "There was an error running your pipeline, see the bot logs for details.";

type Clients = (Arc<dyn HostingService>, Arc<dyn CiService>, Arc<dyn GitRunner>);

/// The collaborators the bot acts through.
pub struct Services {
    pub hosting: Arc<dyn HostingService>,
    pub ci: Arc<dyn CiService>,
    pub git: Arc<dyn GitRunner>,
    pub resolver: Arc<dyn VersionResolver>,
    pub changelog: Arc<dyn ChangelogSource>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// Everything needed to act on webhook events.
pub struct Bot {
    config: Config,
    hosting: Arc<dyn HostingService>,
    ci: Arc<dyn CiService>,
    git: Arc<dyn GitRunner>,
    checkout: IntegrationCheckout,
    changelog: Arc<dyn ChangelogSource>,
    sleeper: Arc<dyn Sleeper>,
    request_log: RequestLog,
}

impl Bot {
    pub fn new(config: Config, services: Services, request_log: RequestLog) -> Self {
        Self {
            config,
            hosting: services.hosting,
            ci: services.ci,
            git: services.git,
            checkout: IntegrationCheckout::new(services.resolver),
            changelog: services.changelog,
            sleeper: services.sleeper,
            request_log,
        }
    }

    /// Wire up the real clients, or the recording ones in dry-run mode.
    pub fn from_config(config: Config) -> Result<Self> {
        let request_log = RequestLog::new();
        let github = GitHubClient::new(
            &config.github.base_url,
            config.github.token.as_deref(),
            Duration::from_secs(config.github.timeout_secs),
        )?;

        let (hosting, ci, git): Clients = if config.runner.dry_run {
            info!("Running in dry-run mode, side effects are recorded only");
            (
                Arc::new(DryRunHosting::new(request_log.clone(), github)),
                Arc::new(DryRunCi::new(request_log.clone())),
                Arc::new(DryRunGit::new(request_log.clone())),
            )
        } else {
            let gitlab = GitLabClient::new(
                &config.gitlab.base_url,
                config.gitlab.token.as_deref(),
                Duration::from_secs(config.gitlab.timeout_secs),
            )?;
            (Arc::new(github), Arc::new(gitlab), Arc::new(SystemGit))
        };

        let integration_dir = config.runner.integration_directory.clone();
        let services = Services {
            hosting,
            ci,
            resolver: Arc::new(ReleaseTool::new(&integration_dir, git.clone())),
            git,
            changelog: Arc::new(ChangelogGenerator::new(&integration_dir)),
            sleeper: Arc::new(TokioSleeper),
        };
        Ok(Self::new(config, services, request_log))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.request_log
    }

    /// Route one event to its handler.
    pub async fn handle(&self, event: &WebhookEvent) -> Result<()> {
        let Some(org) = event.organization() else {
            warn!(
                "ignoring {} event without an organization",
                event.event_type()
            );
            return Ok(());
        };
        let org = org.to_string();

        match event {
            WebhookEvent::PullRequest(pr) => self.handle_pull_request(&org, pr).await,
            WebhookEvent::Push(push) => self.handle_push(&org, push).await,
            WebhookEvent::Comment(comment) => self.handle_comment(&org, comment).await,
        }
    }

    fn mirror<'a>(&'a self, org: &'a str, repo: &'a str) -> Mirror<'a> {
        Mirror {
            git: self.git.as_ref(),
            registry: &self.config.registry,
            protocol: self.config.github.protocol,
            org,
            repo,
        }
    }

    fn cherry_picker<'a>(&'a self, repo: &'a str) -> CherryPicker<'a> {
        CherryPicker {
            git: self.git.as_ref(),
            protocol: self.config.github.protocol,
            upstream_org: &self.config.registry.upstream_organization,
            repo,
        }
    }

    /// Post a comment, logging failures.
    async fn say(&self, org: &str, repo: &str, number: u64, body: &str) {
        if let Err(e) = self.hosting.create_comment(org, repo, number, body).await {
            info!("Failed to comment on the pr: {repo}#{number}, Error: {e}");
        }
    }
}
