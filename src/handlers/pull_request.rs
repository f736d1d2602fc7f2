use log::{debug, error, info, warn};

use super::{Bot, PIPELINE_ERROR, SYNC_ERROR};
use crate::changelog::{changelog_for_pull_request, refresh_changelog_comment};
use crate::cherry_pick::{suggest_cherry_picks, ReleaseLookup};
use crate::command::BuildOptions;
use crate::error::Result;
use crate::events::PullRequestEvent;
use crate::pipeline::{
    assemble_variables, build_plan, start_pull_request_pipeline, stop_stale_pipelines,
};
use crate::sync::delete_stale_pr_branch;

/// Actions after which the pull request head may need building.
const BUILD_ACTIONS: [&str; 5] = [
    "opened",
    "edited",
    "reopened",
    "synchronize",
    "ready_for_review",
];

/// Identifies the help comment, so it is posted only once.
const HELP_KEY: &str =
    ", start a full client pipeline with:\n   - mentioning me and `start pipeline`";

const HELP_DETAILS: &str = r#".

   ---

   <details>
   <summary>my commands and options</summary>
   <br />

   You can prevent me from automatically starting CI pipelines:
   - if your pull request title starts with "[NoCI] ..."

   You can trigger a client pipeline on multiple prs with:
   - mentioning me and `start pipeline --pr mender/127 --pr mender-connect/255`

   You can skip the integration tests with:
   - mentioning me and `start pipeline --fast`

   You can trigger GitHub->GitLab branch sync with:
   - mentioning me and `sync`

   You can cherry pick to a given branch or branches with:
   - mentioning me and:
   ```
    cherry-pick to:
    * 1.0.x
    * 2.0.x
   ```
   </details>
   "#;

/// Whether the title opens with an option block such as `[NoCI]`.
fn title_skips_ci(title: &str) -> bool {
    let title = title.trim();
    let Some(rest) = title.strip_prefix('[') else {
        return false;
    };
    let Some((options, _)) = rest.split_once(']') else {
        return false;
    };
    options
        .split_whitespace()
        .any(|option| option.eq_ignore_ascii_case("noci"))
}

impl Bot {
    pub(super) async fn handle_pull_request(
        &self,
        org: &str,
        event: &PullRequestEvent,
    ) -> Result<()> {
        let pr = &event.pull_request;
        let repo = event.repo();
        let action = event.action.as_str();

        if pr.draft {
            info!(
                "The PR: {repo}/{} is a draft. Do not run tests",
                event.number
            );
            return Ok(());
        }

        debug!("Processing pull request action {action}");
        match action {
            "opened" | "reopened" | "synchronize" | "ready_for_review" => {
                self.mirror_and_test(org, event).await;
                self.update_changelog(org, event).await;
            }
            "closed" => {
                if let Err(e) = delete_stale_pr_branch(
                    self.ci.as_ref(),
                    &self.config.registry,
                    org,
                    repo,
                    event.number,
                )
                .await
                {
                    error!(
                        "Failed to delete the stale PR branch after {repo}#{} was closed: {e}",
                        event.number
                    );
                }

                let releases = ReleaseLookup {
                    checkout: &self.checkout,
                    versions_url: &self.config.runner.versions_url,
                };
                if let Err(e) = suggest_cherry_picks(
                    &self.cherry_picker(repo),
                    self.hosting.as_ref(),
                    &self.config.registry,
                    &releases,
                    event,
                )
                .await
                {
                    error!(
                        "Failed to suggest cherry picks for {repo}#{}: {e}",
                        event.number
                    );
                }
            }
            _ => {}
        }

        let sender = event.sender.login.as_str();
        if !self.hosting.is_organization_member(org, sender).await {
            warn!(
                "{sender} is making a pullrequest, but is not a member of our organization, \
                 ignoring"
            );
            return Ok(());
        }

        if action == "closed" {
            if let Err(e) = self.stop_stale_builds(event).await {
                error!(
                    "Failed to stop a stale build after {repo}#{} was closed: {e}",
                    event.number
                );
            }
        }

        if BUILD_ACTIONS.contains(&action) {
            self.offer_help(org, event).await;
        }
        Ok(())
    }

    /// Mirror the head to `pr_<n>` and start its pipeline there.
    async fn mirror_and_test(&self, org: &str, event: &PullRequestEvent) {
        let repo = event.repo();
        if let Err(e) = self
            .mirror(org, repo)
            .sync_pull_request_branch(event.number)
            .await
        {
            error!("Could not create PR branch: {e}");
            self.say(org, repo, event.number, SYNC_ERROR).await;
            return;
        }

        if title_skips_ci(&event.pull_request.title) {
            info!(
                "Skipping the pipeline of {repo}#{} on request",
                event.number
            );
            return;
        }
        let started = start_pull_request_pipeline(
            self.ci.as_ref(),
            self.sleeper.as_ref(),
            &self.config.registry,
            org,
            &event.repository,
            &event.pull_request,
        )
        .await;
        if let Err(e) = started {
            error!("failed to start client pipeline for PR: {e}");
            self.say(org, repo, event.number, PIPELINE_ERROR).await;
        }
    }

    async fn update_changelog(&self, org: &str, event: &PullRequestEvent) {
        let pr = &event.pull_request;
        let Some(base_repo) = pr.base.repo.as_ref() else {
            info!("Pull request without a base repository. Ignoring.");
            return;
        };
        if base_repo.owner.login != self.config.registry.upstream_organization {
            info!(
                "Not a {} repository. Ignoring.",
                self.config.registry.upstream_organization
            );
            return;
        }

        let changelog =
            changelog_for_pull_request(self.changelog.as_ref(), &base_repo.name, pr).await;
        let changelog = match changelog {
            Ok(changelog) => changelog,
            Err(e) => {
                error!("Error while fetching changelog text: {e}");
                return;
            }
        };
        if let Err(e) = refresh_changelog_comment(
            self.hosting.as_ref(),
            &self.config.github.bot_login,
            org,
            event.repo(),
            event.number,
            &changelog,
        )
        .await
        {
            error!("Could not post changelog comment: {e}");
        }
    }

    /// Cancel the client pipelines still building a closed pull request.
    async fn stop_stale_builds(&self, event: &PullRequestEvent) -> Result<()> {
        let registry = &self.config.registry;
        let variable_sets = {
            let checkout = self.checkout.lock().await;
            let targets = build_plan(&checkout, registry, event.repo(), &event.pull_request).await?;
            let options = BuildOptions::default();
            let mut sets = Vec::with_capacity(targets.len());
            for target in &targets {
                sets.push(assemble_variables(&checkout, registry, target, &options).await?);
            }
            sets
        };

        for variables in &variable_sets {
            stop_stale_pipelines(
                self.ci.as_ref(),
                &self.config.gitlab.client_pipeline_path,
                &self.config.github.bot_login,
                variables,
            )
            .await;
        }
        Ok(())
    }

    /// Tell members how to start a client pipeline, once per pull request.
    async fn offer_help(&self, org: &str, event: &PullRequestEvent) {
        let repo = event.repo();
        let targets = {
            let checkout = self.checkout.lock().await;
            build_plan(&checkout, &self.config.registry, repo, &event.pull_request).await
        };
        let targets = match targets {
            Ok(targets) => targets,
            Err(e) => {
                error!("failed to get the builds of {repo}#{}: {e}", event.number);
                return;
            }
        };
        info!(
            "{repo}:{} would trigger {} builds",
            event.number,
            targets.len()
        );
        if targets.is_empty() {
            return;
        }

        if self
            .has_bot_comment(org, repo, event.number, HELP_KEY)
            .await
        {
            info!(
                "I have already commented on the pr: {repo}/{}, no need to keep on nagging",
                event.number
            );
            return;
        }
        let message = format!("@{}{HELP_KEY}{HELP_DETAILS}", event.sender.login);
        self.say(org, repo, event.number, &message).await;
    }

    async fn has_bot_comment(&self, org: &str, repo: &str, number: u64, needle: &str) -> bool {
        match self.hosting.list_comments(org, repo, number).await {
            Ok(comments) => comments
                .iter()
                .any(|c| c.user.login == self.config.github.bot_login && c.body.contains(needle)),
            Err(e) => {
                error!("Failed to list the comments on PR: {repo}/{number}, err: '{e}'");
                false
            }
        }
    }
}
