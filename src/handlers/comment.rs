use log::{error, info, warn};

use super::{Bot, PIPELINE_ERROR, SYNC_ERROR};
use crate::command::{parse_command, BuildOptions, Command};
use crate::conventional::{failure_comment, mark_conventional};
use crate::error::Result;
use crate::events::CommentEvent;
use crate::pipeline::{
    assemble_variables, build_plan, create_pipeline_with_retry, pipeline_comment,
    stop_stale_pipelines,
};
use crate::providers::github::types::PullRequest;

impl Bot {
    pub(super) async fn handle_comment(&self, org: &str, event: &CommentEvent) -> Result<()> {
        if event.action != "created" {
            info!("Ignoring action {} on comment", event.action);
            return Ok(());
        }

        let sender = event.sender.login.as_str();
        let bot_login = self.config.github.bot_login.as_str();
        if !self.hosting.is_organization_member(org, sender).await {
            warn!("{sender} commented, but is not a member of our organization, ignoring");
            return Ok(());
        }
        if sender == bot_login {
            warn!("{sender} commented, probably giving instructions, ignoring");
            return Ok(());
        }

        let body = event.comment.body.as_str();
        if !body.contains(&format!("@{bot_login}")) {
            info!("ignoring comment not mentioning me");
            return Ok(());
        }
        let Some(number) = event.pull_request_number() else {
            warn!("ignoring comment not on a pull request");
            return Ok(());
        };

        let repo = event.repository.name.as_str();
        let pr = self.hosting.get_pull_request(org, repo, number).await?;

        let dependency_bot = self.config.registry.dependency_bot.as_str();
        let command = match parse_command(body, &pr.user.login, dependency_bot) {
            Ok(Some(command)) => command,
            Ok(None) => {
                warn!("no command found: {body}");
                return Ok(());
            }
            Err(e) => {
                let message = format!("There was an error while parsing arguments: {e}");
                self.say(org, repo, number, &message).await;
                return Err(e.source);
            }
        };

        info!("Running {} on {repo}#{number}", command.kind());
        match command {
            Command::StartPipeline(options) => {
                self.start_client_pipelines(org, repo, &pr, &options).await
            }
            Command::CherryPick(targets) => {
                info!("Attempting to cherry-pick the changes in PR: {repo}/{number}");
                self.cherry_picker(repo)
                    .cherry_pick(
                        self.hosting.as_ref(),
                        &pr,
                        &event.issue.title,
                        &event.sender,
                        &targets,
                    )
                    .await
                    .map(|_| ())
            }
            Command::MarkConventional(commit_type) => {
                info!(
                    "Attempting to make the PR: {repo}/{number} and commit: {} a conventional \
                     commit",
                    pr.head.sha
                );
                if let Err(e) = mark_conventional(self.git.as_ref(), &pr, commit_type).await {
                    self.say(org, repo, number, &failure_comment(&e)).await;
                    return Err(e);
                }
                Ok(())
            }
            Command::Sync => {
                if let Err(e) = self
                    .mirror(org, repo)
                    .sync_pull_request_branch(number)
                    .await
                {
                    error!("There was an error syncing branches: {e}");
                    self.say(org, repo, number, SYNC_ERROR).await;
                }
                Ok(())
            }
        }
    }

    /// Start one client pipeline per build target of `pr`.
    async fn start_client_pipelines(
        &self,
        org: &str,
        repo: &str,
        pr: &PullRequest,
        options: &BuildOptions,
    ) -> Result<()> {
        let registry = &self.config.registry;
        let planned = {
            let checkout = self.checkout.lock().await;
            let targets = match build_plan(&checkout, registry, repo, pr).await {
                Ok(targets) => targets,
                Err(e) => {
                    error!("Could not get the builds of {repo}#{}: {e}", pr.number);
                    self.say(org, repo, pr.number, PIPELINE_ERROR).await;
                    return Err(e);
                }
            };
            info!("{repo}:{} will trigger {} builds", pr.number, targets.len());

            let mut planned = Vec::with_capacity(targets.len());
            for target in targets {
                if registry.is_meta(&target.repo) && target.base_branch == "master-next" {
                    info!("Skipping build targeting {}:master-next", target.repo);
                    continue;
                }
                match assemble_variables(&checkout, registry, &target, options).await {
                    Ok(variables) => planned.push(variables),
                    Err(e) => {
                        error!("Could not start build on {}: {e}", target.base_branch);
                        self.say(org, repo, pr.number, PIPELINE_ERROR).await;
                    }
                }
            }
            planned
        };

        let project = self.config.gitlab.client_pipeline_path.as_str();
        for variables in &planned {
            stop_stale_pipelines(
                self.ci.as_ref(),
                project,
                &self.config.github.bot_login,
                variables,
            )
            .await;

            let created = create_pipeline_with_retry(
                self.ci.as_ref(),
                self.sleeper.as_ref(),
                project,
                &self.config.gitlab.pipeline_ref,
                &variables.to_variables(),
            )
            .await;
            match created {
                Ok(Some(pipeline)) => {
                    let comment = pipeline_comment(&pipeline, variables);
                    self.say(org, repo, pr.number, &comment).await
                }
                Ok(None) => info!("{project} has nothing to run for {repo}#{}", pr.number),
                Err(e) => {
                    error!("Could not start build: {e}");
                    self.say(org, repo, pr.number, PIPELINE_ERROR).await;
                }
            }
        }
        Ok(())
    }
}
