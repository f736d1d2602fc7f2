//! Hand-off of webhook deliveries to the bot.

use log::{error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::RunnerConfig;
use crate::events::WebhookEvent;
use crate::handlers::Bot;

/// Runs each delivery in its own task, or inline in dry-run mode.
#[derive(Clone)]
pub struct Dispatcher {
    bot: Arc<Bot>,
}

impl Dispatcher {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }

    fn enabled(runner: &RunnerConfig, event: &WebhookEvent) -> bool {
        match event {
            WebhookEvent::PullRequest(_) => runner.process_pr_events,
            WebhookEvent::Push(_) => runner.process_push_events,
            WebhookEvent::Comment(_) => runner.process_comment_events,
        }
    }

    /// Start processing `event`.
    ///
    /// Returns the handle of the spawned task, or `None` when the event was
    /// skipped or already processed inline.
    pub async fn dispatch(&self, event: WebhookEvent) -> Option<JoinHandle<()>> {
        let runner = &self.bot.config().runner;
        if !Self::enabled(runner, &event) {
            info!("Webhook event {} processing is skipped", event.event_type());
            return None;
        }

        if runner.dry_run {
            process(&self.bot, event).await;
            return None;
        }
        let bot = Arc::clone(&self.bot);
        Some(tokio::spawn(async move { process(&bot, event).await }))
    }
}

async fn process(bot: &Bot, event: WebhookEvent) {
    let start = Instant::now();
    let result = bot.handle(&event).await;
    let latency = start.elapsed();
    match result {
        Ok(()) => info!(
            "successfully processed {} event in {latency:?}",
            event.event_type()
        ),
        Err(e) => error!(
            "failed to process {} event after {latency:?}: {e}",
            event.event_type()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{Changelog, ChangelogSource};
    use crate::config::Config;
    use crate::error::Result;
    use crate::git::testing::ScriptedGit;
    use crate::handlers::Services;
    use crate::providers::github::testing::FakeHosting;
    use crate::providers::gitlab::testing::FakeCi;
    use crate::release_tool::testing::FakeResolver;
    use crate::request_log::RequestLog;
    use crate::retry::RecordingSleeper;
    use async_trait::async_trait;

    struct NoChangelog;

    #[async_trait]
    impl ChangelogSource for NoChangelog {
        async fn generate(&self, _repo: &str, _range: &str) -> Result<Changelog> {
            Ok(Changelog::default())
        }
    }

    fn dispatcher(config: Config, git: Arc<ScriptedGit>) -> Dispatcher {
        let services = Services {
            hosting: Arc::new(FakeHosting::new()),
            ci: Arc::new(FakeCi::new()),
            git,
            resolver: Arc::new(FakeResolver::new()),
            changelog: Arc::new(NoChangelog),
            sleeper: Arc::new(RecordingSleeper::new()),
        };
        Dispatcher::new(Arc::new(Bot::new(config, services, RequestLog::new())))
    }

    fn push() -> WebhookEvent {
        let payload = br#"{"ref": "refs/heads/master",
            "repository": {"name": "mender", "organization": "mendersoftware"}}"#;
        WebhookEvent::parse("push", payload).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_disabled_events_are_skipped() {
        let mut config = Config::default();
        config.runner.process_push_events = false;
        let git = Arc::new(ScriptedGit::new());

        let handle = dispatcher(config, git.clone()).dispatch(push()).await;
        assert!(handle.is_none());
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_processes_inline() {
        let mut config = Config::default();
        config.runner.dry_run = true;
        let git = Arc::new(ScriptedGit::new());

        let handle = dispatcher(config, git.clone()).dispatch(push()).await;
        assert!(handle.is_none());
        assert!(git.calls().contains(&"push -f gitlab master".to_string()));
    }

    #[tokio::test]
    async fn test_events_are_spawned() {
        let git = Arc::new(ScriptedGit::new());

        let handle = dispatcher(Config::default(), git.clone())
            .dispatch(push())
            .await
            .expect("spawned");
        handle.await.unwrap();
        assert!(git.calls().contains(&"push -f gitlab master".to_string()));
    }
}
