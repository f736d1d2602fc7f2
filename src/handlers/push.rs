use log::debug;

use super::Bot;
use crate::error::Result;
use crate::events::PushEvent;

impl Bot {
    pub(super) async fn handle_push(&self, org: &str, event: &PushEvent) -> Result<()> {
        let repo = event.repository.name.as_str();
        debug!("Got push event :: repo {repo} :: ref {}", event.ref_);

        let managed = &self.config.runner.sync_repos;
        if !managed.is_empty() && !managed.iter().any(|r| r == repo) {
            debug!("{repo} is not in the sync list, ignoring");
            return Ok(());
        }

        debug!("Syncing repo {org}/{repo}");
        self.mirror(org, repo)
            .sync_remote_ref(self.sleeper.as_ref(), &event.ref_)
            .await
    }
}
