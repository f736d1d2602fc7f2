use crate::config::{GitProtocol, Registry};
use crate::error::{BotError, Result};

/// Clone URL of a repository on GitHub.
pub fn github_remote_url(protocol: GitProtocol, org: &str, repo: &str) -> String {
    match protocol {
        GitProtocol::Ssh => format!("git@github.com:/{org}/{repo}.git"),
        GitProtocol::Https => format!("https://github.com/{org}/{repo}"),
    }
}

/// Push URL of the GitLab mirror of a GitHub repository.
///
/// Repositories default to `Northern.tech/<group>/<repo>` where the group is
/// mapped from the GitHub organization; custom projects override that.
pub fn gitlab_remote_url(registry: &Registry, org: &str, repo: &str) -> Result<String> {
    let group = registry
        .organization_groups
        .get(org)
        .ok_or_else(|| BotError::RemoteResolution(org.to_string()))?;

    if let Some(project) = registry.custom_projects.get(repo) {
        return Ok(format!("git@gitlab.com:{project}"));
    }
    Ok(format!("git@gitlab.com:Northern.tech/{group}/{repo}"))
}

/// GitLab project path (`group/.../repo`) of a mirror.
pub fn gitlab_project_path(registry: &Registry, org: &str, repo: &str) -> Result<String> {
    let url = gitlab_remote_url(registry, org, repo)?;
    url.split_once(':')
        .map(|(_, path)| path.to_string())
        .ok_or_else(|| {
            BotError::RemoteResolution(format!(
                "invalid GitLab URL '{url}': failed to start GitLab pipeline"
            ))
        })
}
