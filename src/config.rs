use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for relaybot.
///
/// Settings are read from a file (TOML, JSON or YAML) and then overridden by
/// the environment variables the deployment sets. The `registry` section
/// replaces the hard-coded repository lists the bot reasons about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// GitHub (hosting service) settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// GitLab (CI service) settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Event processing settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Repository fleet description
    #[serde(default)]
    pub registry: Registry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// Shared secret used to sign webhook deliveries
    pub webhook_secret: Option<String>,

    /// GitHub API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    /// Protocol used for git remotes
    #[serde(default)]
    pub protocol: GitProtocol,

    /// Login of the bot account, used for mentions and comment ownership
    #[serde(default = "default_bot_login")]
    pub bot_login: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GitProtocol {
    #[default]
    Ssh,
    Https,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Project running the client (multi-repository) pipelines
    #[serde(default = "default_client_pipeline_path")]
    pub client_pipeline_path: String,

    /// Ref the client pipelines are created on
    #[serde(default = "default_pipeline_ref")]
    pub pipeline_ref: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// Record side effects instead of performing them, and process events inline
    #[serde(default)]
    pub dry_run: bool,

    /// Checkout of the integration repository used by the release tooling
    #[serde(default = "default_integration_directory")]
    pub integration_directory: PathBuf,

    #[serde(default = "default_true")]
    pub process_push_events: bool,

    #[serde(default = "default_true")]
    pub process_pr_events: bool,

    #[serde(default = "default_true")]
    pub process_comment_events: bool,

    /// Repositories mirrored on push; empty means all of them
    #[serde(default)]
    pub sync_repos: Vec<String>,

    /// Release metadata endpoint
    #[serde(default = "default_versions_url")]
    pub versions_url: String,

    /// Default log filter
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Everything the bot knows about the repository fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Registry {
    /// The umbrella Yocto layer
    #[serde(default = "default_meta_repo")]
    pub meta_repo: String,

    /// The cross-repository integration repository
    #[serde(default = "default_integration_repo")]
    pub integration_repo: String,

    /// Default trunk branch
    #[serde(default = "default_trunk")]
    pub trunk_branch: String,

    #[serde(default = "default_feature_branch_prefix")]
    pub feature_branch_prefix: String,

    /// Toolchain tag used for non-trunk builds of anything but the meta layer
    #[serde(default = "default_latest_stable_toolchain")]
    pub latest_stable_toolchain: String,

    /// Repositories that need a device-image build
    #[serde(default = "default_qemu_repositories")]
    pub qemu_repositories: Vec<String>,

    /// Client components with long-term-support releases
    #[serde(default = "default_client_repositories")]
    pub client_repositories: Vec<String>,

    /// Repositories for which cherry-picks are suggested
    #[serde(default = "default_lts_repositories")]
    pub lts_repositories: Vec<String>,

    /// GitHub organization -> GitLab group
    #[serde(default = "default_organization_groups")]
    pub organization_groups: IndexMap<String, String>,

    /// Repositories living outside their organization's group
    #[serde(default = "default_custom_projects")]
    pub custom_projects: IndexMap<String, String>,

    /// Repositories whose mirrored pushes never start a pipeline
    #[serde(default = "default_always_skip_ci")]
    pub always_skip_ci: Vec<String>,

    /// Login (substring) of the dependency-update bot
    #[serde(default = "default_dependency_bot")]
    pub dependency_bot: String,

    /// Organization owning the canonical repositories
    #[serde(default = "default_upstream_organization")]
    pub upstream_organization: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            webhook_secret: None,
            base_url: default_github_base_url(),
            protocol: GitProtocol::default(),
            bot_login: default_bot_login(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            client_pipeline_path: default_client_pipeline_path(),
            pipeline_ref: default_pipeline_ref(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            integration_directory: default_integration_directory(),
            process_push_events: true,
            process_pr_events: true,
            process_comment_events: true,
            sync_repos: Vec::new(),
            versions_url: default_versions_url(),
            log_level: default_log_level(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            meta_repo: default_meta_repo(),
            integration_repo: default_integration_repo(),
            trunk_branch: default_trunk(),
            feature_branch_prefix: default_feature_branch_prefix(),
            latest_stable_toolchain: default_latest_stable_toolchain(),
            qemu_repositories: default_qemu_repositories(),
            client_repositories: default_client_repositories(),
            lts_repositories: default_lts_repositories(),
            organization_groups: default_organization_groups(),
            custom_projects: default_custom_projects(),
            always_skip_ci: default_always_skip_ci(),
            dependency_bot: default_dependency_bot(),
            upstream_organization: default_upstream_organization(),
        }
    }
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_bot_login() -> String {
    "mender-test-bot".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_client_pipeline_path() -> String {
    "Northern.tech/Mender/mender-qa".to_string()
}

fn default_pipeline_ref() -> String {
    "master".to_string()
}

fn default_integration_directory() -> PathBuf {
    PathBuf::from("/integration/")
}

fn default_true() -> bool {
    true
}

fn default_versions_url() -> String {
    "https://docs.mender.io/releases/versions.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_meta_repo() -> String {
    "meta-mender".to_string()
}

fn default_integration_repo() -> String {
    "integration".to_string()
}

fn default_trunk() -> String {
    "master".to_string()
}

fn default_feature_branch_prefix() -> String {
    "feature-".to_string()
}

fn default_latest_stable_toolchain() -> String {
    "scarthgap".to_string()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn default_client_repositories() -> Vec<String> {
    strings(&[
        "mender",
        "mender-connect",
        "mender-configure-module",
        "monitor-client",
        "mender-flash",
    ])
}

fn default_qemu_repositories() -> Vec<String> {
    let mut repos = default_client_repositories();
    repos.extend(strings(&["meta-mender", "mender-artifact", "mender-snapshot"]));
    repos
}

fn default_lts_repositories() -> Vec<String> {
    let mut repos = default_client_repositories();
    repos.push("mender-gateway".to_string());
    repos
}

fn default_organization_groups() -> IndexMap<String, String> {
    [
        ("mendersoftware", "Mender"),
        ("cfengine", "CFEngine"),
        ("NorthernTechHQ", "NorthernTechHQ"),
    ]
    .into_iter()
    .map(|(org, group)| (org.to_string(), group.to_string()))
    .collect()
}

fn default_custom_projects() -> IndexMap<String, String> {
    IndexMap::from([(
        "saas".to_string(),
        "Northern.tech/MenderSaaS/saas".to_string(),
    )])
}

fn default_always_skip_ci() -> Vec<String> {
    strings(&["mender-qa"])
}

fn default_dependency_bot() -> String {
    "dependabot".to_string()
}

fn default_upstream_organization() -> String {
    "mendersoftware".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./relaybot.toml, ./relaybot.json, ./relaybot.yaml, ./relaybot.yml
    /// 3. `<config dir>/relaybot/relaybot.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if path.exists() {
                return Self::load_from_path(path);
            }
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let candidates = [
            "relaybot.toml",
            "relaybot.json",
            "relaybot.yaml",
            "relaybot.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("relaybot").join("relaybot.toml"));
        if let Some(path) = user_config {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Apply the deployment's environment variables on top of the file settings.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if var("DRY_RUN").is_some_and(|v| !v.is_empty()) {
            self.runner.dry_run = true;
        }
        if let Some(secret) = var("GITHUB_SECRET") {
            self.github.webhook_secret = Some(secret);
        }
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(token) = var("GITLAB_TOKEN") {
            self.gitlab.token = Some(token);
        }
        if let Some(url) = var("GITLAB_BASE_URL").filter(|v| !v.is_empty()) {
            self.gitlab.base_url = url;
        }
        if let Some(dir) = var("INTEGRATION_DIRECTORY").filter(|v| !v.is_empty()) {
            self.runner.integration_directory = PathBuf::from(dir);
        }
        if var("DISABLE_PUSH_EVENTS_PROCESSING").is_some_and(|v| !v.is_empty()) {
            self.runner.process_push_events = false;
        }
        if var("DISABLE_PR_EVENTS_PROCESSING").is_some_and(|v| !v.is_empty()) {
            self.runner.process_pr_events = false;
        }
        if var("DISABLE_COMMENT_EVENTS_PROCESSING").is_some_and(|v| !v.is_empty()) {
            self.runner.process_comment_events = false;
        }
        if let Some(list) = var("SYNC_REPOS_LIST") {
            self.runner.sync_repos = list
                .split(',')
                .map(str::trim)
                .filter(|repo| !repo.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(level) = var("RELAYBOT_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.runner.log_level = level;
        }
    }

    /// Check that the settings needed to talk to both services are present.
    pub fn validate(&self) -> Result<()> {
        let secret = self.github.webhook_secret.as_deref().unwrap_or("");
        if secret.is_empty() && !self.runner.dry_run {
            anyhow::bail!("set GITHUB_SECRET");
        }
        if self.github.token.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("set GITHUB_TOKEN");
        }
        if self.gitlab.token.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("set GITLAB_TOKEN");
        }
        if self.gitlab.base_url.is_empty() {
            anyhow::bail!("set GITLAB_BASE_URL");
        }
        if self.runner.integration_directory.as_os_str().is_empty() {
            anyhow::bail!("set INTEGRATION_DIRECTORY");
        }
        Ok(())
    }
}

impl Registry {
    pub fn is_meta(&self, repo: &str) -> bool {
        repo == self.meta_repo
    }

    pub fn is_integration(&self, repo: &str) -> bool {
        repo == self.integration_repo
    }

    pub fn needs_qemu(&self, repo: &str) -> bool {
        self.qemu_repositories.iter().any(|r| r == repo)
    }

    pub fn is_client(&self, repo: &str) -> bool {
        self.client_repositories.iter().any(|r| r == repo)
    }

    pub fn is_lts(&self, repo: &str) -> bool {
        self.lts_repositories.iter().any(|r| r == repo)
    }

    pub fn is_feature_branch(&self, branch: &str) -> bool {
        branch.starts_with(&self.feature_branch_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gitlab.base_url, "https://gitlab.com");
        assert_eq!(
            config.gitlab.client_pipeline_path,
            "Northern.tech/Mender/mender-qa"
        );
        assert_eq!(config.github.bot_login, "mender-test-bot");
        assert!(config.runner.process_push_events);
        assert!(!config.runner.dry_run);
        assert!(config.registry.needs_qemu("meta-mender"));
        assert!(!config.registry.needs_qemu("deviceauth"));
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[github]
token = "ghp-test-token"
protocol = "https"

[gitlab]
token = "glpat-test-token"
base-url = "https://gitlab.example.com"

[runner]
dry-run = true
sync-repos = ["mender", "mender-connect"]

[registry]
trunk-branch = "main"
qemu-repositories = ["mender"]
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.github.token, Some("ghp-test-token".to_string()));
        assert_eq!(config.github.protocol, GitProtocol::Https);
        assert_eq!(config.gitlab.base_url, "https://gitlab.example.com");
        assert!(config.runner.dry_run);
        assert_eq!(config.runner.sync_repos, vec!["mender", "mender-connect"]);
        assert_eq!(config.registry.trunk_branch, "main");
        assert_eq!(config.registry.qemu_repositories, vec!["mender"]);
        // untouched registry fields keep their defaults
        assert_eq!(config.registry.meta_repo, "meta-mender");
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "gitlab": {
    "token": "glpat-json-token",
    "client-pipeline-path": "group/qa"
  },
  "registry": {
    "organization-groups": { "acme": "Acme" }
  }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.gitlab.token, Some("glpat-json-token".to_string()));
        assert_eq!(config.gitlab.client_pipeline_path, "group/qa");
        assert_eq!(
            config.registry.organization_groups.get("acme"),
            Some(&"Acme".to_string())
        );
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        assert!(Config::load(Some(Path::new("nonexistent-relaybot.toml"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GITHUB_TOKEN", "gh"),
            ("GITLAB_TOKEN", "gl"),
            ("GITLAB_BASE_URL", "https://gitlab.internal"),
            ("DRY_RUN", "1"),
            ("DISABLE_PUSH_EVENTS_PROCESSING", "yes"),
            ("SYNC_REPOS_LIST", "mender, mender-connect,"),
            ("INTEGRATION_DIRECTORY", "/tmp/integration"),
        ]);

        let mut config = Config::default();
        config.apply_vars(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.github.token.as_deref(), Some("gh"));
        assert_eq!(config.gitlab.token.as_deref(), Some("gl"));
        assert_eq!(config.gitlab.base_url, "https://gitlab.internal");
        assert!(config.runner.dry_run);
        assert!(!config.runner.process_push_events);
        assert!(config.runner.process_pr_events);
        assert_eq!(config.runner.sync_repos, vec!["mender", "mender-connect"]);
        assert_eq!(
            config.runner.integration_directory,
            PathBuf::from("/tmp/integration")
        );
    }

    #[test]
    fn test_validate_requires_tokens_and_secret() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.github.token = Some("gh".into());
        config.gitlab.token = Some("gl".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GITHUB_SECRET"));

        config.runner.dry_run = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        assert!(serialized.contains("mender-qa"));
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.registry.lts_repositories,
            config.registry.lts_repositories
        );
    }
}
