pub mod github;
pub mod gitlab;

pub use github::{DryRunHosting, GitHubClient, HostingService};
pub use gitlab::{CiService, DryRunCi, GitLabClient};
