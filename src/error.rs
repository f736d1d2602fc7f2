use thiserror::Error;

/// Messages GitLab returns when a project has nothing to run for a ref.
const MISSING_CI_CONFIG_MARKERS: [&str; 2] = [
    "Missing CI config file",
    "No stages / jobs for this pipeline",
];

#[derive(Error, Debug)]
pub enum BotError {
    #[error(
        "parse error near '{token}', I need, e.g.: \
         start pipeline --pr somerepo/pull/12/head --pr somerepo/1.0.x"
    )]
    Parse { token: String },

    #[error("{0}")]
    InvalidCommand(String),

    #[error("No target branches found in the comment body: {0}")]
    NoTargetBranches(String),

    #[error("Cherry pick had conflicts")]
    Conflict,

    #[error("Failed to create the PR for: ({repo}) {source}")]
    PullRequestCreation {
        repo: String,
        source: Box<BotError>,
    },

    #[error("Could not create pipeline: {0}")]
    TransientPipeline(String),

    #[error("Unrecognized organization {0:?}")]
    RemoteResolution(String),

    #[error("Unrecognized ref {0}")]
    UnrecognizedRef(String),

    #[error("{args:?} returned error: {output}: {status}")]
    Git {
        args: Vec<String>,
        output: String,
        status: String,
    },

    #[error("{program} returned error: {status} ({output})")]
    Process {
        program: String,
        status: String,
        output: String,
    },

    #[error("lts version list is empty")]
    EmptyLtsList,

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// A failed `git` invocation whose output reports a merge conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict => true,
            Self::Git { output, .. } => output.to_lowercase().contains("conflict"),
            _ => false,
        }
    }

    /// GitLab refused to create a pipeline because there is nothing to run.
    pub fn is_missing_ci_config(&self) -> bool {
        let message = match self {
            Self::Api { message, .. } | Self::TransientPipeline(message) => message,
            _ => return false,
        };
        MISSING_CI_CONFIG_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
