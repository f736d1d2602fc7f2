use serde::{Deserialize, Serialize};
use std::fmt;

/// A GitLab CI/CD pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    /// Project-scoped pipeline number
    #[serde(default)]
    pub iid: Option<u64>,
    /// Git reference the pipeline runs on
    #[serde(rename = "ref", default)]
    pub ref_: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub web_url: String,
}

/// One CI variable of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipelineVariable {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl PipelineVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Pipeline states the bot filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Running,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a pipeline creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeline<'a> {
    #[serde(rename = "ref")]
    pub ref_: &'a str,
    pub variables: &'a [PipelineVariable],
}
