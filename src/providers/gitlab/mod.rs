mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{Pipeline, PipelineStatus, PipelineVariable};

pub use client::{DryRunCi, GitLabClient};

/// The CI service running pipelines for mirrored repositories.
///
/// `project` is always a full project path such as `Northern.tech/Mender/mender-qa`.
#[async_trait]
pub trait CiService: Send + Sync {
    async fn create_pipeline(
        &self,
        project: &str,
        git_ref: &str,
        variables: &[PipelineVariable],
    ) -> Result<Pipeline>;

    async fn list_pipelines(
        &self,
        project: &str,
        username: &str,
        status: PipelineStatus,
    ) -> Result<Vec<Pipeline>>;

    async fn pipeline_variables(
        &self,
        project: &str,
        pipeline_id: u64,
    ) -> Result<Vec<PipelineVariable>>;

    async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> Result<()>;

    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()>;
}
