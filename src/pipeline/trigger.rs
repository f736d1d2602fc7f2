use comfy_table::presets::ASCII_MARKDOWN;
use comfy_table::Table;
use log::{debug, info};

use super::PipelineVariableSet;
use crate::config::Registry;
use crate::error::{BotError, Result};
use crate::providers::github::types::{PullRequest, Repository};
use crate::providers::gitlab::types::{Pipeline, PipelineVariable};
use crate::providers::CiService;
use crate::remotes::gitlab_project_path;
use crate::retry::{RetryPolicy, Sleeper};

/// Create a pipeline, retrying failures with a doubling backoff.
///
/// A project without anything to run is not an error: `Ok(None)` is returned.
pub async fn create_pipeline_with_retry(
    ci: &dyn CiService,
    sleeper: &dyn Sleeper,
    project: &str,
    git_ref: &str,
    variables: &[PipelineVariable],
) -> Result<Option<Pipeline>> {
    let result = RetryPolicy::pipeline_trigger()
        .run(
            sleeper,
            |_| ci.create_pipeline(project, git_ref, variables),
            |err| !err.is_missing_ci_config(),
        )
        .await;

    match result {
        Ok(pipeline) => {
            info!("Created pipeline: {}", pipeline.web_url);
            Ok(Some(pipeline))
        }
        Err(err) if err.is_missing_ci_config() => {
            info!("No pipeline configured for {project}@{git_ref}: {err}");
            Ok(None)
        }
        Err(err) => Err(BotError::TransientPipeline(err.to_string())),
    }
}

/// `CI_EXTERNAL_PULL_REQUEST_*` variables of a pull request pipeline.
fn pull_request_variables(repository: &Repository, pr: &PullRequest) -> Vec<PipelineVariable> {
    let source_repository = pr
        .head
        .repo
        .as_ref()
        .map_or("", |repo| repo.full_name.as_str());
    vec![
        PipelineVariable::new("CI_EXTERNAL_PULL_REQUEST_IID", pr.number.to_string()),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_SOURCE_REPOSITORY",
            source_repository,
        ),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_TARGET_REPOSITORY",
            repository.full_name.as_str(),
        ),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_SOURCE_BRANCH_NAME",
            pr.head.ref_.as_str(),
        ),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_SOURCE_BRANCH_SHA",
            pr.head.sha.as_str(),
        ),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_TARGET_BRANCH_NAME",
            pr.base.ref_.as_str(),
        ),
        PipelineVariable::new(
            "CI_EXTERNAL_PULL_REQUEST_TARGET_BRANCH_SHA",
            pr.base.sha.as_str(),
        ),
    ]
}

/// Start the pipeline of the mirrored `pr_<n>` branch in the repository's own project.
pub async fn start_pull_request_pipeline(
    ci: &dyn CiService,
    sleeper: &dyn Sleeper,
    registry: &Registry,
    org: &str,
    repository: &Repository,
    pr: &PullRequest,
) -> Result<Option<Pipeline>> {
    let project = gitlab_project_path(registry, org, &repository.name)?;
    let git_ref = format!("pr_{}", pr.number);
    let variables = pull_request_variables(repository, pr);

    let pipeline = create_pipeline_with_retry(ci, sleeper, &project, &git_ref, &variables).await?;
    if let Some(pipeline) = &pipeline {
        debug!("started pipeline for PR: {}", pipeline.web_url);
    }
    Ok(pipeline)
}

/// Comment announcing a client pipeline with its build configuration.
pub fn pipeline_comment(pipeline: &Pipeline, variables: &PipelineVariableSet) -> String {
    let mut table = Table::new();
    table
        .load_preset(ASCII_MARKDOWN)
        .set_header(vec!["Key", "Value"]);
    for (key, value) in variables.displayed() {
        table.add_row(vec![key, value]);
    }

    format!(
        "\nHello :smiley_cat: I created a pipeline for you here: [Pipeline-{}]({})\n\n\
         <details>\n    <summary>Build Configuration Matrix</summary><p>\n\n\
         {table}\n\n </p></details>\n",
        pipeline.id, pipeline.web_url
    )
}
