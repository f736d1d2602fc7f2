use futures::future::join_all;
use log::{error, info};

use super::PipelineVariableSet;
use crate::providers::gitlab::types::{Pipeline, PipelineStatus};
use crate::providers::CiService;

/// Cancel the pending and running pipelines of `username` that run with
/// exactly `variables`, returning the ids cancelled.
///
/// Failures are logged and never stop the scan.
pub async fn stop_stale_pipelines(
    ci: &dyn CiService,
    project: &str,
    username: &str,
    variables: &PipelineVariableSet,
) -> Vec<u64> {
    let mut candidates: Vec<Pipeline> = Vec::new();
    for status in [PipelineStatus::Pending, PipelineStatus::Running] {
        match ci.list_pipelines(project, username, status).await {
            Ok(pipelines) => candidates.extend(pipelines),
            Err(e) => error!("stopStalePipelines: Could not list {status} pipelines: {e}"),
        }
    }

    let lookups = candidates
        .iter()
        .map(|pipeline| ci.pipeline_variables(project, pipeline.id));
    let results = join_all(lookups).await;

    let mut cancelled = Vec::new();
    for (pipeline, result) in candidates.iter().zip(results) {
        let existing = match result {
            Ok(existing) => existing,
            Err(e) => {
                error!(
                    "stopStalePipelines: Could not get variables for pipeline {}: {e}",
                    pipeline.id
                );
                continue;
            }
        };
        if !variables.matches(&existing) {
            continue;
        }

        info!(
            "Cancelling stale pipeline {}, url: {}",
            pipeline.id, pipeline.web_url
        );
        match ci.cancel_pipeline(project, pipeline.id).await {
            Ok(()) => cancelled.push(pipeline.id),
            Err(e) => error!(
                "stopStalePipelines: Could not cancel pipeline {}: {e}",
                pipeline.id
            ),
        }
    }
    cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::gitlab::testing::FakeCi;
    use crate::providers::gitlab::types::PipelineVariable;

    const QA: &str = "Northern.tech/Mender/mender-qa";
    const BOT: &str = "mender-test-bot";

    const WANTED: [(&str, &str); 3] = [
        ("MENDER_REV", "pull/1/head"),
        ("BUILD_CLIENT", "true"),
        ("TEST_VEXPRESS_QEMU", ""),
    ];

    fn wanted() -> PipelineVariableSet {
        WANTED.into_iter().collect()
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<PipelineVariable> {
        pairs
            .iter()
            .map(|(k, v)| PipelineVariable::new(*k, *v))
            .collect()
    }

    #[tokio::test]
    async fn test_exact_matches_are_cancelled_regardless_of_order() {
        let mut reversed = WANTED;
        reversed.reverse();
        let mut other_pr = WANTED;
        other_pr[0].1 = "pull/2/head";
        let ci = FakeCi::new()
            .with_pipeline(1, PipelineStatus::Pending, vars(&reversed))
            .with_pipeline(2, PipelineStatus::Running, vars(&WANTED))
            .with_pipeline(3, PipelineStatus::Running, vars(&other_pr));

        let cancelled = stop_stale_pipelines(&ci, QA, BOT, &wanted()).await;
        assert_eq!(cancelled, vec![1, 2]);
        assert_eq!(ci.cancelled(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_empty_variable_is_not_a_match() {
        let ci = FakeCi::new().with_pipeline(
            4,
            PipelineStatus::Running,
            vars(&[("MENDER_REV", "pull/1/head"), ("BUILD_CLIENT", "true")]),
        );
        let cancelled = stop_stale_pipelines(&ci, QA, BOT, &wanted()).await;
        assert!(cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_variable_lookup_failure_skips_only_that_pipeline() {
        let matching = vars(&WANTED);
        let ci = FakeCi::new()
            .with_pipeline(5, PipelineStatus::Pending, matching.clone())
            .with_broken_variables(5)
            .with_pipeline(6, PipelineStatus::Running, matching);

        assert_eq!(stop_stale_pipelines(&ci, QA, BOT, &wanted()).await, vec![6]);
    }
}
