use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::error::{BotError, Result};
use crate::request_log::RequestLog;

use super::types::{CreatePipeline, Pipeline, PipelineStatus, PipelineVariable};
use super::CiService;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("relaybot/0.4")
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_url = Url::parse(&base)
            .map_err(|e| BotError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| BotError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token: token.filter(|t| !t.is_empty()).map(ToString::to_string),
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    /// URL below `projects/<url-encoded project path>/`.
    fn project_url(&self, project: &str, rest: &str) -> Result<Url> {
        let path = format!("projects/{}/{rest}", urlencoding::encode(project));
        self.api_url
            .join(&path)
            .map_err(|e| BotError::Config(format!("Invalid project URL {path}: {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self.auth_request(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(BotError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CiService for GitLabClient {
    async fn create_pipeline(
        &self,
        project: &str,
        git_ref: &str,
        variables: &[PipelineVariable],
    ) -> Result<Pipeline> {
        let url = self.project_url(project, "pipeline")?;
        let body = CreatePipeline {
            ref_: git_ref,
            variables,
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Ok(response.json().await?)
    }

    async fn list_pipelines(
        &self,
        project: &str,
        username: &str,
        status: PipelineStatus,
    ) -> Result<Vec<Pipeline>> {
        let url = self.project_url(project, "pipelines")?;
        let request = self
            .client
            .get(url)
            .query(&[("username", username), ("status", status.as_str())]);
        let pipelines: Vec<Pipeline> = self.send(request).await?.json().await?;
        debug!("{} {status} pipelines in {project}", pipelines.len());
        Ok(pipelines)
    }

    async fn pipeline_variables(
        &self,
        project: &str,
        pipeline_id: u64,
    ) -> Result<Vec<PipelineVariable>> {
        let url = self.project_url(project, &format!("pipelines/{pipeline_id}/variables"))?;
        Ok(self.send(self.client.get(url)).await?.json().await?)
    }

    async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> Result<()> {
        let url = self.project_url(project, &format!("pipelines/{pipeline_id}/cancel"))?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()> {
        let url = self.project_url(
            project,
            &format!("repository/branches/{}", urlencoding::encode(branch)),
        )?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

/// Records every call in the request log.
pub struct DryRunCi {
    log: RequestLog,
}

impl DryRunCi {
    pub fn new(log: RequestLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl CiService for DryRunCi {
    async fn create_pipeline(
        &self,
        project: &str,
        git_ref: &str,
        variables: &[PipelineVariable],
    ) -> Result<Pipeline> {
        let options = serde_json::to_string(&CreatePipeline {
            ref_: git_ref,
            variables,
        })?;
        self.log
            .push(format!("gitlab.CreatePipeline: path={project},options={options}"));
        Ok(Pipeline::default())
    }

    async fn list_pipelines(
        &self,
        project: &str,
        username: &str,
        status: PipelineStatus,
    ) -> Result<Vec<Pipeline>> {
        self.log.push(format!(
            "gitlab.ListProjectPipelines: path={project},username={username},status={status}"
        ));
        Ok(vec![Pipeline {
            id: 1,
            ..Pipeline::default()
        }])
    }

    async fn pipeline_variables(
        &self,
        project: &str,
        pipeline_id: u64,
    ) -> Result<Vec<PipelineVariable>> {
        self.log
            .push(format!("gitlab.GetPipelineVariables: path={project},id={pipeline_id}"));
        Ok(Vec::new())
    }

    async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> Result<()> {
        self.log
            .push(format!("gitlab.CancelPipelineBuild: path={project},id={pipeline_id}"));
        Ok(())
    }

    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()> {
        self.log
            .push(format!("gitlab.DeleteBranch: path={project},name={branch}"));
        Ok(())
    }
}
