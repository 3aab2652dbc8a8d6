//! The shipped [`SourceControl`], backed by `reqwest`.
//!
//! Bearer PAT auth, `Accept: application/vnd.github+json`, an
//! `X-GitHub-Api-Version` header, a 30s timeout, and runner-group-
//! name-to-id resolution before issuing a JIT config (falling back to
//! whichever group the API marks `default` when the configured name
//! isn't found).

use async_trait::async_trait;
use jit_core::conf::SourceControl as SourceControlConf;
use jit_core::error::Error;
use jit_core::error::Result;
use jit_core::models::JitConfig;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::SourceControl;

pub struct GitHubSourceControl {
    client: reqwest::Client,
    conf: SourceControlConf,
}

#[derive(Deserialize)]
struct RunnerGroupsResponse {
    #[serde(default)]
    runner_groups: Vec<RunnerGroup>,
}

#[derive(Deserialize)]
struct RunnerGroup {
    id: i64,
    name: String,
    #[serde(default)]
    default: bool,
}

#[derive(Deserialize)]
struct JitRunnerResponse {
    runner: JitRunner,
    encoded_jit_config: String,
}

#[derive(Deserialize)]
struct JitRunner {
    id: i64,
}

#[derive(Deserialize)]
struct RunnersListResponse {
    #[serde(default)]
    runners: Vec<RunnerEntry>,
}

#[derive(Deserialize)]
struct RunnerEntry {
    id: i64,
    name: String,
}

impl GitHubSourceControl {
    pub fn new(conf: SourceControlConf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::SourceControlPermanent(e.to_string()))?;
        Ok(GitHubSourceControl { client, conf })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.conf.api_url, path))
            .bearer_auth(&self.conf.pat)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", &self.conf.api_version)
    }

    /// Classifies a transport/HTTP failure as transient (worth retrying)
    /// or permanent, the same split the dispatch worker uses to decide
    /// whether to retry or give up.
    fn classify(err: reqwest::Error) -> Error {
        if err.is_timeout() || err.is_connect() {
            return Error::SourceControlTransient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => {
                Error::SourceControlTransient(err.to_string())
            }
            Some(status) if status.as_u16() == 429 => Error::SourceControlTransient(err.to_string()),
            _ => Error::SourceControlPermanent(err.to_string()),
        }
    }

    async fn resolve_runner_group_id(&self, tenant: &str) -> Result<i64> {
        let path = format!("/orgs/{tenant}/actions/runner-groups");
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(Self::classify)?
            .error_for_status()
            .map_err(Self::classify)?;
        let body: RunnerGroupsResponse = response
            .json()
            .await
            .map_err(|e| Error::SourceControlPermanent(e.to_string()))?;
        if let Some(group) = body
            .runner_groups
            .iter()
            .find(|g| g.name == self.conf.runner_group)
        {
            return Ok(group.id);
        }
        body.runner_groups
            .iter()
            .find(|g| g.default)
            .map(|g| g.id)
            .ok_or_else(|| {
                Error::SourceControlPermanent(format!(
                    "runner group '{}' not found for tenant '{tenant}'",
                    self.conf.runner_group
                ))
            })
    }
}

#[async_trait]
impl SourceControl for GitHubSourceControl {
    #[instrument(name = "sourcecontrol::generate_jit_config", skip(self, labels), err(Debug))]
    async fn generate_jit_config(
        &self,
        tenant: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitConfig> {
        let runner_group_id = self.resolve_runner_group_id(tenant).await?;
        let path = format!("/orgs/{tenant}/actions/runners/generate-jitconfig");
        let body = json!({
            "name": runner_name,
            "runner_group_id": runner_group_id,
            "labels": labels,
            "work_folder": "_work",
        });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?
            .error_for_status()
            .map_err(Self::classify)?;
        let parsed: JitRunnerResponse = response
            .json()
            .await
            .map_err(|e| Error::SourceControlPermanent(e.to_string()))?;
        Ok(JitConfig { runner_id: parsed.runner.id, encoded_jit_config: parsed.encoded_jit_config })
    }

    #[instrument(name = "sourcecontrol::delete_runner", skip(self), err(Debug))]
    async fn delete_runner(&self, tenant: &str, runner_name: &str) -> Result<()> {
        let path = format!("/orgs/{tenant}/actions/runners");
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(Self::classify)?
            .error_for_status()
            .map_err(Self::classify)?;
        let listed: RunnersListResponse = response
            .json()
            .await
            .map_err(|e| Error::SourceControlPermanent(e.to_string()))?;
        let Some(runner) = listed.runners.iter().find(|r| r.name == runner_name) else {
            return Ok(());
        };
        let delete_path = format!("/orgs/{tenant}/actions/runners/{}", runner.id);
        match self.request(reqwest::Method::DELETE, &delete_path).send().await {
            Ok(resp) if resp.status().as_u16() == 404 => Ok(()),
            Ok(resp) => resp.error_for_status().map(|_| ()).map_err(Self::classify),
            Err(err) => Err(Self::classify(err)),
        }
    }
}
