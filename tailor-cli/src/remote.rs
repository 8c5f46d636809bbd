//! Platform API adapter for the migration engine.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tailor_migrate::{
    BundledScript, Metadata, MigrateResult, MigrationError, RemoteService, ScriptBundler,
    ScriptExecutor, ScriptOutcome,
};

use crate::error::{CliError, CliResult};

/// HTTP client for the platform API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: String,
    http: HttpClient,
    token: Option<String>,
}

#[derive(Serialize)]
struct GetMetadataRequest<'a> {
    trn: &'a str,
}

#[derive(Deserialize)]
struct GetMetadataResponse {
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct SetMetadataRequest<'a> {
    trn: &'a str,
    labels: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteScriptRequest<'a> {
    namespace: &'a str,
    migration_number: u32,
    code: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ExecutionStatus {
    Committed,
    Failed,
}

#[derive(Deserialize)]
struct ExecuteScriptResponse {
    status: ExecutionStatus,
    #[serde(default)]
    error: Option<String>,
}

impl PlatformClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> CliResult<Self> {
        let base_url = base_url.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(CliError::Config(format!(
                "platform.url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            base_url,
            http,
            token: None,
        })
    }

    /// Set the access token sent as `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// POST a request and fail on a non-success status.
    async fn send<T: Serialize>(&self, method: &str, body: &T) -> MigrateResult<Response> {
        let url = self.url(method);
        debug!(url = %url, "Calling platform API");

        let response = self
            .with_auth(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| MigrationError::remote(format!("{}: {}", method, e)))?;

        check_status(method, response).await
    }

    async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &T,
    ) -> MigrateResult<R> {
        self.send(method, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| MigrationError::remote(format!("{}: invalid response: {}", method, e)))
    }
}

async fn check_status(method: &str, response: Response) -> MigrateResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(MigrationError::remote(format!(
        "{} failed with status {}: {}",
        method,
        status.as_u16(),
        error_message(&body)
    )))
}

/// Pull `error` or `message` out of a JSON error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]
                .as_str()
                .or_else(|| json["message"].as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait::async_trait]
impl RemoteService for PlatformClient {
    async fn get_metadata(&self, trn: &str) -> MigrateResult<Option<Metadata>> {
        let response: GetMetadataResponse =
            self.call("GetMetadata", &GetMetadataRequest { trn }).await?;
        Ok(response.metadata)
    }

    async fn set_metadata(&self, trn: &str, labels: BTreeMap<String, String>) -> MigrateResult<()> {
        // The reply carries nothing the engine needs, so its body is ignored.
        self.send("SetMetadata", &SetMetadataRequest { trn, labels: &labels })
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for PlatformClient {
    async fn execute(&self, script: &BundledScript) -> MigrateResult<ScriptOutcome> {
        let request = ExecuteScriptRequest {
            namespace: &script.namespace,
            migration_number: script.migration_number,
            code: &script.bundled_code,
        };
        let response: ExecuteScriptResponse = self.call("ExecuteScript", &request).await?;

        Ok(match response.status {
            ExecutionStatus::Committed => ScriptOutcome::Committed,
            ExecutionStatus::Failed => ScriptOutcome::Failed(
                response
                    .error
                    .unwrap_or_else(|| "transaction rolled back".to_string()),
            ),
        })
    }
}

/// Remote for commands that never contact the platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

#[async_trait::async_trait]
impl RemoteService for LocalOnly {
    async fn get_metadata(&self, trn: &str) -> MigrateResult<Option<Metadata>> {
        Err(MigrationError::remote(format!(
            "GetMetadata({}) is not available to local commands",
            trn
        )))
    }

    async fn set_metadata(
        &self,
        trn: &str,
        _labels: BTreeMap<String, String>,
    ) -> MigrateResult<()> {
        Err(MigrationError::remote(format!(
            "SetMetadata({}) is not available to local commands",
            trn
        )))
    }
}

/// Bundler that ships the script source unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceBundler;

#[async_trait::async_trait]
impl ScriptBundler for SourceBundler {
    async fn bundle(
        &self,
        source: &Path,
        namespace: &str,
        migration_number: u32,
    ) -> MigrateResult<BundledScript> {
        let bundled_code = tokio::fs::read_to_string(source).await?;
        Ok(BundledScript {
            namespace: namespace.to_string(),
            migration_number,
            bundled_code,
        })
    }
}
