use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::workspace::ProjectFile;

/// Errors surfaced by the backend client. Everything here resolves into a
/// chat message or inline banner; nothing propagates as an unhandled error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Could not reach the backend: {0}. Check that the VibeAI server is running, then retry.")]
    Network(String),

    #[error("Backend request timed out: {0}")]
    Timeout(String),

    /// Backend-reported failure; the `detail`/`error` text is shown verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("Unexpected backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub returncode: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitFileStatus {
    pub path: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// HTTP client for the VibeAI Builder backend.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        let value = self.call("GET", "/api/projects/list", None).await?;
        decode_list(value, "projects")
    }

    pub async fn project_files(&self, project_id: &str) -> ApiResult<Vec<ProjectFile>> {
        let endpoint = format!("/api/projects/{}/files", project_id);
        let value = self.call("GET", &endpoint, None).await?;
        decode_list(value, "files")
    }

    /// Project load with one bounded retry before the caller surfaces a
    /// persistent error panel.
    pub async fn project_files_with_retry(
        &self,
        project_id: &str,
        retry_delay: Duration,
    ) -> ApiResult<Vec<ProjectFile>> {
        match self.project_files(project_id).await {
            Ok(files) => Ok(files),
            Err(first) => {
                warn!("Project load failed, retrying once: {}", first);
                tokio::time::sleep(retry_delay).await;
                self.project_files(project_id).await
            }
        }
    }

    pub async fn update_file(&self, path: &str, content: &str) -> ApiResult<()> {
        self.call(
            "POST",
            "/api/builder/update-file",
            Some(json!({ "path": path, "content": content })),
        )
        .await?;
        Ok(())
    }

    pub async fn git_status(&self) -> ApiResult<Vec<GitFileStatus>> {
        let value = self.call("POST", "/api/git/status", Some(json!({}))).await?;
        decode_list(value, "files")
    }

    pub async fn git_commit(&self, message: &str) -> ApiResult<()> {
        self.call("POST", "/api/git/commit", Some(json!({ "message": message })))
            .await?;
        Ok(())
    }

    pub async fn git_push(&self) -> ApiResult<()> {
        self.call("POST", "/api/git/push", Some(json!({}))).await?;
        Ok(())
    }

    pub async fn packages_list(&self) -> ApiResult<Vec<PackageInfo>> {
        let value = self
            .call("POST", "/api/packages/list", Some(json!({})))
            .await?;
        decode_list(value, "packages")
    }

    pub async fn packages_search(&self, query: &str) -> ApiResult<Vec<PackageInfo>> {
        let value = self
            .call("POST", "/api/packages/search", Some(json!({ "query": query })))
            .await?;
        decode_list(value, "packages")
    }

    pub async fn package_install(&self, name: &str) -> ApiResult<()> {
        self.call("POST", "/api/packages/install", Some(json!({ "name": name })))
            .await?;
        Ok(())
    }

    pub async fn package_uninstall(&self, name: &str) -> ApiResult<()> {
        self.call(
            "POST",
            "/api/packages/uninstall",
            Some(json!({ "name": name })),
        )
        .await?;
        Ok(())
    }

    pub async fn terminal_execute(&self, command: &str) -> ApiResult<ExecResult> {
        let value = self
            .call(
                "POST",
                "/api/terminal/execute",
                Some(json!({ "command": command })),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn preview_start(&self) -> ApiResult<PreviewStatus> {
        let value = self.call("POST", "/api/preview/start", Some(json!({}))).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn preview_stop(&self) -> ApiResult<()> {
        self.call("POST", "/api/preview/stop", Some(json!({}))).await?;
        Ok(())
    }

    pub async fn preview_status(&self) -> ApiResult<PreviewStatus> {
        let value = self.call("GET", "/api/preview/status", None).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn smart_agent_generate(&self, prompt: &str, project_id: &str) -> ApiResult<String> {
        let value = self
            .call(
                "POST",
                "/api/smart-agent/generate",
                Some(json!({ "prompt": prompt, "project_id": project_id })),
            )
            .await?;
        value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode("generate response missing id".into()))
    }

    pub async fn team_agent_generate(&self, prompt: &str, project_id: &str) -> ApiResult<String> {
        let value = self
            .call(
                "POST",
                "/api/team-agent/generate",
                Some(json!({ "prompt": prompt, "project_id": project_id })),
            )
            .await?;
        value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode("generate response missing id".into()))
    }

    pub async fn smart_agent_status(&self, generation_id: &str) -> ApiResult<AgentStatus> {
        let endpoint = format!("/api/smart-agent/status/{}", generation_id);
        let value = self.call("GET", &endpoint, None).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Browser-style download URL; the caller opens or fetches it.
    pub fn download_zip_url(&self, project_id: &str) -> String {
        format!("{}/api/download/zip/{}", self.base_url, project_id)
    }

    async fn call(&self, method: &str, endpoint: &str, payload: Option<Value>) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = match method {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            _ => return Err(ApiError::Decode(format!("Unsupported method {}", method))),
        };

        if let Some(payload) = payload {
            request = request.json(&payload);
        }

        debug!("{} {}", method, url);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let value =
                serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw_response": text }));
            return Ok(value);
        }

        // Non-2xx with a JSON detail/error body is surfaced verbatim.
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("error"))
                    .and_then(|d| d.as_str().map(str::to_owned))
            })
            .unwrap_or_else(|| format!("Backend error {}: {}", status, text));

        Err(ApiError::Backend(detail))
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(value: Value, key: &str) -> ApiResult<Vec<T>> {
    let inner = match value {
        Value::Array(_) => value,
        Value::Object(ref map) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::Decode(format!("response missing {:?}", key)))?,
        other => return Err(ApiError::Decode(format!("unexpected response: {}", other))),
    };

    serde_json::from_value(inner).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client =
            BackendClient::new("http://localhost:8000/", Duration::from_secs(120)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.download_zip_url("p1"),
            "http://localhost:8000/api/download/zip/p1"
        );
    }

    #[test]
    fn test_decode_list_accepts_bare_and_wrapped_arrays() {
        let bare = json!([{ "id": "1", "name": "demo" }]);
        let projects: Vec<Project> = decode_list(bare, "projects").unwrap();
        assert_eq!(projects[0].name, "demo");

        let wrapped = json!({ "projects": [{ "id": "2", "name": "other" }] });
        let projects: Vec<Project> = decode_list(wrapped, "projects").unwrap();
        assert_eq!(projects[0].id, "2");

        let missing = json!({ "unrelated": [] });
        let result: ApiResult<Vec<Project>> = decode_list(missing, "projects");
        assert!(result.is_err());
    }

    #[test]
    fn test_exec_result_defaults() {
        let parsed: ExecResult = serde_json::from_value(json!({ "output": "hi\n" })).unwrap();
        assert_eq!(parsed.output, "hi\n");
        assert_eq!(parsed.returncode, 0);
    }
}
