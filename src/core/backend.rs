use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::core::jobs::Job;
use crate::core::oauth::Provider;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    #[serde(default)]
    pub runpod_connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobCreated {
    pub job_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobCancelled {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDeleted {
    pub deleted: bool,
    #[serde(default)]
    pub artifacts_cleaned: u64,
}

/// Typed client for the backend's loopback HTTP contract.
///
/// The backend owns job state; this client only reads and forwards. It is the
/// private channel for the OAuth code exchange, which must never be visible
/// to the UI process.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }

    pub async fn health(&self) -> Result<BackendHealth, BackendError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    pub async fn create_job(
        &self,
        job_type: &str,
        params: Value,
    ) -> Result<JobCreated, BackendError> {
        let resp = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(&serde_json::json!({ "type": job_type, "params": params }))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, BackendError> {
        let resp = self
            .client
            .get(format!(
                "{}/jobs/{}",
                self.base_url,
                urlencoding::encode(job_id)
            ))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>, BackendError> {
        let resp = self
            .client
            .get(format!("{}/jobs?limit={}", self.base_url, limit))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<JobCancelled, BackendError> {
        let resp = self
            .client
            .post(format!(
                "{}/jobs/{}/cancel",
                self.base_url,
                urlencoding::encode(job_id)
            ))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<JobDeleted, BackendError> {
        let resp = self
            .client
            .delete(format!(
                "{}/jobs/{}",
                self.base_url,
                urlencoding::encode(job_id)
            ))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    /// Forward an authorization code to the backend's provider-specific
    /// callback endpoint. Returns the provider token payload verbatim.
    pub async fn oauth_callback(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<Value, BackendError> {
        let resp = self
            .client
            .post(format!("{}/oauth/{}/callback", self.base_url, provider))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get, routing::post};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn health_parses_runpod_flag() {
        let app = Router::new().route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok", "runpod_connected": true })) }),
        );
        let client = BackendClient::new(serve(app).await);
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.runpod_connected);
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let app = Router::new().route(
            "/jobs/{id}",
            get(|| async {
                (
                    axum::http::StatusCode::NOT_FOUND,
                    Json(serde_json::json!({ "detail": "no such job" })),
                )
            }),
        );
        let client = BackendClient::new(serve(app).await);
        let err = client.get_job("missing").await.unwrap_err();
        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body.contains("no such job"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn job_lifecycle_endpoints_use_the_wire_contract() {
        let app = Router::new()
            .route(
                "/jobs",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["type"], "video_generate");
                    assert_eq!(body["params"]["prompt"], "sunset");
                    Json(serde_json::json!({
                        "job_id": "j-1",
                        "status": "QUEUED",
                        "created_at": "2026-01-01T00:00:00Z"
                    }))
                }),
            )
            .route(
                "/jobs/{id}/cancel",
                post(|| async { Json(serde_json::json!({ "status": "CANCELED" })) }),
            )
            .route(
                "/jobs/{id}",
                axum::routing::delete(|| async {
                    Json(serde_json::json!({ "deleted": true, "artifacts_cleaned": 2 }))
                }),
            );
        let client = BackendClient::new(serve(app).await);

        let created = client
            .create_job("video_generate", serde_json::json!({ "prompt": "sunset" }))
            .await
            .unwrap();
        assert_eq!(created.job_id, "j-1");
        assert_eq!(created.status, "QUEUED");

        let cancelled = client.cancel_job("j-1").await.unwrap();
        assert_eq!(cancelled.status, "CANCELED");

        let deleted = client.delete_job("j-1").await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.artifacts_cleaned, 2);
    }

    #[tokio::test]
    async fn oauth_callback_posts_code_to_provider_route() {
        let app = Router::new().route(
            "/oauth/youtube/callback",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["code"], "auth-code-1");
                Json(serde_json::json!({ "access_token": "tok" }))
            }),
        );
        let client = BackendClient::new(serve(app).await);
        let payload = client
            .oauth_callback(Provider::Youtube, "auth-code-1")
            .await
            .unwrap();
        assert_eq!(payload["access_token"], "tok");
    }
}
