use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::{SubmitError, TransportError};
use crate::core::model::{JobRequest, ProgressSnapshot};
use crate::plugins::remote::wire::{error_field, HealthStatus, WireProgress};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub user_agent: String,
    /// Replaces every kind's own submission timeout when set.
    pub submit_timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:5000").expect("static url"),
            user_agent: "wap-jobs/0.1".to_string(),
            submit_timeout: None,
        }
    }
}

/// The backend's immediate acknowledgement of a submitted job. For the
/// off-point check this body is the final result.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub body: Value,
}

/// HTTP access to the backend collaborator. Cheap to clone; clones share
/// one connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
    submit_timeout: Option<Duration>,
}

impl BackendClient {
    pub fn new(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&cfg.user_agent)?);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("build http client")?;
        Ok(Self { client, base_url: cfg.base_url.clone(), submit_timeout: cfg.submit_timeout })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Posts a job to its kind's endpoint. Never retried: the call has side
    /// effects on the backend.
    pub async fn submit(&self, request: &JobRequest) -> Result<Accepted, SubmitError> {
        let kind = request.kind();
        let path = kind
            .endpoint()
            .ok_or_else(|| SubmitError::Invalid(format!("{kind} does not run on the backend")))?;
        let body = request
            .body()
            .map_err(|e| SubmitError::Invalid(e.to_string()))?
            .unwrap_or(Value::Null);
        let url = self.endpoint(path).map_err(|e| SubmitError::Invalid(e.to_string()))?;
        let timeout = self.submit_timeout.unwrap_or_else(|| kind.submit_timeout());

        debug!(%kind, %url, "submitting job");
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmitError::from_reqwest(e, timeout))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| SubmitError::from_reqwest(e, timeout))?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let backend_error = error_field(&payload);

        if !status.is_success() {
            warn!(%kind, status = status.as_u16(), "submission rejected");
            return Err(match backend_error {
                Some(reason) => SubmitError::Rejected(reason),
                None => SubmitError::Status {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("unknown status").to_string(),
                },
            });
        }
        if let Some(reason) = backend_error {
            warn!(%kind, %reason, "submission acknowledged with an error");
            return Err(SubmitError::Rejected(reason));
        }

        info!(%kind, "job accepted by backend");
        Ok(Accepted { body: payload })
    }

    /// One bounded read of `GET /progress`.
    pub async fn fetch_progress(&self, timeout: Duration) -> Result<ProgressSnapshot, TransportError> {
        let url = self.endpoint("/progress").map_err(|e| TransportError::Other(e.to_string()))?;
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }

        let wire: WireProgress = resp.json().await.map_err(|e| TransportError::from_reqwest(e, timeout))?;
        Ok(wire.into())
    }

    pub async fn health(&self) -> Result<HealthStatus, TransportError> {
        let url = self.endpoint("/health").map_err(|e| TransportError::Other(e.to_string()))?;
        let resp = self
            .client
            .get(url)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, CONTROL_TIMEOUT))?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        let text = resp.text().await.map_err(|e| TransportError::from_reqwest(e, CONTROL_TIMEOUT))?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    /// Asks the backend process to exit. Host shutdown path only.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let url = self.endpoint("/shutdown").map_err(|e| TransportError::Other(e.to_string()))?;
        let resp = self
            .client
            .post(url)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, CONTROL_TIMEOUT))?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        info!("backend acknowledged shutdown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{BatchParams, DpiParams, OffPointParams, AreaLevel, ReorganizeParams};
    use crate::plugins::remote::testing::{client_for, serve, unreachable_url};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    fn dpi_request() -> JobRequest {
        JobRequest::ConvertDpi(DpiParams {
            source_dir: "scans".into(),
            dest_dir: "scans_200".into(),
            target_dpi: 200,
        })
    }

    #[tokio::test]
    async fn unreachable_backend_cannot_connect() {
        let client = client_for(unreachable_url());
        let err = client.submit(&dpi_request()).await.unwrap_err();
        assert_eq!(err, SubmitError::CannotConnect);
        assert_eq!(err.to_string(), "cannot connect to server");
    }

    #[tokio::test]
    async fn accepted_submission_posts_kind_body() {
        let router = Router::new().route(
            "/convert_dpi",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"message": "DPI conversion started in background", "status": "started", "echo": body}))
            }),
        );
        let client = client_for(serve(router).await);

        let accepted = client.submit(&dpi_request()).await.unwrap();
        assert_eq!(accepted.body["status"], "started");
        assert_eq!(accepted.body["echo"]["dest_dir"], "scans_200");
        assert_eq!(accepted.body["echo"]["target_dpi"], 200);
    }

    #[tokio::test]
    async fn backend_error_text_is_the_rejection_reason() {
        let router = Router::new().route(
            "/batch_rename",
            post(|| async {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "Another process is already running"})))
            }),
        );
        let client = client_for(serve(router).await);

        let req = JobRequest::Rename(BatchParams { source: "a".into(), dest: "b".into() });
        let err = client.submit(&req).await.unwrap_err();
        assert_eq!(err, SubmitError::Rejected("Another process is already running".to_string()));
    }

    #[tokio::test]
    async fn non_json_failure_uses_status_text() {
        let router = Router::new().route(
            "/search_off_point",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(serve(router).await);

        let req = JobRequest::CheckOffPoint(OffPointParams {
            point_path: "p.gpkg".into(),
            polygon_path: "a.gpkg".into(),
            level: AreaLevel::Desa,
        });
        let err = client.submit(&req).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::Status { status: 500, reason: "Internal Server Error".to_string() }
        );
    }

    #[tokio::test]
    async fn slow_acknowledgement_times_out() {
        let router = Router::new().route(
            "/convert_dpi",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"status": "started"}))
            }),
        );
        let cfg = BackendConfig {
            base_url: serve(router).await,
            submit_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let client = BackendClient::new(&cfg).unwrap();

        let err = client.submit(&dpi_request()).await.unwrap_err();
        assert_eq!(err, SubmitError::Timeout(Duration::from_millis(50)));
        assert!(err.to_string().starts_with("timeout after"));
    }

    #[tokio::test]
    async fn local_requests_are_not_submitted() {
        let client = client_for(unreachable_url());
        let req = JobRequest::Reorganize(ReorganizeParams { source: ".".into(), recursive: false });
        assert!(matches!(client.submit(&req).await, Err(SubmitError::Invalid(_))));
    }

    #[tokio::test]
    async fn progress_fetch_is_bounded() {
        let router = Router::new().route(
            "/progress",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"current": 1}))
            }),
        );
        let client = client_for(serve(router).await);

        let err = client.fetch_progress(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn health_and_shutdown() {
        let router = Router::new()
            .route("/health", get(|| async { Json(json!({"status": "healthy", "message": "Python server is running"})) }))
            .route("/shutdown", post(|| async { Json(json!({"message": "Server shutting down"})) }));
        let client = client_for(serve(router).await);

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        client.shutdown().await.unwrap();
    }
}
