//! Client for the job submission API

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use rv_config::SubmissionConfig;
use rv_core::ReductionArguments;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, WebError};

pub const UNAUTHORIZED_MESSAGE: &str = "User is not authorized to submit batch runs. \
     Please contact the Autoreduce team at ISISREDUCE@stfc.ac.uk to request the permissions.";

const UNKNOWN_ERROR: &str = "Unknown error encountered";

/// Body of a batch submission
#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub runs: Vec<u64>,
    pub reduction_arguments: ReductionArguments,
    pub user_id: Option<i64>,
    pub description: String,
}

#[derive(Clone)]
pub struct SubmissionClient {
    http: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
}

impl SubmissionClient {
    pub fn new(config: &SubmissionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn batch_url(&self, instrument: &str) -> String {
        format!("{}/runs/batch/{}", self.api_url, instrument)
    }

    /// Send a batch run to the API.
    ///
    /// Anything but `200 OK` is a failure; the API's `message` field is
    /// passed on when it has one.
    pub async fn submit_batch(&self, instrument: &str, submission: &BatchSubmission) -> Result<()> {
        let token = self
            .auth_token
            .as_deref()
            .ok_or_else(|| WebError::Forbidden(UNAUTHORIZED_MESSAGE.to_string()))?;

        let url = self.batch_url(instrument);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Token {}", token))
            .json(submission)
            .send()
            .await
            .map_err(|e| WebError::Submission(e.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            warn!("Batch submission for {} failed ({}): {}", instrument, status, message);
            return Err(WebError::Submission(message));
        }

        info!(
            "Submitted batch run of {} runs for {}",
            submission.runs.len(),
            instrument
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::HeaderMap, routing::post, Json, Router};
    use tokio::net::TcpListener;

    async fn fake_api() -> String {
        async fn handler(
            Path(instrument): Path<String>,
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> (axum::http::StatusCode, Json<serde_json::Value>) {
            let authorised = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Token secret");
            if !authorised {
                return (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "bad token"})),
                );
            }
            if instrument == "BROKEN" {
                return (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({})),
                );
            }
            (axum::http::StatusCode::OK, Json(body))
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/runs/batch/:instrument", post(handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client(api_url: String, token: Option<&str>) -> SubmissionClient {
        SubmissionClient::new(&SubmissionConfig {
            api_url,
            auth_token: token.map(String::from),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn submission() -> BatchSubmission {
        BatchSubmission {
            runs: vec![1, 2, 3],
            reduction_arguments: ReductionArguments::default(),
            user_id: Some(7),
            description: "batch".to_string(),
        }
    }

    #[test]
    fn test_batch_url_trims_slash() {
        let client = client("http://api.example/".to_string(), None);
        assert_eq!(client.batch_url("MARI"), "http://api.example/runs/batch/MARI");
    }

    #[tokio::test]
    async fn test_missing_token_is_refused() {
        let client = client("http://127.0.0.1:9".to_string(), None);
        let err = client.submit_batch("MARI", &submission()).await.unwrap_err();
        assert!(matches!(err, WebError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_submission_outcomes() {
        let api = fake_api().await;

        client(api.clone(), Some("secret"))
            .submit_batch("MARI", &submission())
            .await
            .unwrap();

        let err = client(api.clone(), Some("wrong"))
            .submit_batch("MARI", &submission())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad token");

        let err = client(api, Some("secret"))
            .submit_batch("BROKEN", &submission())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_ERROR);
    }
}
