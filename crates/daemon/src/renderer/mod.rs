use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    pub job_id: i64,
    pub scene_index: usize,
    pub micro_prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
    /// Client-side correlation id, echoed in provider logs.
    pub correlation_id: String,
}

/// Provider-side state of one render request.
#[derive(Debug, Clone)]
pub enum RenderPoll {
    Pending,
    Succeeded { output_ref: String },
    Failed { detail: String, retryable: bool },
}

/// Boundary to the external clip-generation capability. Submission returns a
/// provider request id; completion is observed by polling, never by blocking
/// on the render itself.
#[async_trait]
pub trait RendererClient: Send + Sync {
    async fn submit(&self, request: &RenderRequest) -> Result<String, ProviderError>;
    async fn poll(&self, request_id: &str) -> Result<RenderPoll, ProviderError>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    output_ref: Option<String>,
    error: Option<String>,
    #[serde(default)]
    retryable: bool,
}

pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenderer {
    pub fn new(base_url: String) -> Self {
        HttpRenderer {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RendererClient for HttpRenderer {
    async fn submit(&self, request: &RenderRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/renders", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: SubmitResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
            Ok(body.request_id)
        } else {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(ProviderError::from_status(status.as_u16(), detail))
        }
    }

    async fn poll(&self, request_id: &str) -> Result<RenderPoll, ProviderError> {
        let response = self
            .client
            .get(format!("{}/renders/{}", self.base_url, request_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::from_status(status.as_u16(), detail));
        }

        let body: PollResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        match body.status.as_str() {
            "queued" | "running" => Ok(RenderPoll::Pending),
            "succeeded" => match body.output_ref {
                Some(output_ref) => Ok(RenderPoll::Succeeded { output_ref }),
                None => Err(ProviderError::MalformedResponse(
                    "succeeded render without output_ref".to_string(),
                )),
            },
            "failed" => Ok(RenderPoll::Failed {
                detail: body.error.unwrap_or_else(|| "render failed".to_string()),
                retryable: body.retryable,
            }),
            other => Err(ProviderError::MalformedResponse(format!(
                "unknown render status: {}",
                other
            ))),
        }
    }
}
