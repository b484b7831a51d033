use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use engine::edit::EditOperation;
use engine::plan::PipelineKind;
use engine::timeline::ComposedTimeline;

use crate::error::ProviderError;

/// Request for a structured storyboard: overview plus one beat per scene.
#[derive(Debug, Clone, Serialize)]
pub struct StoryboardRequest {
    pub prompt: String,
    pub kind: PipelineKind,
    pub scene_count: usize,
    pub target_secs: u32,
    pub visual_anchor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBeat {
    pub description: String,
    #[serde(default)]
    pub mood: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub overview: String,
    pub beats: Vec<SceneBeat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditIntentRequest {
    pub instruction: String,
    pub timeline: ComposedTimeline,
}

/// Raw interpreter output for an edit instruction; indices are not yet
/// validated against the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditIntent {
    pub operations: Vec<EditOperation>,
    pub confidence: f64,
}

/// Boundary to the external prompt/edit interpretation capability. Calls
/// fail fast under a bounded timeout; errors carry a retryable class.
#[async_trait]
pub trait InterpreterGateway: Send + Sync {
    async fn storyboard(&self, request: &StoryboardRequest) -> Result<Storyboard, ProviderError>;
    async fn edit_intent(&self, request: &EditIntentRequest) -> Result<EditIntent, ProviderError>;
}

pub struct HttpInterpreterGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInterpreterGateway {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        HttpInterpreterGateway { client, base_url }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
        } else {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(ProviderError::from_status(status.as_u16(), detail))
        }
    }
}

#[async_trait]
impl InterpreterGateway for HttpInterpreterGateway {
    async fn storyboard(&self, request: &StoryboardRequest) -> Result<Storyboard, ProviderError> {
        self.post_json("/interpret/storyboard", request).await
    }

    async fn edit_intent(&self, request: &EditIntentRequest) -> Result<EditIntent, ProviderError> {
        self.post_json("/interpret/edit", request).await
    }
}
