use async_trait::async_trait;
use serde::Serialize;

use engine::clip::ClipSet;
use engine::edit::EditOperation;

use crate::error::ProviderError;

#[derive(Debug, Clone, Serialize)]
pub struct CompositionClip {
    pub scene_index: usize,
    pub duration_secs: u32,
    pub output_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositionRequest {
    pub job_id: i64,
    pub aspect_ratio: String,
    pub audio_ref: Option<String>,
    pub clips: Vec<CompositionClip>,
}

impl CompositionRequest {
    /// Build from a complete clip set; clip order is the scene order.
    pub fn from_clip_set(
        job_id: i64,
        aspect_ratio: &str,
        audio_ref: Option<&str>,
        durations: &[u32],
        clips: &ClipSet,
    ) -> Self {
        let clips = clips
            .clips()
            .iter()
            .map(|c| CompositionClip {
                scene_index: c.scene_index,
                duration_secs: durations.get(c.scene_index).copied().unwrap_or(0),
                output_ref: c.output_ref.clone().unwrap_or_default(),
            })
            .collect();
        CompositionRequest {
            job_id,
            aspect_ratio: aspect_ratio.to_string(),
            audio_ref: audio_ref.map(|s| s.to_string()),
            clips,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecompositionRequest {
    pub edit_id: i64,
    pub composition_id: i64,
    pub operations: Vec<EditOperation>,
}

/// Boundary to the external composition capability. Both calls are
/// fire-and-forget: acceptance is acknowledged synchronously, completion
/// arrives later on the callback endpoints.
#[async_trait]
pub trait ComposerClient: Send + Sync {
    async fn compose(&self, request: &CompositionRequest) -> Result<(), ProviderError>;
    async fn recompose(&self, request: &RecompositionRequest) -> Result<(), ProviderError>;
}

pub struct HttpComposer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpComposer {
    pub fn new(base_url: String) -> Self {
        HttpComposer {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn post_accepted<Req: Serialize>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
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
impl ComposerClient for HttpComposer {
    async fn compose(&self, request: &CompositionRequest) -> Result<(), ProviderError> {
        self.post_accepted("/compositions", request).await
    }

    async fn recompose(&self, request: &RecompositionRequest) -> Result<(), ProviderError> {
        self.post_accepted("/recompositions", request).await
    }
}
