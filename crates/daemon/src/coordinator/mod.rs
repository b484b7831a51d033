use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use engine::clip::{Clip, ClipSet, ClipStatus};
use engine::plan::{Scene, ScenePlan};

use crate::error::{CoordinatorError, FailedScene, ProviderError};
use crate::renderer::{RenderPoll, RenderRequest, RendererClient};
use crate::retry::RetryPolicy;

/// Counters published to the orchestrator while generation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipProgress {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ClipProgress {
    pub fn pending(&self) -> usize {
        self.total - self.succeeded - self.failed
    }
}

pub type ProgressSink = dyn Fn(ClipProgress) + Send + Sync;

/// Dispatches one render per scene with bounded concurrency, retries
/// transient failures per scene, and hands back a complete, ordered clip
/// set or the list of scenes that exhausted their budget.
pub struct ClipCoordinator {
    renderer: Arc<dyn RendererClient>,
    policy: RetryPolicy,
    worker_limit: usize,
    poll_interval: Duration,
    render_deadline: Duration,
}

enum SceneOutcome {
    Done(Clip),
    Skipped,
}

impl ClipCoordinator {
    pub fn new(
        renderer: Arc<dyn RendererClient>,
        policy: RetryPolicy,
        worker_limit: usize,
        poll_interval: Duration,
        render_deadline: Duration,
    ) -> Self {
        ClipCoordinator {
            renderer,
            policy,
            worker_limit: worker_limit.max(1),
            poll_interval,
            render_deadline,
        }
    }

    pub async fn generate(
        &self,
        job_id: i64,
        plan: &ScenePlan,
        aspect_ratio: &str,
        cancel: &CancellationToken,
        on_progress: &ProgressSink,
    ) -> Result<ClipSet, CoordinatorError> {
        let total = plan.scenes.len();
        let progress = Mutex::new(ClipProgress {
            total,
            succeeded: 0,
            failed: 0,
        });
        on_progress(*progress.lock().unwrap());

        let scene_futures: Vec<_> = plan
            .scenes
            .iter()
            .map(|scene| {
                self.process_scene(job_id, scene, aspect_ratio, cancel, &progress, on_progress)
            })
            .collect();
        let outcomes: Vec<SceneOutcome> = stream::iter(scene_futures)
            .buffer_unordered(self.worker_limit)
            .collect()
            .await;

        if cancel.is_cancelled() {
            info!(job_id, "clip generation cancelled, discarding partial results");
            return Err(CoordinatorError::Cancelled);
        }

        let clips: Vec<Clip> = outcomes
            .into_iter()
            .filter_map(|o| match o {
                SceneOutcome::Done(clip) => Some(clip),
                SceneOutcome::Skipped => None,
            })
            .collect();

        let failed: Vec<FailedScene> = clips
            .iter()
            .filter(|c| c.status != ClipStatus::Succeeded)
            .map(|c| FailedScene {
                scene_index: c.scene_index,
                attempts: c.attempts,
                detail: c.error.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        if !failed.is_empty() {
            return Err(CoordinatorError::ScenesFailed(failed));
        }

        ClipSet::assemble(clips, total).map_err(CoordinatorError::Incomplete)
    }

    /// Render one scene and fold its result into the shared progress counter.
    /// Extracted from `generate`'s stream map so the borrow lifetimes resolve.
    async fn process_scene(
        &self,
        job_id: i64,
        scene: &Scene,
        aspect_ratio: &str,
        cancel: &CancellationToken,
        progress: &Mutex<ClipProgress>,
        on_progress: &ProgressSink,
    ) -> SceneOutcome {
        // Cancellation stops new dispatches; clips already being
        // rendered drain on their own.
        if cancel.is_cancelled() {
            return SceneOutcome::Skipped;
        }
        let clip = self
            .generate_clip(job_id, scene, aspect_ratio, cancel)
            .await;
        let snapshot = {
            let mut p = progress.lock().unwrap();
            match clip.status {
                ClipStatus::Succeeded => p.succeeded += 1,
                _ => p.failed += 1,
            }
            *p
        };
        on_progress(snapshot);
        SceneOutcome::Done(clip)
    }

    /// Drive a single scene through submit/poll with per-scene retries.
    /// Never returns early on transient errors while budget remains.
    async fn generate_clip(
        &self,
        job_id: i64,
        scene: &Scene,
        aspect_ratio: &str,
        cancel: &CancellationToken,
    ) -> Clip {
        let mut clip = Clip::queued(scene.index);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            clip.attempts = attempt;
            match self
                .render_once(job_id, scene, aspect_ratio, &mut clip)
                .await
            {
                Ok(output_ref) => {
                    clip.status = ClipStatus::Succeeded;
                    clip.output_ref = Some(output_ref);
                    clip.error = None;
                    return clip;
                }
                Err(e) => {
                    // A retry is a new dispatch, so a cancelled job stops here.
                    if self.policy.should_retry(attempt, &e) && !cancel.is_cancelled() {
                        warn!(
                            job_id,
                            scene = scene.index,
                            attempt,
                            error = %e,
                            "render attempt failed, backing off"
                        );
                        clip.status = ClipStatus::Retrying;
                        clip.error = Some(e.to_string());
                        tokio::time::sleep(self.policy.delay_before(attempt + 1)).await;
                    } else {
                        clip.status = ClipStatus::Failed;
                        clip.error = Some(e.to_string());
                        return clip;
                    }
                }
            }
        }
    }

    async fn render_once(
        &self,
        job_id: i64,
        scene: &Scene,
        aspect_ratio: &str,
        clip: &mut Clip,
    ) -> Result<String, ProviderError> {
        let request = RenderRequest {
            job_id,
            scene_index: scene.index,
            micro_prompt: scene.micro_prompt.clone(),
            duration_secs: scene.duration_secs,
            aspect_ratio: aspect_ratio.to_string(),
            correlation_id: Uuid::new_v4().to_string(),
        };

        let request_id = self.renderer.submit(&request).await?;
        clip.provider_request_id = Some(request_id.clone());
        clip.status = ClipStatus::Running;

        let started = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if started.elapsed() > self.render_deadline {
                return Err(ProviderError::Timeout(self.render_deadline.as_secs()));
            }
            match self.renderer.poll(&request_id).await? {
                RenderPoll::Pending => continue,
                RenderPoll::Succeeded { output_ref } => return Ok(output_ref),
                RenderPoll::Failed { detail, retryable } => {
                    return Err(if retryable {
                        ProviderError::Network(detail)
                    } else {
                        ProviderError::ContentRejected(detail)
                    });
                }
            }
        }
    }
}
