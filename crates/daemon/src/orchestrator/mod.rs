use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use engine::plan::PipelineKind;
use engine::style::BrandConfig;
use engine::timeline::{ComposedTimeline, TimelineClip};

use crate::composer::{ComposerClient, CompositionRequest};
use crate::config::Config;
use crate::consistency::ConsistencyEngine;
use crate::coordinator::{ClipCoordinator, ClipProgress};
use crate::db::Database;
use crate::error::{CoordinatorError, SubmitError, ValidationError};
use crate::interpreter::InterpreterGateway;
use crate::planner::{ScenePlanner, TimingHints};
use crate::renderer::RendererClient;

pub mod edits;
pub mod state;

pub use state::{JobSnapshot, JobStage};

const MIN_PROMPT_CHARS: usize = 500;
const MAX_PROMPT_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub kind: PipelineKind,
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
    pub brand: Option<BrandConfig>,
    pub audio_ref: Option<String>,
    pub timing_hints: Option<TimingHints>,
}

/// Per-job runtime state: the cancellation token and, once the job holds a
/// pipeline slot, the semaphore permit. The permit is released by dropping
/// the entry at any terminal transition.
struct JobRuntime {
    cancel: CancellationToken,
    permit: Option<OwnedSemaphorePermit>,
}

/// Owns the job state machines. One logical state machine per job; jobs
/// progress independently, bounded by the global pipeline semaphore. Status
/// reads are snapshot clones and never await an external call.
pub struct Orchestrator {
    db: Arc<Database>,
    consistency: ConsistencyEngine,
    planner: ScenePlanner,
    coordinator: ClipCoordinator,
    composer: Arc<dyn ComposerClient>,
    interpreter: Arc<dyn InterpreterGateway>,
    pipeline_permits: Arc<Semaphore>,
    snapshots: RwLock<HashMap<i64, JobSnapshot>>,
    runtimes: Mutex<HashMap<i64, JobRuntime>>,
    edit_confidence_floor: f64,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Database>,
        config: &Config,
        interpreter: Arc<dyn InterpreterGateway>,
        renderer: Arc<dyn RendererClient>,
        composer: Arc<dyn ComposerClient>,
    ) -> Arc<Self> {
        Arc::new(Orchestrator {
            db,
            consistency: ConsistencyEngine::new(config.style_confidence_floor),
            planner: ScenePlanner::new(interpreter.clone(), config.planner_fallback_enabled),
            coordinator: ClipCoordinator::new(
                renderer,
                config.retry.clone(),
                config.clip_workers,
                config.render_poll_interval,
                config.render_deadline,
            ),
            composer,
            interpreter,
            pipeline_permits: Arc::new(Semaphore::new(config.max_concurrent_pipelines)),
            snapshots: RwLock::new(HashMap::new()),
            runtimes: Mutex::new(HashMap::new()),
            edit_confidence_floor: config.edit_confidence_floor,
        })
    }

    /// Validate, record, and start a job. Returns the job id immediately;
    /// the pipeline advances on its own task.
    pub fn submit(self: &Arc<Self>, request: SubmitRequest) -> Result<i64, SubmitError> {
        validate_submit(&request)?;

        let brand_json = request
            .brand
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| SubmitError::Internal(e.into()))?;
        let job_id = self.db.create_job(
            request.kind.as_str(),
            &request.prompt,
            request.duration_secs,
            &request.aspect_ratio,
            brand_json.as_deref(),
            request.audio_ref.as_deref(),
        )?;

        let cancel = CancellationToken::new();
        self.snapshots
            .write()
            .unwrap()
            .insert(job_id, JobSnapshot::new(job_id, request.kind));
        self.runtimes.lock().unwrap().insert(
            job_id,
            JobRuntime {
                cancel: cancel.clone(),
                permit: None,
            },
        );
        info!(job_id, kind = request.kind.as_str(), "job accepted");

        let this = self.clone();
        tokio::spawn(async move {
            this.run_job(job_id, request, cancel).await;
        });
        Ok(job_id)
    }

    /// Last-known snapshot; lock-free of any external call.
    pub fn get_status(&self, job_id: i64) -> Option<JobSnapshot> {
        self.snapshots.read().unwrap().get(&job_id).cloned()
    }

    /// Cooperative cancellation: recorded immediately, new work stops, work
    /// already in flight drains. Returns false for unknown or terminal jobs.
    pub fn cancel(&self, job_id: i64) -> bool {
        {
            let mut snapshots = self.snapshots.write().unwrap();
            let Some(snapshot) = snapshots.get_mut(&job_id) else {
                return false;
            };
            if snapshot.stage.is_terminal() {
                return false;
            }
            snapshot.cancel_requested = true;
            snapshot.updated_at = Utc::now();
        }
        if let Some(runtime) = self.runtimes.lock().unwrap().get(&job_id) {
            runtime.cancel.cancel();
        }
        info!(job_id, "cancellation requested");
        true
    }

    async fn run_job(self: Arc<Self>, job_id: i64, request: SubmitRequest, cancel: CancellationToken) {
        // Global pipeline cap: the job waits in CREATED until a slot frees.
        let permit = match self.pipeline_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.fail_job(job_id, "pipeline semaphore closed");
                return;
            }
        };
        if let Some(runtime) = self.runtimes.lock().unwrap().get_mut(&job_id) {
            runtime.permit = Some(permit);
        }
        if cancel.is_cancelled() {
            self.finish_cancelled(job_id);
            return;
        }

        if let Err(e) = self.advance(job_id, JobStage::Validating) {
            self.fail_job(job_id, &e);
            return;
        }

        let style = self.consistency.build_style_vector(request.brand.as_ref());
        if !style.conflicts.is_empty() {
            self.push_warnings(job_id, &style.conflicts);
        }

        if let Err(e) = self.advance(job_id, JobStage::Planning) {
            self.fail_job(job_id, &e);
            return;
        }
        let mut plan = match self
            .planner
            .plan(
                &request.prompt,
                &style.vector.visual_anchor,
                request.kind,
                request.duration_secs,
                request.timing_hints.as_ref(),
            )
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                self.fail_job(job_id, &format!("planning failed: {}", e));
                return;
            }
        };
        for scene in &mut plan.scenes {
            scene.micro_prompt = self.consistency.enforce(&scene.micro_prompt, &style).text;
        }
        match serde_json::to_string(&plan) {
            Ok(json) => {
                if let Err(e) = self.db.set_job_plan(job_id, &json) {
                    warn!(job_id, error = %e, "failed to persist scene plan");
                }
            }
            Err(e) => warn!(job_id, error = %e, "scene plan not serializable"),
        }

        if cancel.is_cancelled() {
            self.finish_cancelled(job_id);
            return;
        }
        if let Err(e) = self.advance(job_id, JobStage::Generating) {
            self.fail_job(job_id, &e);
            return;
        }

        let sink_self = self.clone();
        let sink = move |progress: ClipProgress| sink_self.update_clip_progress(job_id, progress);
        let generated = self
            .coordinator
            .generate(job_id, &plan, &request.aspect_ratio, &cancel, &sink)
            .await;

        let clip_set = match generated {
            Ok(clip_set) => clip_set,
            Err(CoordinatorError::Cancelled) => {
                self.finish_cancelled(job_id);
                return;
            }
            Err(e) => {
                self.fail_job(job_id, &e.to_string());
                return;
            }
        };
        if cancel.is_cancelled() {
            self.finish_cancelled(job_id);
            return;
        }

        let durations: Vec<u32> = plan.scenes.iter().map(|s| s.duration_secs).collect();
        let mut timeline = ComposedTimeline::new(request.aspect_ratio.clone());
        for clip in clip_set.clips() {
            timeline.clips.push(TimelineClip::new(
                clip.scene_index,
                durations.get(clip.scene_index).copied().unwrap_or(0) as f64,
                clip.output_ref.clone().unwrap_or_default(),
            ));
        }
        let timeline_json = match serde_json::to_string(&timeline) {
            Ok(json) => json,
            Err(e) => {
                self.fail_job(job_id, &format!("timeline not serializable: {}", e));
                return;
            }
        };
        let composition_id = match self.db.create_composition(job_id, None, &timeline_json) {
            Ok(id) => id,
            Err(e) => {
                self.fail_job(job_id, &format!("failed to record composition: {}", e));
                return;
            }
        };
        if let Some(snapshot) = self.snapshots.write().unwrap().get_mut(&job_id) {
            snapshot.composition_id = Some(composition_id);
            snapshot.updated_at = Utc::now();
        }

        let composition = CompositionRequest::from_clip_set(
            job_id,
            &request.aspect_ratio,
            request.audio_ref.as_deref(),
            &durations,
            &clip_set,
        );
        if let Err(e) = self.composer.compose(&composition).await {
            self.fail_job(job_id, &format!("composition trigger failed: {}", e));
            return;
        }
        // COMPOSING is entered only once the trigger is accepted, so a
        // snapshot showing this stage always carries the composition id.
        if let Err(e) = self.advance(job_id, JobStage::Composing) {
            self.fail_job(job_id, &e);
            return;
        }
        info!(job_id, composition_id, "composition triggered, awaiting callback");
        // The pipeline permit stays held until the completion callback.
    }

    /// Inbound completion signal from the composition capability. Idempotent:
    /// callbacks for jobs not in COMPOSING are logged and dropped.
    pub fn handle_composition_result(
        &self,
        job_id: i64,
        success: bool,
        output_ref: Option<&str>,
        error_detail: Option<&str>,
    ) -> anyhow::Result<()> {
        let (stage, cancel_requested, composition_id) = {
            let snapshots = self.snapshots.read().unwrap();
            let snapshot = snapshots
                .get(&job_id)
                .ok_or_else(|| anyhow::anyhow!("unknown job {}", job_id))?;
            (snapshot.stage, snapshot.cancel_requested, snapshot.composition_id)
        };
        if stage != JobStage::Composing {
            warn!(job_id, stage = stage.as_str(), "ignoring composition callback");
            return Ok(());
        }
        if cancel_requested {
            self.finish_cancelled(job_id);
            return Ok(());
        }

        if success {
            if let (Some(composition_id), Some(output_ref)) = (composition_id, output_ref) {
                if let Err(e) = self.db.set_composition_output(composition_id, output_ref) {
                    warn!(job_id, error = %e, "failed to record composition output");
                }
            }
            if let Err(e) = self.advance(job_id, JobStage::Complete) {
                self.fail_job(job_id, &e);
                return Ok(());
            }
            self.release_runtime(job_id);
            info!(job_id, "job complete");
        } else {
            self.fail_job(
                job_id,
                error_detail.unwrap_or("composition failed"),
            );
        }
        Ok(())
    }

    fn advance(&self, job_id: i64, stage: JobStage) -> Result<(), String> {
        {
            let mut snapshots = self.snapshots.write().unwrap();
            let snapshot = snapshots
                .get_mut(&job_id)
                .ok_or_else(|| format!("job {} missing from snapshot map", job_id))?;
            snapshot.advance(stage)?;
        }
        if let Err(e) = self.db.set_job_status(job_id, stage.as_str(), None) {
            warn!(job_id, error = %e, "failed to persist job status");
        }
        info!(job_id, stage = stage.as_str(), "job stage advanced");
        Ok(())
    }

    fn update_clip_progress(&self, job_id: i64, progress: ClipProgress) {
        let mut snapshots = self.snapshots.write().unwrap();
        if let Some(snapshot) = snapshots.get_mut(&job_id) {
            snapshot.clips_total = progress.total;
            snapshot.clips_succeeded = progress.succeeded;
            snapshot.clips_failed = progress.failed;
            if progress.total > 0 {
                let base = JobStage::Generating.base_percent() as usize;
                let span = (JobStage::Composing.base_percent()
                    - JobStage::Generating.base_percent()) as usize;
                let percent = (base + span * progress.succeeded / progress.total) as u8;
                snapshot.percent = snapshot.percent.max(percent);
            }
            snapshot.updated_at = Utc::now();
        }
    }

    fn push_warnings(&self, job_id: i64, warnings: &[String]) {
        let mut snapshots = self.snapshots.write().unwrap();
        if let Some(snapshot) = snapshots.get_mut(&job_id) {
            snapshot.warnings.extend(warnings.iter().cloned());
            snapshot.updated_at = Utc::now();
        }
    }

    fn fail_job(&self, job_id: i64, detail: &str) {
        error!(job_id, detail, "job failed");
        {
            let mut snapshots = self.snapshots.write().unwrap();
            if let Some(snapshot) = snapshots.get_mut(&job_id) {
                if !snapshot.stage.is_terminal() {
                    if let Err(e) = snapshot.advance(JobStage::Failed) {
                        warn!(job_id, error = %e, "failed transition rejected");
                    }
                    snapshot.error = Some(detail.to_string());
                }
            }
        }
        if let Err(e) = self.db.set_job_status(job_id, "failed", Some(detail)) {
            warn!(job_id, error = %e, "failed to persist failure");
        }
        self.release_runtime(job_id);
    }

    fn finish_cancelled(&self, job_id: i64) {
        info!(job_id, "job cancelled");
        {
            let mut snapshots = self.snapshots.write().unwrap();
            if let Some(snapshot) = snapshots.get_mut(&job_id) {
                if !snapshot.stage.is_terminal() {
                    if let Err(e) = snapshot.advance(JobStage::Cancelled) {
                        warn!(job_id, error = %e, "cancelled transition rejected");
                    }
                }
            }
        }
        if let Err(e) = self.db.set_job_status(job_id, "cancelled", None) {
            warn!(job_id, error = %e, "failed to persist cancellation");
        }
        self.release_runtime(job_id);
    }

    /// Drops the cancellation token and pipeline permit for a finished job.
    fn release_runtime(&self, job_id: i64) {
        self.runtimes.lock().unwrap().remove(&job_id);
    }
}

fn validate_submit(request: &SubmitRequest) -> Result<(), ValidationError> {
    let prompt_chars = request.prompt.chars().count();
    if !(MIN_PROMPT_CHARS..=MAX_PROMPT_CHARS).contains(&prompt_chars) {
        return Err(ValidationError(format!(
            "prompt must be {}-{} characters, got {}",
            MIN_PROMPT_CHARS, MAX_PROMPT_CHARS, prompt_chars
        )));
    }
    let (min, max) = request.kind.duration_bounds();
    if !(min..=max).contains(&request.duration_secs) {
        return Err(ValidationError(format!(
            "{} pipeline duration must be {}-{}s, got {}s",
            request.kind.as_str(),
            min,
            max,
            request.duration_secs
        )));
    }
    let aspect_ok = request
        .aspect_ratio
        .split_once(':')
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
        .map(|(w, h)| w > 0 && h > 0)
        .unwrap_or(false);
    if !aspect_ok {
        return Err(ValidationError(format!(
            "aspect ratio '{}' is not of the form W:H",
            request.aspect_ratio
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::time::Duration;

    fn valid_request(kind: PipelineKind, duration_secs: u32) -> SubmitRequest {
        SubmitRequest {
            kind,
            prompt: "p".repeat(600),
            duration_secs,
            aspect_ratio: "16:9".to_string(),
            brand: None,
            audio_ref: None,
            timing_hints: None,
        }
    }

    #[tokio::test]
    async fn below_minimum_duration_is_rejected_without_a_job() {
        let harness = Harness::default_stubs();
        let err = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 10))
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert!(harness.db.get_job(1).unwrap().is_none());
        assert!(harness.orchestrator.get_status(1).is_none());
    }

    #[tokio::test]
    async fn short_prompt_is_rejected() {
        let harness = Harness::default_stubs();
        let mut request = valid_request(PipelineKind::Ad, 30);
        request.prompt = "too short".to_string();
        let err = harness.orchestrator.submit(request).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_aspect_ratio_is_rejected() {
        let harness = Harness::default_stubs();
        let mut request = valid_request(PipelineKind::Ad, 30);
        request.aspect_ratio = "wide".to_string();
        let err = harness.orchestrator.submit(request).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn thirty_second_ad_reaches_complete_via_callback() {
        let harness = Harness::default_stubs();
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");

        harness.wait_for_stage(job_id, JobStage::Composing).await;
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert_eq!(snapshot.clips_total, 4);
        assert_eq!(snapshot.clips_succeeded, 4);
        assert_eq!(snapshot.clips_failed, 0);
        let composition_id = snapshot.composition_id.expect("composition recorded");

        // Exactly one composition trigger, with all four clips in order.
        let composed = harness.composer.compositions();
        assert_eq!(composed.len(), 1);
        let order: Vec<usize> = composed[0].clips.iter().map(|c| c.scene_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(
            composed[0].clips.iter().map(|c| c.duration_secs).sum::<u32>(),
            30
        );

        harness
            .orchestrator
            .handle_composition_result(job_id, true, Some("renders/final.mp4"), None)
            .expect("callback");
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert_eq!(snapshot.stage, JobStage::Complete);
        assert_eq!(snapshot.percent, 100);

        let composition = harness
            .db
            .get_composition(composition_id)
            .unwrap()
            .expect("stored");
        assert_eq!(composition.output_ref.as_deref(), Some("renders/final.mp4"));
        assert_eq!(harness.db.get_job(job_id).unwrap().unwrap().status, "complete");
    }

    #[tokio::test]
    async fn exhausted_scene_fails_job_and_never_composes() {
        let harness = Harness::with_failing_scene(2);
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");

        harness.wait_for_stage(job_id, JobStage::Failed).await;
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        let error = snapshot.error.expect("error detail");
        assert!(error.contains("2"), "error should name scene 2: {}", error);
        assert!(harness.composer.compositions().is_empty());
        assert_eq!(harness.db.get_job(job_id).unwrap().unwrap().status, "failed");
    }

    #[tokio::test]
    async fn get_status_is_idempotent_between_transitions() {
        let harness = Harness::default_stubs();
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");
        harness.wait_for_stage(job_id, JobStage::Composing).await;

        let first = harness.orchestrator.get_status(job_id).expect("snapshot");
        let second = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn cancellation_is_recorded_immediately_and_becomes_terminal() {
        let harness = Harness::gated();
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");
        harness.wait_for_stage(job_id, JobStage::Generating).await;

        assert!(harness.orchestrator.cancel(job_id));
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert!(snapshot.cancel_requested);

        // Let the in-flight renders drain, then the job lands in CANCELLED.
        harness.open_gate();
        harness.wait_for_stage(job_id, JobStage::Cancelled).await;
        assert!(harness.composer.compositions().is_empty());
        assert_eq!(
            harness.db.get_job(job_id).unwrap().unwrap().status,
            "cancelled"
        );
        // Cancelling a terminal job is a no-op.
        assert!(!harness.orchestrator.cancel(job_id));
    }

    #[tokio::test]
    async fn global_cap_holds_second_job_in_created() {
        let harness = Harness::gated_with_cap(1);
        let first = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");
        harness.wait_for_stage(first, JobStage::Generating).await;

        let second = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 28))
            .expect("submit");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            harness.orchestrator.get_status(second).unwrap().stage,
            JobStage::Created
        );

        // First job finishing its whole pipeline releases the slot.
        harness.open_gate();
        harness.wait_for_stage(first, JobStage::Composing).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            harness.orchestrator.get_status(second).unwrap().stage,
            JobStage::Created
        );
        harness
            .orchestrator
            .handle_composition_result(first, true, Some("renders/1.mp4"), None)
            .expect("callback");
        harness.wait_for_stage(second, JobStage::Composing).await;
    }

    #[tokio::test]
    async fn failed_composition_callback_fails_the_job() {
        let harness = Harness::default_stubs();
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");
        harness.wait_for_stage(job_id, JobStage::Composing).await;
        harness
            .orchestrator
            .handle_composition_result(job_id, false, None, Some("encoder crashed"))
            .expect("callback");
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert_eq!(snapshot.stage, JobStage::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("encoder crashed"));
    }

    #[tokio::test]
    async fn duplicate_callback_is_ignored() {
        let harness = Harness::default_stubs();
        let job_id = harness
            .orchestrator
            .submit(valid_request(PipelineKind::Ad, 30))
            .expect("submit");
        harness.wait_for_stage(job_id, JobStage::Composing).await;
        harness
            .orchestrator
            .handle_composition_result(job_id, true, Some("renders/final.mp4"), None)
            .expect("callback");
        harness
            .orchestrator
            .handle_composition_result(job_id, false, None, Some("stray retry"))
            .expect("duplicate ignored");
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert_eq!(snapshot.stage, JobStage::Complete);
    }

    #[tokio::test]
    async fn brand_conflicts_surface_as_warnings() {
        let harness = Harness::default_stubs();
        let mut request = valid_request(PipelineKind::Ad, 30);
        request.brand = Some(BrandConfig {
            colors: vec!["#404040".to_string(), "#4a4a4a".to_string()],
            logo_url: Some("logo.png".to_string()),
            tone_keywords: vec!["bold".to_string()],
            brand_name: None,
        });
        let job_id = harness.orchestrator.submit(request).expect("submit");
        harness.wait_for_stage(job_id, JobStage::Composing).await;
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert!(snapshot
            .warnings
            .iter()
            .any(|w| w.contains("low contrast")));
    }

    #[tokio::test]
    async fn music_pipeline_plans_within_scene_bounds() {
        let harness = Harness::with_beats(12);
        let mut request = valid_request(PipelineKind::Music, 120);
        request.kind = PipelineKind::Music;
        let job_id = harness.orchestrator.submit(request).expect("submit");
        harness.wait_for_stage(job_id, JobStage::Composing).await;
        let snapshot = harness.orchestrator.get_status(job_id).expect("snapshot");
        assert!((10..=20).contains(&snapshot.clips_total));
        assert_eq!(snapshot.clips_succeeded, snapshot.clips_total);
    }
}
