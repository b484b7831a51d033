use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::composer::{ComposerClient, CompositionRequest, RecompositionRequest};
use crate::config::Config;
use crate::db::Database;
use crate::error::ProviderError;
use crate::interpreter::{
    EditIntent, EditIntentRequest, InterpreterGateway, SceneBeat, Storyboard, StoryboardRequest,
};
use crate::orchestrator::{JobStage, Orchestrator};
use crate::renderer::{RenderPoll, RenderRequest, RendererClient};

/// Interpreter stub: storyboards always return `beats` beats; edit intents
/// pop from a script so tests control each interpretation.
pub struct StubInterpreter {
    pub beats: usize,
    pub edit_outcomes: Mutex<Vec<Result<EditIntent, ProviderError>>>,
}

impl StubInterpreter {
    pub fn new(beats: usize) -> Self {
        StubInterpreter {
            beats,
            edit_outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn script_edit(&self, outcome: Result<EditIntent, ProviderError>) {
        self.edit_outcomes.lock().unwrap().push(outcome);
    }
}

#[async_trait]
impl InterpreterGateway for StubInterpreter {
    async fn storyboard(&self, _request: &StoryboardRequest) -> Result<Storyboard, ProviderError> {
        Ok(Storyboard {
            overview: "stub overview".to_string(),
            beats: (0..self.beats)
                .map(|i| SceneBeat {
                    description: format!("beat {}", i),
                    mood: None,
                })
                .collect(),
        })
    }

    async fn edit_intent(&self, _request: &EditIntentRequest) -> Result<EditIntent, ProviderError> {
        let mut outcomes = self.edit_outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Err(ProviderError::Network("edit script exhausted".to_string()));
        }
        outcomes.remove(0)
    }
}

/// Renderer that succeeds on the first poll.
pub struct InstantRenderer;

#[async_trait]
impl RendererClient for InstantRenderer {
    async fn submit(&self, _request: &RenderRequest) -> Result<String, ProviderError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn poll(&self, request_id: &str) -> Result<RenderPoll, ProviderError> {
        Ok(RenderPoll::Succeeded {
            output_ref: format!("clips/{}.mp4", request_id),
        })
    }
}

/// Renderer that permanently rejects one scene and succeeds elsewhere.
pub struct FailingSceneRenderer {
    pub scene: usize,
}

#[async_trait]
impl RendererClient for FailingSceneRenderer {
    async fn submit(&self, request: &RenderRequest) -> Result<String, ProviderError> {
        Ok(format!("scene-{}", request.scene_index))
    }

    async fn poll(&self, request_id: &str) -> Result<RenderPoll, ProviderError> {
        if request_id == format!("scene-{}", self.scene) {
            Ok(RenderPoll::Failed {
                detail: format!("content rejected for scene {}", self.scene),
                retryable: false,
            })
        } else {
            Ok(RenderPoll::Succeeded {
                output_ref: format!("clips/{}.mp4", request_id),
            })
        }
    }
}

/// Renderer that reports Pending until the gate opens.
pub struct GatedRenderer {
    pub gate: watch::Receiver<bool>,
}

#[async_trait]
impl RendererClient for GatedRenderer {
    async fn submit(&self, _request: &RenderRequest) -> Result<String, ProviderError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn poll(&self, request_id: &str) -> Result<RenderPoll, ProviderError> {
        if *self.gate.borrow() {
            Ok(RenderPoll::Succeeded {
                output_ref: format!("clips/{}.mp4", request_id),
            })
        } else {
            Ok(RenderPoll::Pending)
        }
    }
}

/// Composer that records triggers instead of calling anything.
#[derive(Default)]
pub struct RecordingComposer {
    compositions: Mutex<Vec<CompositionRequest>>,
    recompositions: Mutex<Vec<RecompositionRequest>>,
}

impl RecordingComposer {
    pub fn compositions(&self) -> Vec<CompositionRequest> {
        self.compositions.lock().unwrap().clone()
    }

    pub fn recompositions(&self) -> Vec<RecompositionRequest> {
        self.recompositions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComposerClient for RecordingComposer {
    async fn compose(&self, request: &CompositionRequest) -> Result<(), ProviderError> {
        self.compositions.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn recompose(&self, request: &RecompositionRequest) -> Result<(), ProviderError> {
        self.recompositions.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub db: Arc<Database>,
    pub composer: Arc<RecordingComposer>,
    pub interpreter: Arc<StubInterpreter>,
    gate: Option<watch::Sender<bool>>,
}

impl Harness {
    fn build(
        config: Config,
        interpreter: Arc<StubInterpreter>,
        renderer: Arc<dyn RendererClient>,
        gate: Option<watch::Sender<bool>>,
    ) -> Self {
        let db = Arc::new(Database::new_in_memory().expect("in-memory db"));
        let composer = Arc::new(RecordingComposer::default());
        let orchestrator = Orchestrator::new(
            db.clone(),
            &config,
            interpreter.clone(),
            renderer,
            composer.clone(),
        );
        Harness {
            orchestrator,
            db,
            composer,
            interpreter,
            gate,
        }
    }

    pub fn default_stubs() -> Self {
        Self::with_beats(4)
    }

    pub fn with_beats(beats: usize) -> Self {
        Self::build(
            Config::for_tests(),
            Arc::new(StubInterpreter::new(beats)),
            Arc::new(InstantRenderer),
            None,
        )
    }

    pub fn with_failing_scene(scene: usize) -> Self {
        Self::build(
            Config::for_tests(),
            Arc::new(StubInterpreter::new(4)),
            Arc::new(FailingSceneRenderer { scene }),
            None,
        )
    }

    pub fn gated() -> Self {
        Self::gated_with_cap(5)
    }

    pub fn gated_with_cap(cap: usize) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut config = Config::for_tests();
        config.max_concurrent_pipelines = cap;
        Self::build(
            config,
            Arc::new(StubInterpreter::new(4)),
            Arc::new(GatedRenderer { gate: rx }),
            Some(tx),
        )
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            let _ = gate.send(true);
        }
    }

    pub async fn wait_for_stage(&self, job_id: i64, stage: JobStage) {
        for _ in 0..1000 {
            if self.orchestrator.get_status(job_id).map(|s| s.stage) == Some(stage) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let current = self.orchestrator.get_status(job_id).map(|s| s.stage);
        panic!(
            "job {} never reached {:?}, currently {:?}",
            job_id, stage, current
        );
    }
}
