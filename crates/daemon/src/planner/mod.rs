use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use engine::plan::{distribute_durations, PipelineKind, Scene, ScenePlan, SceneStatus};

use crate::error::PlanningError;
use crate::interpreter::{InterpreterGateway, Storyboard, StoryboardRequest};

/// Ads aim for scenes around this long; the count clamp does the rest.
const AD_SCENE_TARGET_SECS: f64 = 7.0;
/// Music scene window when no tempo is available.
const MUSIC_DEFAULT_WINDOW_SECS: f64 = 8.0;
/// Bars per music scene when tempo is known.
const MUSIC_BARS_PER_SCENE: f64 = 2.0;

/// Optional audio timing input. Only tempo feeds the MVP heuristics;
/// downbeats are carried for the beat-aligned planning mode and unused here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingHints {
    pub tempo_bpm: Option<f64>,
    #[serde(default)]
    pub downbeat_secs: Vec<f64>,
}

pub struct ScenePlanner {
    interpreter: Arc<dyn InterpreterGateway>,
    fallback_enabled: bool,
}

/// Scene count from total duration and pipeline heuristics alone.
pub fn scene_count(kind: PipelineKind, target_secs: u32, hints: Option<&TimingHints>) -> usize {
    let (min, max) = kind.scene_bounds();
    let window = match kind {
        PipelineKind::Ad => AD_SCENE_TARGET_SECS,
        PipelineKind::Music => hints
            .and_then(|h| h.tempo_bpm)
            .map(|bpm| (240.0 / bpm * MUSIC_BARS_PER_SCENE).clamp(2.0, 12.0))
            .unwrap_or(MUSIC_DEFAULT_WINDOW_SECS),
    };
    let raw = (target_secs as f64 / window).round() as usize;
    raw.clamp(min, max)
}

impl ScenePlanner {
    pub fn new(interpreter: Arc<dyn InterpreterGateway>, fallback_enabled: bool) -> Self {
        ScenePlanner {
            interpreter,
            fallback_enabled,
        }
    }

    /// Build an ordered scene plan for the job. The storyboard call is the
    /// only non-deterministic input; everything downstream of it is pure.
    pub async fn plan(
        &self,
        prompt: &str,
        visual_anchor: &str,
        kind: PipelineKind,
        target_secs: u32,
        hints: Option<&TimingHints>,
    ) -> Result<ScenePlan, PlanningError> {
        let count = scene_count(kind, target_secs, hints);
        let request = StoryboardRequest {
            prompt: prompt.to_string(),
            kind,
            scene_count: count,
            target_secs,
            visual_anchor: visual_anchor.to_string(),
        };

        let storyboard = match self.storyboard_with_retry(&request, kind).await {
            Ok(storyboard) => storyboard,
            Err(e) if self.fallback_enabled => {
                warn!(error = %e, "storyboard failed, using templated fallback scenes");
                templated_storyboard(kind, count)
            }
            Err(e) => return Err(e),
        };

        let scene_n = storyboard.beats.len().min(count);
        let durations = distribute_durations(target_secs, scene_n);

        let scenes = storyboard
            .beats
            .iter()
            .take(scene_n)
            .zip(durations.iter())
            .enumerate()
            .map(|(index, (beat, duration))| Scene {
                index,
                duration_secs: *duration,
                description: beat.description.clone(),
                micro_prompt: format!(
                    "Scene {}/{} ({}s, {} video): {}",
                    index + 1,
                    scene_n,
                    duration,
                    kind.as_str(),
                    beat.description
                ),
                status: SceneStatus::Pending,
            })
            .collect();

        let plan = ScenePlan {
            kind,
            target_secs,
            scenes,
        };
        plan.check_invariants()
            .map_err(PlanningError::Malformed)?;
        Ok(plan)
    }

    /// One retry on transient gateway failure or malformed/short structure;
    /// non-retryable provider rejections surface immediately.
    async fn storyboard_with_retry(
        &self,
        request: &StoryboardRequest,
        kind: PipelineKind,
    ) -> Result<Storyboard, PlanningError> {
        let (min, _) = kind.scene_bounds();
        let mut last_err = None;
        for attempt in 1..=2u32 {
            match self.interpreter.storyboard(request).await {
                Ok(storyboard) => {
                    if let Err(e) = validate_storyboard(&storyboard, min) {
                        warn!(attempt, error = %e, "storyboard structure rejected");
                        last_err = Some(e);
                        continue;
                    }
                    return Ok(storyboard);
                }
                Err(e) if e.is_transient() && attempt == 1 => {
                    warn!(attempt, error = %e, "storyboard call failed, retrying");
                    last_err = Some(PlanningError::Interpreter(e));
                }
                Err(e) => return Err(PlanningError::Interpreter(e)),
            }
        }
        Err(last_err.unwrap_or(PlanningError::Malformed(
            "storyboard retry loop exhausted".to_string(),
        )))
    }
}

fn validate_storyboard(storyboard: &Storyboard, min_scenes: usize) -> Result<(), PlanningError> {
    if storyboard.beats.len() < min_scenes {
        return Err(PlanningError::TooFewScenes {
            got: storyboard.beats.len(),
            min: min_scenes,
        });
    }
    if storyboard
        .beats
        .iter()
        .any(|b| b.description.trim().is_empty())
    {
        return Err(PlanningError::Malformed(
            "storyboard contains an empty beat description".to_string(),
        ));
    }
    Ok(())
}

const AD_TEMPLATE_BEATS: &[&str] = &[
    "Open on the product in use, hero framing",
    "Close-up on the key feature in action",
    "Lifestyle moment showing the benefit",
    "Social proof beat, satisfied customer reaction",
    "Brand logo and call to action on clean background",
];

const MUSIC_TEMPLATE_BEATS: &[&str] = &[
    "Wide establishing shot matching the track mood",
    "Performer silhouette against bold lighting",
    "Abstract motion graphics pulsing with the rhythm",
    "Tight detail shot, texture and movement",
    "Crowd energy, handheld feel",
    "Slow-motion interlude, negative space",
    "Color-washed cityscape at night",
    "Pattern and symmetry interlude",
    "Build-up visual, accelerating cuts",
    "Climactic wide shot resolving the motif",
];

/// Generic templated scenes used only when the fallback is configured.
fn templated_storyboard(kind: PipelineKind, count: usize) -> Storyboard {
    let beats_pool = match kind {
        PipelineKind::Ad => AD_TEMPLATE_BEATS,
        PipelineKind::Music => MUSIC_TEMPLATE_BEATS,
    };
    let beats = (0..count)
        .map(|i| crate::interpreter::SceneBeat {
            description: beats_pool[i % beats_pool.len()].to_string(),
            mood: None,
        })
        .collect();
    Storyboard {
        overview: "templated storyboard".to_string(),
        beats,
    }
}
