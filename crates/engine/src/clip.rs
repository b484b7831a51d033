use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    Queued,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

/// Generated output for a single scene, prior to composition.
/// Immutable once status reaches Succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub scene_index: usize,
    pub provider_request_id: Option<String>,
    pub status: ClipStatus,
    pub attempts: u32,
    pub output_ref: Option<String>,
    pub error: Option<String>,
}

impl Clip {
    pub fn queued(scene_index: usize) -> Self {
        Clip {
            scene_index,
            provider_request_id: None,
            status: ClipStatus::Queued,
            attempts: 0,
            output_ref: None,
            error: None,
        }
    }
}

/// Complete, scene-ordered set of clips handed to composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSet {
    clips: Vec<Clip>,
}

impl ClipSet {
    /// Assemble from clips in arbitrary completion order. Fails unless every
    /// scene index 0..expected_scenes appears exactly once and succeeded --
    /// composition must never see a partial or out-of-order set.
    pub fn assemble(mut clips: Vec<Clip>, expected_scenes: usize) -> Result<Self, String> {
        if clips.len() != expected_scenes {
            return Err(format!(
                "expected {} clips, got {}",
                expected_scenes,
                clips.len()
            ));
        }
        clips.sort_by_key(|c| c.scene_index);
        for (position, clip) in clips.iter().enumerate() {
            if clip.scene_index != position {
                return Err(format!(
                    "missing or duplicate clip for scene {}",
                    position
                ));
            }
            if clip.status != ClipStatus::Succeeded {
                return Err(format!("clip for scene {} has not succeeded", position));
            }
            if clip.output_ref.is_none() {
                return Err(format!("clip for scene {} has no output reference", position));
            }
        }
        Ok(ClipSet { clips })
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
