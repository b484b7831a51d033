use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Ad,
    Music,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Ad => "ad",
            PipelineKind::Music => "music",
        }
    }

    /// Valid target duration window in seconds for this pipeline.
    pub fn duration_bounds(&self) -> (u32, u32) {
        match self {
            PipelineKind::Ad => (15, 60),
            PipelineKind::Music => (60, 180),
        }
    }

    /// Valid scene count window for this pipeline.
    pub fn scene_bounds(&self) -> (usize, usize) {
        match self {
            PipelineKind::Ad => (3, 5),
            PipelineKind::Music => (10, 20),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub duration_secs: u32,
    pub description: String,
    pub micro_prompt: String,
    pub status: SceneStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePlan {
    pub kind: PipelineKind,
    pub target_secs: u32,
    pub scenes: Vec<Scene>,
}

impl ScenePlan {
    pub fn total_secs(&self) -> u32 {
        self.scenes.iter().map(|s| s.duration_secs).sum()
    }

    /// Scene indices must be contiguous starting at 0 and durations must sum
    /// to the requested total.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (position, scene) in self.scenes.iter().enumerate() {
            if scene.index != position {
                return Err(format!(
                    "scene index {} at position {} breaks contiguity",
                    scene.index, position
                ));
            }
            if scene.duration_secs == 0 {
                return Err(format!("scene {} has zero duration", scene.index));
            }
        }
        let total = self.total_secs();
        if total != self.target_secs {
            return Err(format!(
                "scene durations sum to {}s, target is {}s",
                total, self.target_secs
            ));
        }
        Ok(())
    }
}

/// Evenly distribute `total_secs` across `count` scenes in whole seconds.
/// The remainder lands on the final scene so the sum stays exact.
pub fn distribute_durations(total_secs: u32, count: usize) -> Vec<u32> {
    if count == 0 {
        return Vec::new();
    }
    let count_u32 = count as u32;
    let base = total_secs / count_u32;
    let remainder = total_secs % count_u32;
    let mut durations = vec![base; count];
    if let Some(last) = durations.last_mut() {
        *last += remainder;
    }
    durations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribute_exact_division() {
        assert_eq!(distribute_durations(28, 4), vec![7, 7, 7, 7]);
    }

    #[test]
    fn distribute_remainder_goes_to_final_scene() {
        assert_eq!(distribute_durations(30, 4), vec![7, 7, 7, 9]);
        assert_eq!(distribute_durations(31, 3), vec![10, 10, 11]);
    }

    #[test]
    fn distribute_sum_is_always_exact() {
        for total in [15u32, 30, 60, 93, 180] {
            for count in 3..=20usize {
                let durations = distribute_durations(total, count);
                assert_eq!(durations.iter().sum::<u32>(), total);
                assert_eq!(durations.len(), count);
            }
        }
    }

    #[test]
    fn plan_invariants_reject_gaps_and_bad_sums() {
        let scene = |index: usize, duration_secs: u32| Scene {
            index,
            duration_secs,
            description: "beat".to_string(),
            micro_prompt: "prompt".to_string(),
            status: SceneStatus::Pending,
        };

        let good = ScenePlan {
            kind: PipelineKind::Ad,
            target_secs: 20,
            scenes: vec![scene(0, 7), scene(1, 7), scene(2, 6)],
        };
        assert!(good.check_invariants().is_ok());

        let gapped = ScenePlan {
            kind: PipelineKind::Ad,
            target_secs: 20,
            scenes: vec![scene(0, 10), scene(2, 10)],
        };
        assert!(gapped.check_invariants().is_err());

        let short = ScenePlan {
            kind: PipelineKind::Ad,
            target_secs: 20,
            scenes: vec![scene(0, 9), scene(1, 9)],
        };
        assert!(short.check_invariants().is_err());
    }
}
