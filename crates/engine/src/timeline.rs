use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One clip as it sits in a composed timeline. `scene_index` identifies the
/// source scene; position in the vec is playback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineClip {
    pub id: String,
    pub scene_index: usize,
    pub duration_secs: f64,
    pub output_ref: String,
    pub speed: f64,
    pub crop_aspect: Option<String>,
}

impl TimelineClip {
    pub fn new(scene_index: usize, duration_secs: f64, output_ref: String) -> Self {
        TimelineClip {
            id: Uuid::new_v4().to_string(),
            scene_index,
            duration_secs,
            output_ref,
            speed: 1.0,
            crop_aspect: None,
        }
    }
}

/// Ordered clip list produced by composition; the target of edit operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedTimeline {
    pub aspect_ratio: String,
    pub clips: Vec<TimelineClip>,
}

impl ComposedTimeline {
    pub fn new(aspect_ratio: String) -> Self {
        ComposedTimeline {
            aspect_ratio,
            clips: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn total_secs(&self) -> f64 {
        self.clips.iter().map(|c| c.duration_secs).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_secs_sums_clip_durations() {
        let mut timeline = ComposedTimeline::new("16:9".to_string());
        timeline
            .clips
            .push(TimelineClip::new(0, 7.0, "clips/0.mp4".to_string()));
        timeline
            .clips
            .push(TimelineClip::new(1, 8.5, "clips/1.mp4".to_string()));
        assert_eq!(timeline.len(), 2);
        assert!((timeline.total_secs() - 15.5).abs() < f64::EPSILON);
    }
}
