use crate::edit::{EditOperation, EditPlan};
use crate::timeline::ComposedTimeline;

impl ComposedTimeline {
    /// Apply one operation in place. Callers validate index bounds up front
    /// (see `edit::first_invalid_reference`); failures here mean the
    /// operation parameters themselves are unusable.
    pub fn apply_operation(&mut self, op: &EditOperation) -> Result<(), String> {
        match op {
            EditOperation::Trim {
                index,
                new_duration_secs,
            } => {
                if *new_duration_secs <= 0.0 {
                    return Err(format!(
                        "trim on clip {} would leave non-positive duration",
                        index
                    ));
                }
                let clip = self
                    .clips
                    .get_mut(*index)
                    .ok_or_else(|| format!("clip {} not found", index))?;
                clip.duration_secs = *new_duration_secs;
                Ok(())
            }
            EditOperation::Crop {
                start_index,
                end_index,
                aspect_ratio,
            } => {
                if *start_index > *end_index || *end_index >= self.clips.len() {
                    return Err(format!(
                        "crop range {}..={} out of bounds",
                        start_index, end_index
                    ));
                }
                for clip in &mut self.clips[*start_index..=*end_index] {
                    clip.crop_aspect = Some(aspect_ratio.clone());
                }
                Ok(())
            }
            EditOperation::Swap {
                first_index,
                second_index,
            } => {
                if *first_index >= self.clips.len() || *second_index >= self.clips.len() {
                    return Err("swap index out of bounds".to_string());
                }
                self.clips.swap(*first_index, *second_index);
                Ok(())
            }
            EditOperation::Retime {
                start_index,
                end_index,
                speed,
            } => {
                if *speed <= 0.0 {
                    return Err("retime speed must be positive".to_string());
                }
                if *start_index > *end_index || *end_index >= self.clips.len() {
                    return Err(format!(
                        "retime range {}..={} out of bounds",
                        start_index, end_index
                    ));
                }
                for clip in &mut self.clips[*start_index..=*end_index] {
                    clip.speed *= speed;
                    clip.duration_secs /= speed;
                }
                Ok(())
            }
        }
    }

    /// Apply a whole plan in listed order, stopping at the first failure.
    pub fn apply_plan(&mut self, plan: &EditPlan) -> Result<(), String> {
        for (position, op) in plan.operations.iter().enumerate() {
            self.apply_operation(op)
                .map_err(|e| format!("operation {} failed: {}", position, e))?;
        }
        Ok(())
    }
}
