use chrono::{DateTime, Utc};
use serde::Serialize;

use engine::plan::PipelineKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Created,
    Validating,
    Planning,
    Generating,
    Composing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Created => "created",
            JobStage::Validating => "validating",
            JobStage::Planning => "planning",
            JobStage::Generating => "generating",
            JobStage::Composing => "composing",
            JobStage::Complete => "complete",
            JobStage::Failed => "failed",
            JobStage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStage::Complete | JobStage::Failed | JobStage::Cancelled
        )
    }

    /// Forward edges of the job state machine. Failure and cancellation are
    /// reachable from every non-terminal stage; terminal stages absorb.
    pub fn can_transition_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStage::Failed | JobStage::Cancelled => true,
            JobStage::Validating => *self == JobStage::Created,
            JobStage::Planning => *self == JobStage::Validating,
            JobStage::Generating => *self == JobStage::Planning,
            JobStage::Composing => *self == JobStage::Generating,
            JobStage::Complete => *self == JobStage::Composing,
            JobStage::Created => false,
        }
    }

    /// Overall percentage on entering this stage. Generation interpolates
    /// between 20 and 90 as clips land.
    pub fn base_percent(&self) -> u8 {
        match self {
            JobStage::Created => 0,
            JobStage::Validating => 5,
            JobStage::Planning => 10,
            JobStage::Generating => 20,
            JobStage::Composing => 90,
            JobStage::Complete => 100,
            // Terminal failures freeze the last reported percentage.
            JobStage::Failed | JobStage::Cancelled => 0,
        }
    }
}

/// Last-known state of a job, readable without blocking on any external
/// call. All mutation goes through the orchestrator's transition methods.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: i64,
    pub kind: PipelineKind,
    pub stage: JobStage,
    pub percent: u8,
    pub clips_total: usize,
    pub clips_succeeded: usize,
    pub clips_failed: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub composition_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn new(id: i64, kind: PipelineKind) -> Self {
        let now = Utc::now();
        JobSnapshot {
            id,
            kind,
            stage: JobStage::Created,
            percent: 0,
            clips_total: 0,
            clips_succeeded: 0,
            clips_failed: 0,
            warnings: Vec::new(),
            error: None,
            cancel_requested: false,
            composition_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, keeping the reported percentage monotone.
    pub fn advance(&mut self, next: JobStage) -> Result<(), String> {
        if !self.stage.can_transition_to(next) {
            return Err(format!(
                "illegal transition {} -> {}",
                self.stage.as_str(),
                next.as_str()
            ));
        }
        self.stage = next;
        self.percent = self.percent.max(next.base_percent());
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            JobStage::Created,
            JobStage::Validating,
            JobStage::Planning,
            JobStage::Generating,
            JobStage::Composing,
            JobStage::Complete,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0].as_str(),
                pair[1].as_str()
            );
        }
    }

    #[test]
    fn any_non_terminal_stage_can_fail_or_cancel() {
        for stage in [
            JobStage::Created,
            JobStage::Validating,
            JobStage::Planning,
            JobStage::Generating,
            JobStage::Composing,
        ] {
            assert!(stage.can_transition_to(JobStage::Failed));
            assert!(stage.can_transition_to(JobStage::Cancelled));
        }
    }

    #[test]
    fn terminal_stages_absorb() {
        for stage in [JobStage::Complete, JobStage::Failed, JobStage::Cancelled] {
            for next in [
                JobStage::Created,
                JobStage::Validating,
                JobStage::Planning,
                JobStage::Generating,
                JobStage::Composing,
                JobStage::Complete,
                JobStage::Failed,
                JobStage::Cancelled,
            ] {
                assert!(!stage.can_transition_to(next));
            }
        }
    }

    #[test]
    fn skipping_stages_is_illegal() {
        assert!(!JobStage::Created.can_transition_to(JobStage::Generating));
        assert!(!JobStage::Planning.can_transition_to(JobStage::Composing));
        assert!(!JobStage::Generating.can_transition_to(JobStage::Complete));
    }

    #[test]
    fn advance_keeps_percent_monotone() {
        let mut snapshot = JobSnapshot::new(1, PipelineKind::Ad);
        snapshot.advance(JobStage::Validating).unwrap();
        snapshot.advance(JobStage::Planning).unwrap();
        snapshot.advance(JobStage::Generating).unwrap();
        assert_eq!(snapshot.percent, 20);
        // Clip progress pushed it past the composing baseline already.
        snapshot.percent = 95;
        snapshot.advance(JobStage::Composing).unwrap();
        assert_eq!(snapshot.percent, 95);
        snapshot.advance(JobStage::Complete).unwrap();
        assert_eq!(snapshot.percent, 100);
    }

    #[test]
    fn advance_rejects_illegal_edges() {
        let mut snapshot = JobSnapshot::new(1, PipelineKind::Ad);
        assert!(snapshot.advance(JobStage::Composing).is_err());
        snapshot.advance(JobStage::Failed).unwrap();
        assert!(snapshot.advance(JobStage::Validating).is_err());
    }
}
