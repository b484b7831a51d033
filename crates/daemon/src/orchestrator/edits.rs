use serde::Serialize;
use tracing::{info, warn};

use engine::edit::{detect_conflicts, first_invalid_reference, EditPlan};
use engine::timeline::ComposedTimeline;

use crate::composer::RecompositionRequest;
use crate::error::EditError;
use crate::interpreter::{EditIntent, EditIntentRequest};
use crate::orchestrator::Orchestrator;

/// Confidence lost per overlapping operation pair.
const CONFLICT_CONFIDENCE_PENALTY: f64 = 0.15;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied {
        edit_id: i64,
        composition_id: i64,
    },
    PendingConfirmation {
        edit_id: i64,
        plan: EditPlan,
    },
}

fn internal(e: anyhow::Error) -> EditError {
    EditError::Internal(e.to_string())
}

impl Orchestrator {
    /// Interpret a freeform edit instruction against a composed timeline.
    /// Out-of-range references are rejected before any plan exists; a
    /// confidence below the floor downgrades apply-immediately to a
    /// confirmation-required outcome no matter what the caller asked for.
    pub async fn submit_edit(
        &self,
        composition_id: i64,
        instruction: &str,
        apply_immediately: bool,
    ) -> Result<EditOutcome, EditError> {
        if instruction.trim().is_empty() {
            return Err(EditError::Malformed("empty instruction".to_string()));
        }
        let composition = self
            .db
            .get_composition(composition_id)
            .map_err(internal)?
            .ok_or(EditError::UnknownComposition(composition_id))?;
        let timeline: ComposedTimeline = serde_json::from_str(&composition.timeline_json)
            .map_err(|e| EditError::Internal(e.to_string()))?;

        let intent = self.edit_intent_with_retry(instruction, &timeline).await?;
        if intent.operations.is_empty() {
            return Err(EditError::Malformed(
                "interpreter produced no operations".to_string(),
            ));
        }
        if let Some((op_position, index)) =
            first_invalid_reference(&intent.operations, timeline.len())
        {
            return Err(EditError::OutOfRange {
                op_position,
                index,
                timeline_len: timeline.len(),
            });
        }

        let conflicts = detect_conflicts(&intent.operations);
        let confidence = (intent.confidence
            - CONFLICT_CONFIDENCE_PENALTY * conflicts.len() as f64)
            .clamp(0.0, 1.0);
        let plan = EditPlan {
            operations: intent.operations,
            confidence,
            conflicts,
        };

        // Dry-run against a copy so unusable parameters surface now, not at
        // recomposition time.
        let mut preview = timeline.clone();
        preview.apply_plan(&plan).map_err(EditError::Malformed)?;

        let plan_json =
            serde_json::to_string(&plan).map_err(|e| EditError::Internal(e.to_string()))?;

        let auto_apply = apply_immediately && plan.confidence >= self.edit_confidence_floor;
        if apply_immediately && !auto_apply {
            info!(
                composition_id,
                confidence = plan.confidence,
                "edit confidence below floor, requiring confirmation"
            );
        }

        if auto_apply {
            let edit_id = self
                .db
                .create_edit(composition_id, instruction, &plan_json, "recomposing")
                .map_err(internal)?;
            self.trigger_recompose(edit_id, composition_id, &plan).await?;
            Ok(EditOutcome::Applied {
                edit_id,
                composition_id,
            })
        } else {
            let edit_id = self
                .db
                .create_edit(composition_id, instruction, &plan_json, "pending_confirmation")
                .map_err(internal)?;
            Ok(EditOutcome::PendingConfirmation { edit_id, plan })
        }
    }

    /// Apply a plan that was previously returned for confirmation.
    pub async fn confirm_edit(&self, edit_id: i64) -> Result<EditOutcome, EditError> {
        let edit = self
            .db
            .get_edit(edit_id)
            .map_err(internal)?
            .ok_or(EditError::UnknownEdit(edit_id))?;
        if edit.status != "pending_confirmation" {
            return Err(EditError::NotPending(edit_id));
        }
        let plan: EditPlan = serde_json::from_str(&edit.plan_json)
            .map_err(|e| EditError::Internal(e.to_string()))?;
        self.db
            .set_edit_status(edit_id, "recomposing")
            .map_err(internal)?;
        self.trigger_recompose(edit_id, edit.composition_id, &plan)
            .await?;
        Ok(EditOutcome::Applied {
            edit_id,
            composition_id: edit.composition_id,
        })
    }

    async fn trigger_recompose(
        &self,
        edit_id: i64,
        composition_id: i64,
        plan: &EditPlan,
    ) -> Result<(), EditError> {
        let request = RecompositionRequest {
            edit_id,
            composition_id,
            operations: plan.operations.clone(),
        };
        if let Err(e) = self.composer.recompose(&request).await {
            let _ = self.db.set_edit_status(edit_id, "failed");
            return Err(EditError::Recompose(e));
        }
        info!(edit_id, composition_id, "recomposition triggered");
        Ok(())
    }

    /// Inbound recomposition completion. On success the plan is replayed
    /// onto the stored timeline so subsequent edits validate against the
    /// current state; the rendered output is opaque to us either way.
    pub fn handle_recomposition_result(
        &self,
        edit_id: i64,
        success: bool,
        output_ref: Option<&str>,
    ) -> anyhow::Result<()> {
        let edit = self
            .db
            .get_edit(edit_id)?
            .ok_or_else(|| anyhow::anyhow!("unknown edit {}", edit_id))?;
        if edit.status != "recomposing" {
            warn!(edit_id, status = %edit.status, "ignoring recomposition callback");
            return Ok(());
        }
        if !success {
            self.db.set_edit_status(edit_id, "failed")?;
            return Ok(());
        }

        let plan: EditPlan = serde_json::from_str(&edit.plan_json)?;
        let composition = self
            .db
            .get_composition(edit.composition_id)?
            .ok_or_else(|| anyhow::anyhow!("unknown composition {}", edit.composition_id))?;
        let mut timeline: ComposedTimeline = serde_json::from_str(&composition.timeline_json)?;
        if let Err(e) = timeline.apply_plan(&plan) {
            warn!(edit_id, error = %e, "stored timeline rejected edit plan");
            self.db.set_edit_status(edit_id, "failed")?;
            return Ok(());
        }
        let timeline_json = serde_json::to_string(&timeline)?;
        self.db
            .update_composition(edit.composition_id, output_ref, &timeline_json)?;
        self.db.set_edit_status(edit_id, "applied")?;
        info!(edit_id, composition_id = edit.composition_id, "edit applied");
        Ok(())
    }

    /// One retry on a transient gateway failure, mirroring the planner.
    async fn edit_intent_with_retry(
        &self,
        instruction: &str,
        timeline: &ComposedTimeline,
    ) -> Result<EditIntent, EditError> {
        let request = EditIntentRequest {
            instruction: instruction.to_string(),
            timeline: timeline.clone(),
        };
        match self.interpreter.edit_intent(&request).await {
            Ok(intent) => Ok(intent),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "edit interpretation failed, retrying");
                self.interpreter
                    .edit_intent(&request)
                    .await
                    .map_err(EditError::Interpreter)
            }
            Err(e) => Err(EditError::Interpreter(e)),
        }
    }
}
