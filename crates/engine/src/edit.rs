use serde::{Deserialize, Serialize};

/// Structured edit operation derived from a freeform instruction. Targets
/// are positions in the composed timeline, not source scene indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    Trim {
        index: usize,
        new_duration_secs: f64,
    },
    Crop {
        start_index: usize,
        end_index: usize,
        aspect_ratio: String,
    },
    Swap {
        first_index: usize,
        second_index: usize,
    },
    Retime {
        start_index: usize,
        end_index: usize,
        speed: f64,
    },
}

impl EditOperation {
    /// Inclusive index ranges this operation touches. Swap touches only its
    /// two endpoints, not everything between them.
    pub fn touched_ranges(&self) -> Vec<(usize, usize)> {
        match self {
            EditOperation::Trim { index, .. } => vec![(*index, *index)],
            EditOperation::Crop {
                start_index,
                end_index,
                ..
            }
            | EditOperation::Retime {
                start_index,
                end_index,
                ..
            } => vec![(*start_index, *end_index)],
            EditOperation::Swap {
                first_index,
                second_index,
            } => vec![
                (*first_index, *first_index),
                (*second_index, *second_index),
            ],
        }
    }

    pub fn max_index(&self) -> usize {
        self.touched_ranges()
            .iter()
            .map(|(_, end)| *end)
            .max()
            .unwrap_or(0)
    }
}

/// Two operations whose touched ranges intersect. Both are kept; the overlap
/// is surfaced, never silently merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditConflict {
    pub first_op: usize,
    pub second_op: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    pub operations: Vec<EditOperation>,
    pub confidence: f64,
    pub conflicts: Vec<EditConflict>,
}

impl EditPlan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

fn ranges_intersect(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

/// Pairwise overlap scan across the operation list, in listed order.
pub fn detect_conflicts(operations: &[EditOperation]) -> Vec<EditConflict> {
    let mut conflicts = Vec::new();
    for i in 0..operations.len() {
        for j in (i + 1)..operations.len() {
            let overlapping = operations[i].touched_ranges().iter().any(|a| {
                operations[j]
                    .touched_ranges()
                    .iter()
                    .any(|b| ranges_intersect(*a, *b))
            });
            if overlapping {
                conflicts.push(EditConflict {
                    first_op: i,
                    second_op: j,
                });
            }
        }
    }
    conflicts
}

/// First operation index referencing a timeline position that does not
/// exist, if any. Also catches inverted ranges.
pub fn first_invalid_reference(
    operations: &[EditOperation],
    timeline_len: usize,
) -> Option<(usize, usize)> {
    for (op_position, op) in operations.iter().enumerate() {
        for (start, end) in op.touched_ranges() {
            if start > end {
                return Some((op_position, start));
            }
            if end >= timeline_len {
                return Some((op_position, end));
            }
        }
    }
    None
}
