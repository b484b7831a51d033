use thiserror::Error;

/// Failure of a single external provider call. The transient variants are
/// absorbed by retry loops; callers only ever see them once retries exhaust.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider call timed out after {0}s")]
    Timeout(u64),
    #[error("provider rate limited: {0}")]
    RateLimited(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider rejected input: {0}")]
    InvalidInput(String),
    #[error("provider rejected content: {0}")]
    ContentRejected(String),
    #[error("provider error {status}: {detail}")]
    Upstream { status: u16, detail: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Transient classes are worth retrying; input and content rejections
    /// will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Network(_) => true,
            ProviderError::Upstream { status, .. } => *status >= 500,
            ProviderError::InvalidInput(_)
            | ProviderError::ContentRejected(_)
            | ProviderError::MalformedResponse(_) => false,
        }
    }

    /// Classify a non-success HTTP status from a provider.
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            408 => ProviderError::Timeout(0),
            429 => ProviderError::RateLimited(detail),
            s if s >= 500 => ProviderError::Upstream { status: s, detail },
            _ => ProviderError::InvalidInput(detail),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(0)
        } else if let Some(status) = e.status() {
            ProviderError::Upstream {
                status: status.as_u16(),
                detail: e.to_string(),
            }
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Bad input shape or range. The job is never created.
#[derive(Debug, Clone, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("interpreter failed after retry: {0}")]
    Interpreter(#[source] ProviderError),
    #[error("storyboard returned {got} scenes, pipeline minimum is {min}")]
    TooFewScenes { got: usize, min: usize },
    #[error("malformed storyboard: {0}")]
    Malformed(String),
}

/// Detail for one scene that exhausted its retry budget.
#[derive(Debug, Clone)]
pub struct FailedScene {
    pub scene_index: usize,
    pub attempts: u32,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{} scene(s) exhausted retries: {}", .0.len(), format_failed(.0))]
    ScenesFailed(Vec<FailedScene>),
    #[error("generation cancelled")]
    Cancelled,
    #[error("clip set incomplete: {0}")]
    Incomplete(String),
}

fn format_failed(failed: &[FailedScene]) -> String {
    failed
        .iter()
        .map(|f| f.scene_index.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Submission failure: either the caller's input was bad (no job created)
/// or something internal broke before the job could be recorded.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for SubmitError {
    fn from(e: anyhow::Error) -> Self {
        SubmitError::Internal(e)
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("operation {op_position} references scene {index}, timeline has {timeline_len}")]
    OutOfRange {
        op_position: usize,
        index: usize,
        timeline_len: usize,
    },
    #[error("malformed edit instruction: {0}")]
    Malformed(String),
    #[error("edit interpreter failed: {0}")]
    Interpreter(#[source] ProviderError),
    #[error("unknown composition {0}")]
    UnknownComposition(i64),
    #[error("unknown edit {0}")]
    UnknownEdit(i64),
    #[error("edit {0} is not awaiting confirmation")]
    NotPending(i64),
    #[error("recomposition trigger failed: {0}")]
    Recompose(#[source] ProviderError),
    #[error("internal error: {0}")]
    Internal(String),
}
