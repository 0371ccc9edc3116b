use thiserror::Error;

use crate::pipeline::transform::TransformError;
use crate::pipeline::TransformStep;

/// Synchronous rejections from the store, queue, registry and planner.
/// Returning one of these never leaves session state half-updated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),
    #[error("unknown focus mode '{0}'")]
    UnknownMode(String),
    #[error("command '{id}' is not a queued operation")]
    NotQueued { id: String },
    #[error("command '{id}' is not a live parameter")]
    NotLive { id: String },
    #[error("invalid value for '{id}': expected {expected}")]
    InvalidValue { id: String, expected: String },
    #[error("history index {index} is out of range for a log of {len} entries")]
    HistoryIndexOutOfRange { index: usize, len: usize },
    #[error("object removal needs a painted mask")]
    MissingMask,
    #[error("generative edit needs a non-empty prompt")]
    EmptyPrompt,
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("a commit is already running for this session")]
    SessionBusy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("transform step '{step}' failed: {cause}")]
    TransformStepFailed {
        step: TransformStep,
        #[source]
        cause: TransformError,
    },
    #[error("commit canceled after {completed_steps} completed step(s)")]
    Canceled { completed_steps: usize },
    #[error("commit ticket {0} does not match the running commit")]
    StaleTicket(u64),
}

impl ValidationError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::UnknownRecipe(_) => "unknown_recipe",
            Self::UnknownMode(_) => "unknown_mode",
            Self::NotQueued { .. } => "not_queued",
            Self::NotLive { .. } => "not_live",
            Self::InvalidValue { .. } => "invalid_value",
            Self::HistoryIndexOutOfRange { .. } => "history_index_out_of_range",
            Self::MissingMask => "missing_mask",
            Self::EmptyPrompt => "empty_prompt",
        }
    }
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionBusy => "session_busy",
            Self::Validation(inner) => inner.code(),
            Self::TransformStepFailed { .. } => "transform_step_failed",
            Self::Canceled { .. } => "commit_canceled",
            Self::StaleTicket(_) => "stale_commit",
        }
    }
}
