use serde::Serialize;

/// Lifecycle of a session's commit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl CommitState {
    pub fn can_transition_to(self, next: Self) -> bool {
        use CommitState::{Canceled, Failed, Idle, Running, Succeeded};

        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Canceled)
                | (Succeeded, Running)
                | (Failed, Running)
                | (Canceled, Running)
                | (Succeeded, Idle)
                | (Failed, Idle)
                | (Canceled, Idle)
        )
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}
