//! Processing state of an ingested file
//!
//! A file's state is the directory it sits in. The enum makes the legal moves
//! explicit so the pipeline can refuse anything else before touching disk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Incoming,
    Processing,
    Archived,
    Errored,
}

impl ProcessingState {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessingState::Incoming => "incoming",
            ProcessingState::Processing => "processing",
            ProcessingState::Archived => "archived",
            ProcessingState::Errored => "errored",
        }
    }

    /// Whether a file may move from `self` to `next`.
    ///
    /// `Processing -> Incoming` is only used by startup recovery.
    pub fn can_transition_to(&self, next: ProcessingState) -> bool {
        matches!(
            (self, next),
            (ProcessingState::Incoming, ProcessingState::Processing)
                | (ProcessingState::Processing, ProcessingState::Archived)
                | (ProcessingState::Processing, ProcessingState::Errored)
                | (ProcessingState::Processing, ProcessingState::Incoming)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Archived | ProcessingState::Errored)
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
