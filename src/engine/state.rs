use serde::{Deserialize, Serialize};

/// Lifecycle of a worker loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
    Failed { message: String },
}

impl WorkerState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, target),
            // Stopped before ever running
            (Idle, Running) | (Idle, Stopped) |

            (Running, Stopping) |
            (Running, Stopped) |
            (Running, Failed { .. }) |

            (Stopping, Stopped) |
            (Stopping, Failed { .. }) |

            // Restart
            (Stopped, Running) |
            (Failed { .. }, Running)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Failed { .. } => "Failed",
        }
    }

    /// Whether the loop has ended, normally or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed { .. })
    }
}
