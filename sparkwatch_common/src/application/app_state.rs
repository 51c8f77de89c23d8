use ::core::fmt::Display;
use ::std::fmt;

use ::serde::{Deserialize, Serialize};
use ::tracing::warn;

/// Lifecycle states of a monitored Spark application.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplicationState {
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
}

impl ApplicationState {
    /// Terminal states end the monitor loop and are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }

    /// Translate a pod phase (case-insensitive) into an application state.
    /// Phases the translator does not know, including `unknown`, are treated
    /// as failures.
    pub fn from_pod_phase(phase: &str, tag: &str) -> Self {
        match phase.to_ascii_lowercase().as_str() {
            "pending" => Self::Starting,
            "running" => Self::Running,
            "succeeded" => Self::Finished,
            "failed" => Self::Failed,
            other => {
                warn!(
                    "Unknown pod phase {} for application {}, treating it as failed",
                    other, tag
                );
                Self::Failed
            }
        }
    }
}

impl Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Finished => write!(f, "Finished"),
            Self::Failed => write!(f, "Failed"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}
