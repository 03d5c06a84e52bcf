use std::path::PathBuf;

use crate::error::UpdateError;

/// States of an update session. Transitions only move forward; `Failed` is
/// reachable from every working phase and is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    Idle,
    WaitingForExit,
    Downloading,
    Extracting,
    Installing,
    Launching,
    Complete,
    Failed,
}

impl UpdatePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingForExit => "waiting-for-exit",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Installing => "installing",
            Self::Launching => "launching",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Preparing update...",
            Self::WaitingForExit => "Waiting for app to close...",
            Self::Downloading => "Downloading update...",
            Self::Extracting => "Extracting...",
            Self::Installing => "Installing...",
            Self::Launching => "Launching...",
            Self::Complete => "Update complete!",
            Self::Failed => "Update failed",
        }
    }

    /// Overall percent range covered by this phase on a progress surface.
    pub fn percent_range(self) -> (f64, f64) {
        match self {
            Self::Idle => (0.0, 0.0),
            Self::WaitingForExit => (0.0, 10.0),
            Self::Downloading => (10.0, 70.0),
            Self::Extracting => (70.0, 80.0),
            Self::Installing => (80.0, 90.0),
            Self::Launching => (90.0, 100.0),
            Self::Complete => (100.0, 100.0),
            Self::Failed => (0.0, 0.0),
        }
    }

    /// Maps a 0-100 progress value within this phase onto the overall range.
    pub fn scale(self, fraction_percent: f64) -> f64 {
        let (start, end) = self.percent_range();
        let bounded = fraction_percent.clamp(0.0, 100.0);
        start + (end - start) * bounded / 100.0
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProgress {
    pub phase: UpdatePhase,
    pub percent: f64,
    pub label: String,
}

impl UpdateProgress {
    pub fn new(phase: UpdatePhase, percent: f64, label: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.clamp(0.0, 100.0),
            label: label.into(),
        }
    }

    /// Progress at the start of `phase` with its default label.
    pub fn entering(phase: UpdatePhase) -> Self {
        Self::new(phase, phase.percent_range().0, phase.label())
    }
}

#[derive(Debug)]
pub enum UpdateResult {
    Success {
        launched: PathBuf,
    },
    Failure {
        phase: UpdatePhase,
        error: UpdateError,
    },
}

impl UpdateResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::Success { .. } => false,
            Self::Failure { error, .. } => error.is_unrecoverable(),
        }
    }

    pub fn final_phase(&self) -> UpdatePhase {
        match self {
            Self::Success { .. } => UpdatePhase::Complete,
            Self::Failure { .. } => UpdatePhase::Failed,
        }
    }
}
