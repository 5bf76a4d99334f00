//! Shared progress of the current ingestion run.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Lifecycle state of the ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No run has started yet.
    Idle,
    /// A run is in progress.
    Running,
    /// The last run finished.
    Completed,
    /// The last run failed.
    Error,
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Run state.
    pub status: RunStatus,
    /// Completion fraction in `[0, 1]`.
    pub progress: f32,
    /// Human-readable status line.
    pub message: String,
    /// Identifier of the current or last run.
    pub run_id: Option<String>,
}

/// Shared progress of the single ingestion run allowed at a time.
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Idle tracker.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProgressSnapshot {
                status: RunStatus::Idle,
                progress: 0.0,
                message: "idle".into(),
                run_id: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }

    /// Begin a new run; `None` when one is already running.
    pub fn try_start(&self) -> Option<String> {
        let mut state = self.lock();
        if state.status == RunStatus::Running {
            return None;
        }
        let run_id = Uuid::new_v4().to_string();
        *state = ProgressSnapshot {
            status: RunStatus::Running,
            progress: 0.0,
            message: "starting".into(),
            run_id: Some(run_id.clone()),
        };
        Some(run_id)
    }

    /// Report progress; values are clamped to `[0, 1]` and never move backwards.
    pub fn update(&self, progress: f32, message: impl Into<String>) {
        let mut state = self.lock();
        if state.status != RunStatus::Running {
            return;
        }
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        state.progress = state.progress.max(progress);
        state.message = message.into();
    }

    /// Mark the run finished.
    pub fn complete(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.status = RunStatus::Completed;
        state.progress = 1.0;
        state.message = message.into();
    }

    /// Mark the run failed, keeping the progress reached.
    pub fn fail(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.status = RunStatus::Error;
        state.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let tracker = ProgressTracker::new();
        tracker.try_start().expect("start");
        tracker.update(0.5, "half");
        tracker.update(0.2, "late report");
        assert_eq!(tracker.snapshot().progress, 0.5);
        assert_eq!(tracker.snapshot().message, "late report");
        tracker.update(7.0, "over");
        assert_eq!(tracker.snapshot().progress, 1.0);
    }

    #[test]
    fn concurrent_start_is_rejected() {
        let tracker = ProgressTracker::new();
        let first = tracker.try_start().expect("start");
        assert!(tracker.try_start().is_none());
        tracker.complete("done");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.run_id.as_deref(), Some(first.as_str()));

        let second = tracker.try_start().expect("restart");
        assert_ne!(first, second);
        assert_eq!(tracker.snapshot().progress, 0.0);
    }

    #[test]
    fn failure_keeps_progress_and_ignores_later_updates() {
        let tracker = ProgressTracker::new();
        tracker.try_start().expect("start");
        tracker.update(0.3, "working");
        tracker.fail("input missing");
        tracker.update(0.9, "stale");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.status, RunStatus::Error);
        assert_eq!(snapshot.progress, 0.3);
        assert_eq!(snapshot.message, "input missing");
    }
}
