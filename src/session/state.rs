use serde::Serialize;

use crate::{db::Run, error::OperationError, utils::format::format_clock};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    /// The timer is stopped and the stop patch is being persisted.
    Stopping,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum RunsStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Everything presentation needs to render a session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunUiState {
    pub phase: SessionPhase,
    pub current_run: Option<Run>,
    pub elapsed_seconds: u64,
    /// The owner's runs, newest first.
    pub runs: Vec<Run>,
    pub runs_status: RunsStatus,
    pub error: Option<OperationError>,
}

impl RunUiState {
    pub fn is_running(&self) -> bool {
        matches!(self.phase, SessionPhase::Running | SessionPhase::Stopping)
    }

    pub fn formatted_elapsed(&self) -> String {
        format_clock(self.elapsed_seconds)
    }
}

/// Orders a delivered run set newest first. Equal start times fall back to
/// descending id so identical inputs always produce identical output.
pub fn project_runs(mut runs: Vec<Run>) -> Vec<Run> {
    runs.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| b.id.cmp(&a.id))
    });
    runs
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn run_at(id: &str, offset_secs: i64) -> Run {
        let base = Utc::now();
        Run::begin("owner-1", base + Duration::seconds(offset_secs)).with_id(id)
    }

    #[test]
    fn projection_is_newest_first_regardless_of_delivery_order() {
        let t1 = run_at("t1", 0);
        let t2 = Run {
            start_time: t1.start_time + Duration::seconds(10),
            ..run_at("t2", 0)
        };
        let t3 = Run {
            start_time: t1.start_time + Duration::seconds(20),
            ..run_at("t3", 0)
        };

        for delivery in [
            vec![t1.clone(), t2.clone(), t3.clone()],
            vec![t2.clone(), t3.clone(), t1.clone()],
            vec![t3.clone(), t1.clone(), t2.clone()],
        ] {
            let ids: Vec<String> = project_runs(delivery).into_iter().map(|r| r.id).collect();
            assert_eq!(ids, ["t3", "t2", "t1"]);
        }
    }

    #[test]
    fn projection_is_stable_for_equal_start_times() {
        let a = run_at("a", 0);
        let b = Run {
            start_time: a.start_time,
            ..run_at("b", 0)
        };
        let first = project_runs(vec![a.clone(), b.clone()]);
        let second = project_runs(vec![b, a]);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "b");
    }

    #[test]
    fn stopping_still_counts_as_running() {
        let state = RunUiState {
            phase: SessionPhase::Stopping,
            elapsed_seconds: 3725,
            ..RunUiState::default()
        };
        assert!(state.is_running());
        assert_eq!(state.formatted_elapsed(), "01:02:05");
    }
}
