//! Run records as persisted by a [`RunStore`](crate::store::RunStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format::format_clock;

/// One tracked exercise session.
///
/// `id` is empty until the store assigns one. `end_time` is present exactly
/// when the run has been stopped; a stopped run is never reactivated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub is_active: bool,
}

impl Run {
    /// A fresh active run, not yet persisted.
    pub fn begin(owner_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            owner_id: owner_id.into(),
            start_time,
            end_time: None,
            duration_seconds: 0,
            is_active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Whole seconds between `start_time` and `now`, clamped at zero.
    pub fn wall_clock_elapsed(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_seconds().max(0) as u64
    }

    pub fn formatted_duration(&self) -> String {
        format_clock(self.duration_seconds)
    }

    pub fn apply_stop(&mut self, stop: &RunStop) {
        self.end_time = Some(stop.end_time);
        self.duration_seconds = stop.duration_seconds;
        self.is_active = false;
    }
}

/// The single mutation a run ever receives: the stop patch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunStop {
    pub end_time: DateTime<Utc>,
    pub duration_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn begin_creates_unpersisted_active_run() {
        let now = Utc::now();
        let run = Run::begin("owner-1", now);
        assert!(run.is_active);
        assert!(!run.is_persisted());
        assert_eq!(run.end_time, None);
        assert_eq!(run.duration_seconds, 0);
    }

    #[test]
    fn apply_stop_flips_active_and_sets_end() {
        let start = Utc::now();
        let mut run = Run::begin("owner-1", start).with_id("r1");
        let end = start + Duration::seconds(42);
        run.apply_stop(&RunStop {
            end_time: end,
            duration_seconds: 42,
        });
        assert!(!run.is_active);
        assert_eq!(run.end_time, Some(end));
        assert_eq!(run.formatted_duration(), "00:42");
    }

    #[test]
    fn wall_clock_elapsed_never_negative() {
        let now = Utc::now();
        let run = Run::begin("owner-1", now + Duration::seconds(30));
        assert_eq!(run.wall_clock_elapsed(now), 0);
        assert_eq!(run.wall_clock_elapsed(now + Duration::seconds(155)), 125);
    }
}
