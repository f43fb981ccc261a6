//! History backfill job record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Job lifecycle: `Queued -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

/// Snapshot shape: `{ id, state, days, created_at, started_at, finished_at, error }`
/// plus progress counters.
///
/// State transitions go through methods; each refuses to leave a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistoryJob {
    pub id: Uuid,
    pub state: JobState,
    pub days: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub processed_days: u32,
    pub written_points: u64,
}

impl HistoryJob {
    pub fn new(id: Uuid, days: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: JobState::Queued,
            days,
            created_at: now,
            started_at: None,
            finished_at: None,
            error: None,
            processed_days: 0,
            written_points: 0,
        }
    }

    /// Returns false if the job was not queued.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != JobState::Queued {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(now);
        true
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Completed;
        self.finished_at = Some(now);
        true
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Failed;
        self.error = Some(error);
        self.finished_at = Some(now);
        true
    }
}

/// Outcome of a creation request. `started` is false when an active job was returned instead.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobCreation {
    pub started: bool,
    pub job: HistoryJob,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn new_job_is_queued() {
        let job = HistoryJob::new(Uuid::new_v4(), 7, t(0));
        assert_eq!(job.state, JobState::Queued);
        assert!(job.state.is_active());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn runs_to_completion() {
        let mut job = HistoryJob::new(Uuid::new_v4(), 7, t(0));
        assert!(job.mark_running(t(1)));
        assert!(job.mark_completed(t(2)));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.started_at, Some(t(1)));
        assert_eq!(job.finished_at, Some(t(2)));
    }

    #[test]
    fn terminal_state_is_final() {
        let mut job = HistoryJob::new(Uuid::new_v4(), 7, t(0));
        job.mark_running(t(1));
        assert!(job.mark_failed("boom".to_string(), t(2)));
        assert!(!job.mark_completed(t(3)));
        assert!(!job.mark_running(t(3)));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.finished_at, Some(t(2)));
    }

    #[test]
    fn snapshot_uses_snake_case_state() {
        let job = HistoryJob::new(Uuid::nil(), 3, t(0));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "queued");
        assert_eq!(json["days"], 3);
        assert!(json["started_at"].is_null());
    }
}
