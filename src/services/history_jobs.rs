//! Single-flight history backfill.
//!
//! At most one job is queued or running at a time. The job table and the
//! active slot share one mutex, held only while job records are updated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{StoreError, ValidationError};
use crate::models::forecast::ForecastRow;
use crate::models::job::{HistoryJob, JobCreation};
use crate::models::weather::{FetchStatus, SourcePolicy, WeatherSource};
use crate::services::blocking::panic_message;
use crate::services::clock::Clock;
use crate::services::forecast_pipeline::ForecastPipeline;

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, HistoryJob>,
    active: Option<Uuid>,
}

pub struct HistoryJobService {
    pipeline: Arc<ForecastPipeline>,
    clock: Arc<dyn Clock>,
    table: Mutex<JobTable>,
    batch_size: usize,
    max_days: u32,
}

impl HistoryJobService {
    pub fn new(pipeline: Arc<ForecastPipeline>, clock: Arc<dyn Clock>, batch_size: usize, max_days: u32) -> Self {
        Self {
            pipeline,
            clock,
            table: Mutex::new(JobTable::default()),
            batch_size: batch_size.max(1),
            max_days: max_days.max(1),
        }
    }

    /// Returns the active job with `started = false` if there is one,
    /// otherwise registers a new queued job.
    pub fn create_job(&self, days: u32) -> Result<JobCreation, ValidationError> {
        if days == 0 {
            return Err(ValidationError::NonPositiveDays);
        }
        let days = days.min(self.max_days);

        let mut table = self.table.lock();
        if let Some(active) = table.active.and_then(|id| table.jobs.get(&id)).filter(|j| j.state.is_active()) {
            return Ok(JobCreation { started: false, job: active.clone() });
        }

        let job = HistoryJob::new(Uuid::new_v4(), days, self.clock.now());
        table.active = Some(job.id);
        table.jobs.insert(job.id, job.clone());
        tracing::info!(job_id = %job.id, days, "history job queued");
        Ok(JobCreation { started: true, job })
    }

    /// Creates a job and, when it is new, runs it on a background task.
    pub fn start(self: &Arc<Self>, days: u32) -> Result<JobCreation, ValidationError> {
        let creation = self.create_job(days)?;
        if creation.started {
            tokio::spawn(Arc::clone(self).run_job(creation.job.id));
        }
        Ok(creation)
    }

    pub fn get_status(&self, id: Uuid) -> Option<HistoryJob> {
        self.table.lock().jobs.get(&id).cloned()
    }

    /// Drives one queued job to a terminal state. Errors and panics in the
    /// backfill end up on the job record; the active slot is always released.
    pub async fn run_job(self: Arc<Self>, id: Uuid) {
        let days = {
            let mut table = self.table.lock();
            let Some(job) = table.jobs.get_mut(&id) else { return };
            if !job.mark_running(self.clock.now()) {
                return;
            }
            job.days
        };
        tracing::info!(job_id = %id, days, "history job running");

        let outcome = tokio::spawn(Arc::clone(&self).backfill(id, days)).await;

        let now = self.clock.now();
        let mut table = self.table.lock();
        if let Some(job) = table.jobs.get_mut(&id) {
            match outcome {
                Ok(Ok(())) => {
                    job.mark_completed(now);
                    tracing::info!(job_id = %id, written = job.written_points, "history job completed");
                }
                Ok(Err(e)) => {
                    tracing::error!(job_id = %id, "history job failed: {e}");
                    job.mark_failed(e.to_string(), now);
                }
                Err(join) => {
                    let reason = panic_message(join);
                    tracing::error!(job_id = %id, "history job panicked: {reason}");
                    job.mark_failed(reason, now);
                }
            }
        }
        if table.active == Some(id) {
            table.active = None;
        }
    }

    /// The `days` calendar days strictly before today, oldest first.
    pub fn backfill_window(&self, days: u32) -> Vec<NaiveDate> {
        let today = self.clock.today();
        (1..=u64::from(days))
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(back)))
            .collect()
    }

    async fn backfill(self: Arc<Self>, id: Uuid, days: u32) -> Result<(), StoreError> {
        let listed = self.pipeline.with_topics(|topics| topics.list(None, usize::MAX)).await?;
        let mut specs = Vec::with_capacity(listed.len());
        for spec in listed {
            if spec.user_object_id.is_none() {
                tracing::warn!(job_id = %id, topic = %spec.tag, "skipping topic without user_object_id");
                continue;
            }
            let model = self.pipeline.load_model(&spec).await?;
            specs.push((spec, model));
        }

        let mut buffer: Vec<ForecastRow> = Vec::new();
        for date in self.backfill_window(days) {
            for (spec, model) in &specs {
                let weather = self
                    .pipeline
                    .resolve_weather(spec, date, SourcePolicy::Forced(WeatherSource::Archive))
                    .await;
                if weather.status == FetchStatus::NoData {
                    tracing::warn!(job_id = %id, topic = %spec.tag, %date, "no archive weather: {:?}", weather.diagnostics);
                    continue;
                }
                buffer.extend(self.pipeline.estimate_day(spec, &weather, model.as_ref()).await?.rows);
                if buffer.len() >= self.batch_size {
                    self.flush(id, &mut buffer).await?;
                }
            }
            if let Some(job) = self.table.lock().jobs.get_mut(&id) {
                job.processed_days += 1;
            }
        }
        self.flush(id, &mut buffer).await
    }

    async fn flush(&self, id: Uuid, buffer: &mut Vec<ForecastRow>) -> Result<(), StoreError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let written = self.pipeline.write_rows(std::mem::take(buffer)).await?;
        if let Some(job) = self.table.lock().jobs.get_mut(&id) {
            job.written_points += written as u64;
        }
        Ok(())
    }
}
