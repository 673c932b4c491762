//! Background execution of transform jobs.
//!
//! Callers hand a [`TransformJob`] to a [`JobQueue`] and poll its status by
//! id. [`LocalJobQueue`] runs jobs in-process on Tokio's blocking pool with a
//! fixed number of worker slots, and forgets finished jobs after the result
//! TTL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use moka::Expiry;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::services::csv::types::{TransformConfig, TransformResult};
use crate::services::csv::TransformEngine;
use crate::services::progress::ProgressStore;

#[derive(Debug, Clone)]
pub struct TransformJob {
    pub input: PathBuf,
    pub config: TransformConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: Uuid,
    pub input: PathBuf,
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Queued { input: PathBuf, queued_at: DateTime<Utc> },
    Processing { input: PathBuf, started_at: DateTime<Utc> },
    Completed { result: TransformResult, finished_at: DateTime<Utc> },
    Failed { error: String, finished_at: DateTime<Utc> },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

/// Queued and running jobs never expire; finished ones live for the result TTL.
struct StatusTtl(Duration);

impl StatusTtl {
    fn for_status(&self, status: &JobStatus) -> Option<Duration> {
        status.is_finished().then_some(self.0)
    }
}

impl Expiry<Uuid, JobStatus> for StatusTtl {
    fn expire_after_create(&self, _key: &Uuid, value: &JobStatus, _created_at: Instant) -> Option<Duration> {
        self.for_status(value)
    }

    fn expire_after_update(
        &self,
        _key: &Uuid,
        value: &JobStatus,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.for_status(value)
    }
}

/// Task-submission interface between the API and whatever runs transforms.
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: TransformJob) -> JobHandle;

    fn status(&self, id: &Uuid) -> Option<JobStatus>;
}

pub struct LocalJobQueue {
    engine: TransformEngine,
    progress: Arc<dyn ProgressStore>,
    statuses: Cache<Uuid, JobStatus>,
    workers: Arc<Semaphore>,
    runtime: Handle,
}

impl LocalJobQueue {
    pub fn new(
        engine: TransformEngine,
        progress: Arc<dyn ProgressStore>,
        max_workers: usize,
        result_ttl: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            engine,
            progress,
            statuses: Cache::builder().expire_after(StatusTtl(result_ttl)).build(),
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            runtime,
        }
    }
}

impl JobQueue for LocalJobQueue {
    fn submit(&self, job: TransformJob) -> JobHandle {
        let id = Uuid::new_v4();
        let handle = JobHandle { id, input: job.input.clone() };
        self.statuses.insert(id, JobStatus::Queued { input: job.input.clone(), queued_at: Utc::now() });
        tracing::info!(job_id = %id, input = %job.input.display(), "Queued transform job");

        let engine = self.engine.clone();
        let progress = self.progress.clone();
        let statuses = self.statuses.clone();
        let workers = self.workers.clone();

        self.runtime.spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    statuses.insert(id, JobStatus::Failed { error: e.to_string(), finished_at: Utc::now() });
                    return;
                }
            };

            statuses.insert(id, JobStatus::Processing { input: job.input.clone(), started_at: Utc::now() });
            tracing::info!(job_id = %id, "Transform job started");

            let outcome =
                tokio::task::spawn_blocking(move || engine.transform(&job.input, &job.config, progress.as_ref())).await;

            let status = match outcome {
                Ok(result) => JobStatus::Completed { result, finished_at: Utc::now() },
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Transform worker died");
                    JobStatus::Failed { error: e.to_string(), finished_at: Utc::now() }
                }
            };
            statuses.insert(id, status);
            tracing::info!(job_id = %id, "Transform job finished");
        });

        handle
    }

    fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.statuses.get(id)
    }
}
