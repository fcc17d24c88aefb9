//! In-process job queue for aggregations.
//!
//! One job is one call of the aggregation routine. Jobs run on the blocking
//! thread pool, at most `workers` at a time, each bounded by a wall-clock
//! timeout. Their outcome is kept for status polling until evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::analysis::{AggregationRequest, AggregationResult, Aggregator};
use crate::config::ServiceConfig;

pub type JobId = Uuid;

/// Anything that can answer an aggregation request synchronously.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(&self, request: &AggregationRequest) -> AggregationResult;
}

impl Analyzer for Aggregator {
    fn analyze(&self, request: &AggregationRequest) -> AggregationResult {
        self.aggregate(request)
    }
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Finished(AggregationResult),
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AggregationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
}

/// `{"state": "PENDING", "status": "Processing..."}` while running, then
/// `{"state": ..., "result": <aggregation result>}` with the failure
/// message repeated in `status` for failed jobs.
impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match self {
            JobStatus::Pending => StatusPayload {
                state: "PENDING",
                result: None,
                status: Some("Processing..."),
            },
            JobStatus::Finished(result) => StatusPayload {
                state: result.state(),
                result: Some(result),
                status: match result {
                    AggregationResult::Failure { message } => Some(message.as_str()),
                    AggregationResult::Success { .. } => None,
                },
            },
        };
        payload.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, JobStatus>,
    /// Finished job ids, oldest first.
    finished: VecDeque<JobId>,
}

struct Inner {
    analyzer: Arc<dyn Analyzer>,
    registry: Mutex<Registry>,
    permits: Arc<Semaphore>,
    done: Notify,
    timeout: Duration,
    max_retained: usize,
}

/// Cheap to clone; all clones share the same jobs.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        workers: usize,
        timeout: Duration,
        max_retained: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                analyzer,
                registry: Mutex::new(Registry::default()),
                permits: Arc::new(Semaphore::new(workers.max(1))),
                done: Notify::new(),
                timeout,
                max_retained: max_retained.max(1),
            }),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(config.aggregator()),
            config.workers,
            config.job_timeout,
            config.max_retained_jobs,
        )
    }

    /// Queue a request and return its id immediately. Must be called from
    /// within a Tokio runtime.
    pub fn submit(&self, request: AggregationRequest) -> JobId {
        let id = Uuid::new_v4();
        self.inner.registry().jobs.insert(id, JobStatus::Pending);
        log::info!(
            "Queued job {id}: column={} reference={:?} drill_down={:?}",
            request.numeric_column,
            request.reference_column,
            request.drill_down
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.run(request).await;
            inner.finish(id, result);
        });
        id
    }

    /// Current status, or `None` for an unknown (or evicted) id.
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.registry().jobs.get(id).cloned()
    }

    /// Wait until the job has finished and return its result.
    pub async fn wait(&self, id: &JobId) -> Option<AggregationResult> {
        loop {
            let notified = self.inner.done.notified();
            match self.status(id)? {
                JobStatus::Finished(result) => return Some(result),
                JobStatus::Pending => notified.await,
            }
        }
    }
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, request: AggregationRequest) -> AggregationResult {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return AggregationResult::failure("Job queue is shut down");
        };

        let analyzer = Arc::clone(&self.analyzer);
        // The permit moves into the worker so a timed-out job keeps its slot
        // until the blocking call actually returns.
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            analyzer.analyze(&request)
        });

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                log::error!("Analysis worker crashed: {err}");
                AggregationResult::failure("Analysis worker crashed")
            }
            Err(_) => {
                log::warn!("Analysis timed out after {:?}", self.timeout);
                AggregationResult::failure(format!(
                    "Analysis timed out after {}s",
                    self.timeout.as_secs_f64()
                ))
            }
        }
    }

    fn finish(&self, id: JobId, result: AggregationResult) {
        log::info!("Job {id} finished: {}", result.state());
        {
            let mut registry = self.registry();
            registry.jobs.insert(id, JobStatus::Finished(result));
            registry.finished.push_back(id);
            while registry.finished.len() > self.max_retained {
                if let Some(old) = registry.finished.pop_front() {
                    registry.jobs.remove(&old);
                }
            }
        }
        self.done.notify_waiters();
    }
}
