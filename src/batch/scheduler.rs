//! Runs many jobs under a concurrency cap.

use crate::error::ErrorKind;
use crate::gateway::UsageTotals;
use crate::pipeline::{
    CancelSignal, Job, JobError, JobId, JobReport, JobState, JobStatus, Orchestrator,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Progress notifications, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// `index` is the job's position in the submitted batch.
    Admitted { index: usize, job: JobId },
    /// Latest state of a running job; quick successive changes may coalesce.
    StateChanged(JobStatus),
    /// Sent before the job's admission slot is released.
    Finished {
        index: usize,
        job: JobId,
        state: JobState,
        error: Option<JobError>,
    },
    /// Admission stopped because `job` failed authentication.
    Halted { job: JobId },
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// One entry per submitted job, in submission order.
    pub jobs: Vec<JobReport>,
    pub cancelled: bool,
    pub halted_on_auth: bool,
    pub usage: UsageTotals,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn job(&self, id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.id.as_str() == id)
    }
}

/// Starts batches on top of one [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    orchestrator: Orchestrator,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
    halt_on_auth: bool,
}

impl BatchScheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let halt_on_auth = orchestrator.config().batch.halt_on_auth_error;
        Self {
            orchestrator,
            events: None,
            halt_on_auth,
        }
    }

    /// Stream [`BatchEvent`]s to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_halt_on_auth(mut self, halt: bool) -> Self {
        self.halt_on_auth = halt;
        self
    }

    /// Runs `jobs` with at most `limit` active at once and waits for all of
    /// them. Individual job failures never fail the call.
    pub async fn submit(&self, jobs: Vec<Job>, limit: usize) -> BatchReport {
        self.start(jobs, limit).wait().await
    }

    /// Starts the batch in the background.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&self, jobs: Vec<Job>, limit: usize) -> BatchRun {
        let limit = if limit == 0 {
            tracing::warn!("Concurrency limit 0 raised to 1");
            1
        } else {
            limit
        };

        let cancel = CancelSignal::new();
        let mut statuses = Vec::with_capacity(jobs.len());
        let mut queue = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (tx, rx) = watch::channel(job.status());
            statuses.push(rx);
            queue.push((job, tx));
        }

        let driver = Driver {
            orchestrator: self.orchestrator.clone(),
            events: self.events.clone(),
            halt_on_auth: self.halt_on_auth,
            cancel: cancel.clone(),
            halted: Arc::new(AtomicBool::new(false)),
            limit,
        };
        let handle = tokio::spawn(driver.run(queue));

        BatchRun {
            cancel,
            statuses,
            driver: handle,
        }
    }
}

/// Handle to a running batch.
#[derive(Debug)]
pub struct BatchRun {
    cancel: CancelSignal,
    statuses: Vec<watch::Receiver<JobStatus>>,
    driver: JoinHandle<BatchReport>,
}

impl BatchRun {
    /// Current status of every job, in submission order.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        self.statuses.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Stops admission; running jobs stop at their next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }

    pub async fn wait(self) -> BatchReport {
        match self.driver.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Batch driver died: {}", e);
                let jobs = self
                    .statuses
                    .iter()
                    .map(|rx| {
                        let status = rx.borrow().clone();
                        JobReport::internal_failure(&status, format!("batch driver died: {e}"))
                    })
                    .collect();
                BatchReport {
                    jobs,
                    cancelled: self.cancel.is_cancelled(),
                    halted_on_auth: false,
                    usage: UsageTotals::default(),
                    elapsed: Duration::ZERO,
                }
            }
        }
    }
}

struct Driver {
    orchestrator: Orchestrator,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
    halt_on_auth: bool,
    cancel: CancelSignal,
    halted: Arc<AtomicBool>,
    limit: usize,
}

impl Driver {
    fn emit(events: &Option<mpsc::UnboundedSender<BatchEvent>>, event: BatchEvent) {
        // A dropped receiver only means nobody is listening.
        if let Some(tx) = events
            && tx.send(event).is_err()
        {
            tracing::trace!("Batch event receiver dropped");
        }
    }

    async fn run(self, queue: Vec<(Job, watch::Sender<JobStatus>)>) -> BatchReport {
        let started = Instant::now();
        let total = queue.len();
        tracing::info!(jobs = total, limit = self.limit, "Batch started");

        let permits = Arc::new(Semaphore::new(self.limit));
        let mut reports: Vec<Option<JobReport>> = vec![None; total];
        let mut ids: Vec<JobId> = Vec::with_capacity(total);
        let mut last_status: Vec<watch::Receiver<JobStatus>> = Vec::with_capacity(total);
        let mut tasks: JoinSet<(usize, JobReport)> = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();

        let mut queue = queue.into_iter().enumerate();
        while let Some((index, (job, status))) = queue.next() {
            ids.push(job.id.clone());
            last_status.push(status.subscribe());

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
            };
            let permit = match permit {
                Some(p) if !self.cancel.is_cancelled() && !self.halted.load(Ordering::SeqCst) => p,
                _ => {
                    self.skip(index, &job, &status, &mut reports);
                    for (index, (job, status)) in queue.by_ref() {
                        ids.push(job.id.clone());
                        last_status.push(status.subscribe());
                        self.skip(index, &job, &status, &mut reports);
                    }
                    break;
                }
            };

            tracing::info!(job_id = %job.id, index, input = job.input.kind(), "Job admitted");
            Self::emit(
                &self.events,
                BatchEvent::Admitted {
                    index,
                    job: job.id.clone(),
                },
            );

            let orchestrator = self.orchestrator.clone();
            let cancel = self.cancel.clone();
            let events = self.events.clone();
            let halted = Arc::clone(&self.halted);
            let halt_on_auth = self.halt_on_auth;
            let handle = tasks.spawn(async move {
                let forwarder = events.clone().map(|tx| {
                    let mut rx = status.subscribe();
                    tokio::spawn(async move {
                        while rx.changed().await.is_ok() {
                            let current = rx.borrow_and_update().clone();
                            if tx.send(BatchEvent::StateChanged(current)).is_err() {
                                break;
                            }
                        }
                    })
                });

                let report = orchestrator.run_with(job, &cancel, &status).await;
                drop(status);
                if let Some(forwarder) = forwarder
                    && let Err(e) = forwarder.await
                {
                    tracing::warn!("State forwarder failed: {}", e);
                }

                let auth_failure = report
                    .error
                    .as_ref()
                    .is_some_and(|e| e.kind == ErrorKind::Auth);
                if halt_on_auth && auth_failure && !halted.swap(true, Ordering::SeqCst) {
                    tracing::warn!(job_id = %report.id, "Authentication failed, no further jobs will be admitted");
                    Self::emit(&events, BatchEvent::Halted { job: report.id.clone() });
                }
                Self::emit(
                    &events,
                    BatchEvent::Finished {
                        index,
                        job: report.id.clone(),
                        state: report.state,
                        error: report.error.clone(),
                    },
                );
                drop(permit);
                (index, report)
            });
            task_index.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (index, report))) => reports[index] = Some(report),
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        tracing::error!("Unknown job task failed: {}", e);
                        continue;
                    };
                    let message = if e.is_panic() {
                        let payload = e.into_panic();
                        let msg = payload
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        format!("job task panicked: {msg}")
                    } else {
                        "job task was aborted".to_string()
                    };
                    tracing::error!(index, "{}", message);
                    let status = last_status[index].borrow().clone();
                    let report = JobReport::internal_failure(&status, message);
                    Self::emit(
                        &self.events,
                        BatchEvent::Finished {
                            index,
                            job: report.id.clone(),
                            state: report.state,
                            error: report.error.clone(),
                        },
                    );
                    reports[index] = Some(report);
                }
            }
        }

        let jobs: Vec<JobReport> = reports
            .into_iter()
            .zip(ids)
            .map(|(report, id)| report.unwrap_or_else(|| JobReport::not_started(id)))
            .collect();
        let usage = jobs.iter().fold(UsageTotals::default(), |mut acc, j| {
            acc.absorb(&j.usage);
            acc
        });
        let report = BatchReport {
            jobs,
            cancelled: self.cancel.is_cancelled(),
            halted_on_auth: self.halted.load(Ordering::SeqCst),
            usage,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.count(JobState::Cancelled),
            cost = report.usage.cost,
            "Batch finished"
        );
        report
    }

    /// Records a job that will never be admitted.
    fn skip(
        &self,
        index: usize,
        job: &Job,
        status: &watch::Sender<JobStatus>,
        reports: &mut [Option<JobReport>],
    ) {
        tracing::info!(job_id = %job.id, index, "Job not admitted");
        status.send_replace(JobStatus {
            id: job.id.clone(),
            state: JobState::Cancelled,
            last_stage: None,
        });
        reports[index] = Some(JobReport::not_started(job.id.clone()));
    }
}
