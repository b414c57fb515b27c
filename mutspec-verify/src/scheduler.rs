//! Verification job scheduler.
//!
//! Jobs wait in a priority queue until [`Scheduler::run_all`] releases them.
//! Each worker admits a bounded number of jobs at once through a fair
//! semaphore, so jobs released earlier reach a worker first. A job that errors
//! is retried on the next worker; one that never succeeds still produces an
//! outcome (with an empty response) so the pass barrier always completes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mutspec_core::Stage;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::worker::{VerifyRequest, Worker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobHandle(pub usize);

/// A unit of work for one candidate in one pass.
#[derive(Clone, Debug)]
pub struct Job {
    pub candidate: usize,
    pub stage: Stage,
    /// Lower runs first; ties run in submission order.
    pub priority: u32,
    pub request: VerifyRequest,
    /// Printed candidate, written at the top of its transcript.
    pub label: String,
    /// Explicit worker; otherwise `candidate % workers`.
    pub worker: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobOutcome {
    pub handle: JobHandle,
    pub candidate: usize,
    pub stage: Stage,
    pub response: String,
    pub file_name: String,
    /// Seconds from the scheduler's creation to the first attempt.
    pub start_time: f64,
    pub execution_time: f64,
    pub worker: usize,
    pub attempts: u32,
    /// Why the job produced no response, if it didn't.
    pub failure: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub job_timeout: Duration,
    pub max_attempts: u32,
    /// Directory and file prefix for per-job transcripts.
    pub transcripts: Option<(PathBuf, String)>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
            max_attempts: 3,
            transcripts: None,
        }
    }
}

#[derive(Clone)]
struct Slot {
    worker: Arc<dyn Worker>,
    permits: Arc<Semaphore>,
}

#[derive(Debug, PartialEq, Eq)]
struct Queued {
    priority: u32,
    seq: u64,
    handle: JobHandle,
}

impl Ord for Queued {
    // `BinaryHeap` pops the greatest; lowest priority, then earliest, is greatest here.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Scheduler {
    slots: Vec<Slot>,
    config: SchedulerConfig,
    epoch: Instant,
    queue: BinaryHeap<Queued>,
    jobs: Vec<Job>,
    next_seq: u64,
    by_candidate: BTreeMap<usize, Vec<JobHandle>>,
    outcomes: HashMap<JobHandle, JobOutcome>,
}

impl Scheduler {
    /// `workers` pairs each endpoint with the number of jobs it may run at once.
    pub fn new(
        workers: Vec<(Arc<dyn Worker>, usize)>,
        config: SchedulerConfig,
    ) -> Result<Self, VerifyError> {
        if workers.is_empty() {
            return Err(VerifyError::NoWorkers);
        }
        let slots = workers
            .into_iter()
            .map(|(worker, concurrency)| Slot {
                worker,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
            })
            .collect();
        Ok(Self {
            slots,
            config,
            epoch: Instant::now(),
            queue: BinaryHeap::new(),
            jobs: Vec::new(),
            next_seq: 0,
            by_candidate: BTreeMap::new(),
            outcomes: HashMap::new(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    pub fn submit(&mut self, job: Job) -> JobHandle {
        let handle = JobHandle(self.jobs.len());
        self.queue.push(Queued {
            priority: job.priority,
            seq: self.next_seq,
            handle,
        });
        self.next_seq += 1;
        self.by_candidate.entry(job.candidate).or_default().push(handle);
        self.jobs.push(job);
        handle
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn outcome(&self, handle: JobHandle) -> Option<&JobOutcome> {
        self.outcomes.get(&handle)
    }

    /// Every job submitted for `candidate`, in submission order.
    pub fn jobs_for(&self, candidate: usize) -> &[JobHandle] {
        self.by_candidate
            .get(&candidate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Runs every queued job to completion. Returns the handles finished by
    /// this call, in the order they were released.
    pub async fn run_all(&mut self) -> Vec<JobHandle> {
        let mut released = Vec::with_capacity(self.queue.len());
        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();
        let mut dispatched = Vec::new();

        while let Some(q) = self.queue.pop() {
            let job = &self.jobs[q.handle.0];
            let first = job.worker.unwrap_or(job.candidate) % self.slots.len();
            debug!(
                candidate = job.candidate,
                stage = %job.stage,
                worker = first,
                "dispatching job"
            );
            let run = JobRun {
                handle: q.handle,
                candidate: job.candidate,
                stage: job.stage,
                request: job.request.clone(),
                first,
                slots: self.slots.clone(),
                timeout: self.config.job_timeout,
                max_attempts: self.config.max_attempts.max(1),
                epoch: self.epoch,
            };
            tasks.spawn(run.execute());
            dispatched.push((q.handle, first));
            released.push(q.handle);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.write_transcript(&outcome);
                    self.outcomes.insert(outcome.handle, outcome);
                }
                Err(err) => warn!(error = %err, "job task died"),
            }
        }

        // A task that panicked left no outcome behind; record it as failed.
        for &(handle, worker) in &dispatched {
            if self.outcomes.contains_key(&handle) {
                continue;
            }
            let job = &self.jobs[handle.0];
            let failed = JobOutcome {
                handle,
                candidate: job.candidate,
                stage: job.stage,
                response: String::new(),
                file_name: String::new(),
                start_time: 0.0,
                execution_time: 0.0,
                worker,
                attempts: 0,
                failure: Some(VerifyError::Join("task ended without a result".to_string()).to_string()),
            };
            self.outcomes.insert(handle, failed);
        }
        info!(jobs = released.len(), "batch complete");
        released
    }

    fn write_transcript(&self, outcome: &JobOutcome) {
        let Some((dir, prefix)) = &self.config.transcripts else {
            return;
        };
        let k = self
            .jobs_for(outcome.candidate)
            .iter()
            .position(|h| *h == outcome.handle)
            .unwrap_or(0);
        let path = dir.join(format!("{prefix}_{}_{k}.txt", outcome.candidate));
        let label = &self.jobs[outcome.handle.0].label;
        let text = format!("// {label}\n// {}\n{}", outcome.candidate, outcome.response);
        if let Err(e) = std::fs::write(&path, text) {
            warn!(path = %path.display(), error = %e, "couldn't write transcript");
        }
    }
}

struct JobRun {
    handle: JobHandle,
    candidate: usize,
    stage: Stage,
    request: VerifyRequest,
    first: usize,
    slots: Vec<Slot>,
    timeout: Duration,
    max_attempts: u32,
    epoch: Instant,
}

impl JobRun {
    async fn execute(self) -> JobOutcome {
        let mut start_time = None;
        let mut last_error = String::new();
        let mut worker = self.first;

        for attempt in 0..self.max_attempts {
            worker = (self.first + attempt as usize) % self.slots.len();
            let slot = &self.slots[worker];
            let Ok(_permit) = slot.permits.clone().acquire_owned().await else {
                last_error = "worker semaphore closed".to_string();
                continue;
            };

            let started = Instant::now();
            let offset = *start_time.get_or_insert_with(|| started.duration_since(self.epoch).as_secs_f64());
            let result = tokio::time::timeout(self.timeout, slot.worker.verify(&self.request)).await;
            let elapsed = started.elapsed().as_secs_f64();

            let err = match result {
                Ok(Ok(reply)) => {
                    debug!(candidate = self.candidate, worker, elapsed, "job finished");
                    return JobOutcome {
                        handle: self.handle,
                        candidate: self.candidate,
                        stage: self.stage,
                        response: reply.response,
                        file_name: reply.file_name,
                        start_time: offset,
                        execution_time: elapsed,
                        worker,
                        attempts: attempt + 1,
                        failure: None,
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => VerifyError::Timeout(self.timeout),
            };
            warn!(
                candidate = self.candidate,
                worker = slot.worker.name(),
                attempt = attempt + 1,
                error = %err,
                "job failed"
            );
            last_error = err.to_string();
        }

        JobOutcome {
            handle: self.handle,
            candidate: self.candidate,
            stage: self.stage,
            response: String::new(),
            file_name: String::new(),
            start_time: start_time.unwrap_or_default(),
            execution_time: 0.0,
            worker,
            attempts: self.max_attempts,
            failure: Some(last_error),
        }
    }
}
