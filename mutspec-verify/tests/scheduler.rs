use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mutspec_core::Stage;
use mutspec_verify::{
    Job, Scheduler, SchedulerConfig, VerifyError, VerifyRequest, Worker, WorkerReply,
};

/// Echoes the request code after an optional delay, logging the order it saw jobs in.
struct EchoWorker {
    name: String,
    delay: Duration,
    fail: bool,
    seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl EchoWorker {
    fn new(name: &str) -> Arc<Self> {
        Self::build(name, Duration::ZERO, false)
    }

    fn build(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            fail,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(&self, req: &VerifyRequest) -> Result<WorkerReply, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("lock").push(req.code.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(VerifyError::Http {
                worker: self.name.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(WorkerReply {
            response: format!("echo {}\n", req.code),
            file_name: "f.dfy".to_string(),
        })
    }
}

fn job(candidate: usize, priority: u32, code: &str) -> Job {
    Job {
        candidate,
        stage: Stage::Weak,
        priority,
        request: VerifyRequest {
            code: code.to_string(),
            arguments: Vec::new(),
        },
        label: format!("cand {candidate}"),
        worker: None,
    }
}

#[tokio::test]
async fn jobs_run_in_priority_order() {
    let w = EchoWorker::new("only");
    let mut s = Scheduler::new(vec![(w.clone() as Arc<dyn Worker>, 1)], SchedulerConfig::default())
        .expect("scheduler");
    s.submit(job(1, 2, "late"));
    s.submit(job(2, 0, "first"));
    s.submit(job(3, 1, "middle"));
    s.submit(job(4, 0, "second"));
    assert_eq!(s.pending(), 4);

    let released = s.run_all().await;

    assert_eq!(released.len(), 4);
    assert_eq!(s.pending(), 0);
    assert_eq!(w.seen(), vec!["first", "second", "middle", "late"]);
}

#[tokio::test]
async fn slow_job_times_out_with_a_failure() {
    let w = EchoWorker::build("slow", Duration::from_secs(5), false);
    let config = SchedulerConfig {
        job_timeout: Duration::from_millis(20),
        max_attempts: 1,
        transcripts: None,
    };
    let mut s = Scheduler::new(vec![(w as Arc<dyn Worker>, 1)], config).expect("scheduler");
    let h = s.submit(job(0, 0, "p"));

    s.run_all().await;

    let out = s.outcome(h).expect("outcome");
    assert!(out.response.is_empty());
    assert!(out.failure.as_deref().is_some_and(|f| f.contains("timed out")), "{:?}", out.failure);
}

#[tokio::test]
async fn failing_worker_hands_the_job_to_the_next() {
    let bad = EchoWorker::build("bad", Duration::ZERO, true);
    let good = EchoWorker::new("good");
    let mut s = Scheduler::new(
        vec![
            (bad.clone() as Arc<dyn Worker>, 1),
            (good.clone() as Arc<dyn Worker>, 1),
        ],
        SchedulerConfig::default(),
    )
    .expect("scheduler");
    // Candidate 0 lands on worker 0 first.
    let h = s.submit(job(0, 0, "p"));

    s.run_all().await;

    let out = s.outcome(h).expect("outcome");
    assert_eq!(out.worker, 1);
    assert_eq!(out.attempts, 2);
    assert_eq!(out.response, "echo p\n");
    assert!(out.failure.is_none());
    assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_retries_still_produce_an_outcome() {
    let bad = EchoWorker::build("bad", Duration::ZERO, true);
    let config = SchedulerConfig {
        max_attempts: 2,
        ..SchedulerConfig::default()
    };
    let mut s = Scheduler::new(vec![(bad.clone() as Arc<dyn Worker>, 2)], config).expect("scheduler");
    let h = s.submit(job(5, 0, "p"));

    s.run_all().await;

    let out = s.outcome(h).expect("outcome");
    assert_eq!(out.attempts, 2);
    assert!(out.failure.as_deref().is_some_and(|f| f.contains("connection refused")));
    assert_eq!(bad.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn transcripts_are_numbered_per_candidate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SchedulerConfig {
        transcripts: Some((dir.path().to_path_buf(), "output".to_string())),
        ..SchedulerConfig::default()
    };
    let mut s = Scheduler::new(vec![(EchoWorker::new("w") as Arc<dyn Worker>, 2)], config)
        .expect("scheduler");
    s.submit(job(3, 0, "weak"));
    s.run_all().await;
    let mut full = job(3, 2000, "full");
    full.stage = Stage::Full;
    s.submit(full);
    s.run_all().await;

    assert_eq!(s.jobs_for(3).len(), 2);
    let first = std::fs::read_to_string(dir.path().join("output_3_0.txt")).expect("first transcript");
    assert_eq!(first, "// cand 3\n// 3\necho weak\n");
    let second = std::fs::read_to_string(dir.path().join("output_3_1.txt")).expect("second transcript");
    assert!(second.ends_with("echo full\n"));
}
