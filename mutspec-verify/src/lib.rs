#![forbid(unsafe_code)]

pub mod error;
pub mod oracle;
pub mod pipeline;
pub mod scheduler;
pub mod worker;

pub use error::VerifyError;
pub use oracle::{
    Diagnostic, Markers, Verdict, classify, diagnostics, discharges, parse_oracle_response,
    parse_validity_response, refine_failure, summary_counts,
};
pub use pipeline::{
    CandidateReport, JobTiming, Pipeline, PipelineConfig, RunSummary, StageResult, apply_removals,
};
pub use scheduler::{Job, JobHandle, JobOutcome, Scheduler, SchedulerConfig};
pub use worker::{HttpWorker, ProcessWorker, VerifyRequest, WorkerReply, Worker};
