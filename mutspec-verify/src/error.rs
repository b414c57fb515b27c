use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Infrastructure failures talking to a verifier. None of these abort a run on
/// their own: the scheduler retries and finally records a failed job.
#[derive(Debug, Error, Diagnostic)]
pub enum VerifyError {
    #[error("ip port list is not given")]
    #[diagnostic(
        code(mutspec::verify::no_workers),
        help("pass --workers host:port[,host:port...] or --verifier <binary>, or add [[workers]] to the config")
    )]
    NoWorkers,

    #[error("worker {worker}: {source}")]
    #[diagnostic(code(mutspec::verify::io))]
    Io {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {worker}: {message}")]
    #[diagnostic(code(mutspec::verify::http))]
    Http { worker: String, message: String },

    #[error("job timed out after {}s", .0.as_secs())]
    #[diagnostic(code(mutspec::verify::timeout))]
    Timeout(Duration),

    #[error("job task failed: {0}")]
    #[diagnostic(code(mutspec::verify::join))]
    Join(String),
}
