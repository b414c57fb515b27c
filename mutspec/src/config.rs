//! Run configuration loaded from `mutspec.toml`
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration. Command-line flags are applied on top in `main`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miette::Report;
use mutspec_core::{Mode, Site};
use mutspec_verify::{
    HttpWorker, PipelineConfig, ProcessWorker, SchedulerConfig, VerifyError, Worker,
};
use serde::{Deserialize, Serialize};

pub type ConfigError = Report;

fn config_msg(message: impl Into<String>) -> ConfigError {
    Report::msg(message.into())
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MutspecConfig {
    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub verifier: VerifierSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub mode: Mode,

    /// `"body"`, `{ requires = N }` or `{ ensures = N }`
    #[serde(default)]
    pub site: Site,

    /// Deepest conjunction of atoms tried
    #[serde(default = "default_max_search_depth")]
    pub max_search_depth: usize,

    /// Nesting bound for seed-argument enumeration
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    #[serde(default = "default_true")]
    pub prune_failed_subsets: bool,

    #[serde(default)]
    pub retain_incorrect: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifierSettings {
    #[serde(default = "default_verifier_args")]
    pub args: Vec<String>,

    #[serde(default = "default_time_limit_multiplier")]
    pub time_limit_multiplier: u32,

    /// Wall-clock deadline per attempt
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Where time summaries, transcripts and `report.json` are written
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Keep one transcript per verification job
    #[serde(default)]
    pub aux_files: bool,

    #[serde(default = "default_transcript_prefix")]
    pub transcript_prefix: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Http,
    Process,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub kind: WorkerKind,

    /// `http` workers: base URL or bare `host:port`
    #[serde(default)]
    pub url: Option<String>,

    /// `process` workers: verifier executable
    #[serde(default)]
    pub binary: Option<PathBuf>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl WorkerEntry {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: WorkerKind::Http,
            url: Some(url.into()),
            binary: None,
            concurrency: default_concurrency(),
        }
    }

    pub fn process(binary: impl Into<PathBuf>) -> Self {
        Self {
            kind: WorkerKind::Process,
            url: None,
            binary: Some(binary.into()),
            concurrency: default_concurrency(),
        }
    }
}

fn default_max_search_depth() -> usize {
    1
}

fn default_max_expr_depth() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_verifier_args() -> Vec<String> {
    mutspec_core::DEFAULT_VERIFIER_ARGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_time_limit_multiplier() -> u32 {
    2
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_transcript_prefix() -> String {
    "output".to_string()
}

fn default_concurrency() -> usize {
    4
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            mode: Mode::Mutate,
            site: Site::Body,
            max_search_depth: default_max_search_depth(),
            max_expr_depth: default_max_expr_depth(),
            prune_failed_subsets: true,
            retain_incorrect: false,
        }
    }
}

impl Default for VerifierSettings {
    fn default() -> Self {
        VerifierSettings {
            args: default_verifier_args(),
            time_limit_multiplier: default_time_limit_multiplier(),
            job_timeout_secs: default_job_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            workdir: default_workdir(),
            aux_files: false,
            transcript_prefix: default_transcript_prefix(),
        }
    }
}

impl MutspecConfig {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_msg(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| config_msg(format!("Invalid config format: {}", e)))
    }

    /// `path` when given, else `mutspec.toml` in the current directory if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let local = Path::new("mutspec.toml");
                if local.exists() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mode: self.search.mode,
            site: self.search.site,
            max_search_depth: self.search.max_search_depth,
            max_expr_depth: self.search.max_expr_depth,
            prune_failed_subsets: self.search.prune_failed_subsets,
            retain_incorrect: self.search.retain_incorrect,
            time_limit_multiplier: self.verifier.time_limit_multiplier,
            verifier_args: self.verifier.args.clone(),
            ..PipelineConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            job_timeout: Duration::from_secs(self.verifier.job_timeout_secs),
            max_attempts: self.verifier.max_attempts,
            transcripts: self.output.aux_files.then(|| {
                (
                    self.output.workdir.clone(),
                    self.output.transcript_prefix.clone(),
                )
            }),
        }
    }

    /// Instantiates the configured workers. `file_name` is what local workers
    /// name the program on disk.
    pub fn build_workers(&self, file_name: &str) -> miette::Result<Vec<(Arc<dyn Worker>, usize)>> {
        if self.workers.is_empty() {
            return Err(VerifyError::NoWorkers.into());
        }
        let timeout = Duration::from_secs(self.verifier.job_timeout_secs);
        let mut out: Vec<(Arc<dyn Worker>, usize)> = Vec::with_capacity(self.workers.len());
        for (i, w) in self.workers.iter().enumerate() {
            let worker: Arc<dyn Worker> = match w.kind {
                WorkerKind::Http => {
                    let url = w
                        .url
                        .as_deref()
                        .ok_or_else(|| config_msg(format!("workers[{i}]: http worker needs `url`")))?;
                    Arc::new(HttpWorker::new(url, timeout)?)
                }
                WorkerKind::Process => {
                    let binary = w.binary.as_ref().ok_or_else(|| {
                        config_msg(format!("workers[{i}]: process worker needs `binary`"))
                    })?;
                    Arc::new(ProcessWorker::new(binary, file_name))
                }
            };
            out.push((worker, w.concurrency));
        }
        Ok(out)
    }
}

/// Splits `--workers a:1,b:2` into HTTP worker entries.
pub fn parse_worker_list(list: &str) -> Vec<WorkerEntry> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(WorkerEntry::http)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = MutspecConfig::parse("").expect("parse");
        assert_eq!(cfg.search.mode, Mode::Mutate);
        assert_eq!(cfg.search.site, Site::Body);
        assert_eq!(cfg.search.max_search_depth, 1);
        assert!(cfg.search.prune_failed_subsets);
        assert_eq!(cfg.verifier.args[0], "/compile:0");
        assert_eq!(cfg.verifier.job_timeout_secs, 600);
        assert_eq!(cfg.output.transcript_prefix, "output");
        assert!(cfg.workers.is_empty());
    }

    #[test]
    fn sections_and_workers_parse() {
        let cfg = MutspecConfig::parse(
            r#"
            [search]
            mode = "conjoin"
            max_search_depth = 3
            site = { ensures = 1 }

            [verifier]
            max_attempts = 1

            [output]
            aux_files = true
            workdir = "out"

            [[workers]]
            kind = "http"
            url = "127.0.0.1:50051"

            [[workers]]
            kind = "process"
            binary = "/usr/bin/dafny"
            concurrency = 2
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.search.mode, Mode::Conjoin);
        assert_eq!(cfg.search.max_search_depth, 3);
        assert_eq!(cfg.search.max_expr_depth, 2);
        assert_eq!(cfg.pipeline_config().site, Site::Ensures(1));
        assert_eq!(cfg.verifier.max_attempts, 1);
        assert_eq!(cfg.workers[0], WorkerEntry::http("127.0.0.1:50051"));
        assert_eq!(cfg.workers[1].concurrency, 2);

        let sched = cfg.scheduler_config();
        assert_eq!(sched.max_attempts, 1);
        assert_eq!(
            sched.transcripts,
            Some((PathBuf::from("out"), "output".to_string()))
        );
        assert_eq!(cfg.build_workers("f.dfy").expect("workers").len(), 2);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(MutspecConfig::parse("[search]\nmode = \"shuffle\"\n").is_err());
    }

    #[test]
    fn no_workers_is_fatal() {
        let err = MutspecConfig::default()
            .build_workers("f.dfy")
            .err()
            .expect("error");
        assert_eq!(err.to_string(), "ip port list is not given");
    }

    #[test]
    fn http_worker_without_url_is_fatal() {
        let cfg = MutspecConfig {
            workers: vec![WorkerEntry {
                kind: WorkerKind::Http,
                url: None,
                binary: None,
                concurrency: 1,
            }],
            ..MutspecConfig::default()
        };
        assert!(cfg.build_workers("f.dfy").is_err());
    }

    #[test]
    fn worker_list_splits_on_commas() {
        let ws = parse_worker_list("a:1, b:2,,");
        assert_eq!(ws, vec![WorkerEntry::http("a:1"), WorkerEntry::http("b:2")]);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mutspec.toml");
        std::fs::write(&path, "[verifier]\ntime_limit_multiplier = 5\n").expect("write");
        let cfg = MutspecConfig::from_file(&path).expect("load");
        assert_eq!(cfg.pipeline_config().time_limit_multiplier, 5);
    }
}
