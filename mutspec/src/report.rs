use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use miette::IntoDiagnostic;
use mutspec_core::Outcome;
use mutspec_verify::{JobTiming, RunSummary};
use serde::Serialize;

pub const EXECUTION_TIME_FILE: &str = "executionTimeSummary.txt";
pub const START_TIME_FILE: &str = "startTimeSummary.txt";
pub const REPORT_FILE: &str = "report.json";

const MAIN_COLUMNS: [Outcome; 5] = [
    Outcome::InvalidExpr,
    Outcome::IncorrectProof,
    Outcome::FalsePredicate,
    Outcome::CorrectProof,
    Outcome::CorrectProofByTimeout,
];

const EXTRA_COLUMNS: [Outcome; 3] = [
    Outcome::VacuousProofPass,
    Outcome::NoMatchingTrigger,
    Outcome::Unknown,
];

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema: &'static str,
    pub timestamp: DateTime<Utc>,
    pub input: String,
    pub counts: BTreeMap<Outcome, usize>,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(input: &Path, summary: RunSummary) -> Self {
        Self {
            schema: "mutspec.run.v1",
            timestamp: Utc::now(),
            input: input.display().to_string(),
            counts: summary.counts(),
            summary,
        }
    }
}

/// The verdict table printed at the end of a run.
pub fn outcome_table(counts: &BTreeMap<Outcome, usize>) -> String {
    let n = |o: Outcome| counts.get(&o).copied().unwrap_or(0);
    let total: usize = counts.values().sum();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<15} {:<15} {:<15} {:<15} {:<25} {:<15}",
        MAIN_COLUMNS[0].as_str(),
        MAIN_COLUMNS[1].as_str(),
        MAIN_COLUMNS[2].as_str(),
        MAIN_COLUMNS[3].as_str(),
        MAIN_COLUMNS[4].as_str(),
        "Total"
    );
    let _ = writeln!(
        out,
        "{:<15} {:<15} {:<15} {:<15} {:<25} {:<15}",
        n(MAIN_COLUMNS[0]),
        n(MAIN_COLUMNS[1]),
        n(MAIN_COLUMNS[2]),
        n(MAIN_COLUMNS[3]),
        n(MAIN_COLUMNS[4]),
        total
    );
    out.push('\n');
    let _ = writeln!(
        out,
        "{:<20} {:<20} {:<15}",
        EXTRA_COLUMNS[0].as_str(),
        EXTRA_COLUMNS[1].as_str(),
        EXTRA_COLUMNS[2].as_str()
    );
    let _ = writeln!(
        out,
        "{:<20} {:<20} {:<15}",
        n(EXTRA_COLUMNS[0]),
        n(EXTRA_COLUMNS[1]),
        n(EXTRA_COLUMNS[2])
    );
    out
}

/// `(execution, start)` time logs: one `<index>, <seconds>` line per job,
/// start times relative to the earliest job.
pub fn time_summaries(timings: &[JobTiming]) -> (String, String) {
    let t0 = timings
        .iter()
        .map(|t| t.start_time)
        .fold(f64::INFINITY, f64::min);
    let mut exec = String::new();
    let mut start = String::new();
    for t in timings {
        let _ = writeln!(exec, "{}, {:.3}", t.index, t.execution_time);
        let _ = writeln!(start, "{}, {:.3}", t.index, t.start_time - t0);
    }
    (exec, start)
}

pub fn write_time_summaries(dir: &Path, timings: &[JobTiming]) -> miette::Result<()> {
    let (exec, start) = time_summaries(timings);
    std::fs::write(dir.join(EXECUTION_TIME_FILE), exec).into_diagnostic()?;
    std::fs::write(dir.join(START_TIME_FILE), start).into_diagnostic()?;
    Ok(())
}

pub fn write_report(dir: &Path, report: &RunReport) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(report).into_diagnostic()?;
    std::fs::write(dir.join(REPORT_FILE), json).into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            target: "p".to_string(),
            already_verifies: false,
            candidates: Vec::new(),
            repairs: vec![3],
            timings: vec![
                JobTiming {
                    index: 0,
                    start_time: 1.5,
                    execution_time: 0.25,
                },
                JobTiming {
                    index: 1,
                    start_time: 2.0,
                    execution_time: 1.0,
                },
            ],
        }
    }

    #[test]
    fn table_columns_are_fixed_width() {
        let mut counts = BTreeMap::new();
        counts.insert(Outcome::IncorrectProof, 7);
        counts.insert(Outcome::FalsePredicate, 2);
        counts.insert(Outcome::VacuousProofPass, 1);
        let table = outcome_table(&counts);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("InvalidExpr     IncorrectProof  FalsePredicate  CorrectProof    CorrectProofByTimeout     Total"));
        assert_eq!(
            lines[1].trim_end(),
            "0               7               2               0               0                         10"
        );
        assert!(lines[3].starts_with("VacuousProofPass"));
        assert!(lines[4].starts_with("1 "));
    }

    #[test]
    fn start_times_are_relative_to_the_first_job() {
        let (exec, start) = time_summaries(&summary().timings);
        assert_eq!(exec, "0, 0.250\n1, 1.000\n");
        assert_eq!(start, "0, 0.000\n1, 0.500\n");
    }

    #[test]
    fn files_land_in_the_workdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = summary();
        write_time_summaries(dir.path(), &s.timings).expect("time logs");
        write_report(dir.path(), &RunReport::new(Path::new("prog.json"), s)).expect("report");

        assert!(dir.path().join(EXECUTION_TIME_FILE).exists());
        assert!(dir.path().join(START_TIME_FILE).exists());
        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(REPORT_FILE)).expect("read"),
        )
        .expect("json");
        assert_eq!(json["target"], "p");
        assert_eq!(json["repairs"][0], 3);
        assert_eq!(json["already_verifies"], false);
        assert!(json["timestamp"].is_string());
    }
}
