//! Reading verdicts out of verifier transcripts.
//!
//! The verifier only speaks text. A verdict is decided by the last few lines of
//! its output: the summary count and, for a failing lemma, the exact
//! diagnostic line at the position the obligation was rendered at.

use std::path::Path;
use std::sync::LazyLock;

use mutspec_core::{Outcome, RenderedJob, Stage};
use regex::Regex;
use serde::Serialize;

const POSTCONDITION_ERROR: &str = "Error: A postcondition might not hold on this return path.";
const INCONCLUSIVE: &str = "Verification inconclusive";
const NO_TRIGGER: &str = "No terms found to trigger on";

/// The lines a response is compared against for one rendered job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub file: String,
    pub expected_error: String,
    pub inconclusive_prefix: String,
    /// The job checks the validity lemma, whose error may sit anywhere in the tail.
    pub validity: bool,
}

impl Markers {
    pub fn new(file: &str, postcondition_line: usize, lemma_start_line: usize, name_col: usize) -> Self {
        Self {
            file: file.to_string(),
            expected_error: format!("{file}({postcondition_line},0): {POSTCONDITION_ERROR}"),
            inconclusive_prefix: format!("{file}({lemma_start_line},{name_col}): {INCONCLUSIVE}"),
            validity: false,
        }
    }

    /// Markers for `job` as verified under `file` (the path the worker reports).
    pub fn for_job(job: &RenderedJob, file: &str) -> Self {
        let mut m = Markers::new(
            file,
            job.postcondition_line,
            job.lemma_start_line,
            job.lemma_name_col,
        );
        m.validity = job.stage == Stage::Full && job.lemma_start_line > 0;
        m
    }
}

/// A candidate's standing after a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Set once the vacuity pass has shown the candidate proves `false`.
    pub vacuous: bool,
}

impl Verdict {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            vacuous: false,
        }
    }
}

/// Positional check: the expected postcondition failure seven lines from the
/// end of a one-error run, or the inconclusive marker four lines from the end.
pub fn parse_oracle_response(response: &str, markers: &Markers) -> Outcome {
    let lines: Vec<&str> = response.split('\n').collect();
    if response.ends_with("1 error\n") {
        let hit = lines.len() >= 7 && lines[lines.len() - 7] == markers.expected_error;
        if hit { Outcome::CorrectProof } else { Outcome::IncorrectProof }
    } else if response.ends_with("1 inconclusive\n") {
        inconclusive(&lines, markers)
    } else {
        Outcome::IncorrectProof
    }
}

/// Like [`parse_oracle_response`] but the expected error may be any of the last seven lines.
pub fn parse_validity_response(response: &str, markers: &Markers) -> Outcome {
    let lines: Vec<&str> = response.split('\n').collect();
    if response.ends_with("1 error\n") {
        let hit = lines
            .iter()
            .rev()
            .take(7)
            .any(|l| *l == markers.expected_error);
        if hit { Outcome::CorrectProof } else { Outcome::IncorrectProof }
    } else if response.ends_with("1 inconclusive\n") {
        inconclusive(&lines, markers)
    } else {
        Outcome::IncorrectProof
    }
}

fn inconclusive(lines: &[&str], markers: &Markers) -> Outcome {
    if lines.len() >= 4 && lines[lines.len() - 4].starts_with(&markers.inconclusive_prefix) {
        Outcome::CorrectProofByTimeout
    } else {
        Outcome::IncorrectProof
    }
}

/// Ends in a `0 errors` summary (and not `10 errors`).
pub fn has_zero_errors(response: &str) -> bool {
    response
        .strip_suffix("0 errors\n")
        .is_some_and(|head| !head.ends_with(|c: char| c.is_ascii_digit()))
}

pub fn has_resolution_errors(response: &str, file: &str) -> bool {
    let base = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    response.ends_with(&format!("resolution/type errors detected in {base}\n"))
}

/// Names the failure behind a response the positional check rejected.
pub fn refine_failure(response: &str, file: &str) -> Outcome {
    if has_zero_errors(response) {
        Outcome::FalsePredicate
    } else if has_resolution_errors(response, file) {
        Outcome::InvalidExpr
    } else if response.contains(NO_TRIGGER) {
        Outcome::NoMatchingTrigger
    } else {
        Outcome::IncorrectProof
    }
}

/// One pass's verdict, a pure function of the response text, the markers and
/// the verdict the candidate carried into the pass.
pub fn classify(stage: Stage, response: &str, markers: &Markers, prior: Verdict) -> Verdict {
    match stage {
        Stage::Weak => {
            let o = parse_oracle_response(response, markers);
            if o.is_proof() {
                Verdict::new(o)
            } else {
                Verdict::new(refine_failure(response, &markers.file))
            }
        }
        Stage::Vacuous => {
            if has_zero_errors(response) {
                Verdict {
                    outcome: Outcome::VacuousProofPass,
                    vacuous: true,
                }
            } else if has_resolution_errors(response, &markers.file) {
                Verdict::new(Outcome::InvalidExpr)
            } else {
                prior
            }
        }
        Stage::Full => {
            let positional = markers
                .validity
                .then(|| parse_validity_response(response, markers))
                .filter(|o| o.is_proof());
            let outcome = match positional {
                Some(_) if prior.vacuous => Outcome::VacuousProofPass,
                Some(o) => o,
                None if has_zero_errors(response) => {
                    if prior.vacuous {
                        Outcome::VacuousProofPass
                    } else {
                        Outcome::FalsePredicate
                    }
                }
                None if has_resolution_errors(response, &markers.file) => Outcome::InvalidExpr,
                None => Outcome::IncorrectProof,
            };
            Verdict {
                outcome,
                vacuous: prior.vacuous,
            }
        }
    }
}

/// Whether a full-pass verdict discharges the last obligation.
///
/// A configured proof is discharged by a clean `0 errors` run. The validity
/// check instead succeeds when its `ensures false` fails at the rendered
/// position; a clean run there means the call path is unsatisfiable.
pub fn discharges(verdict: Verdict, proof_mode: bool) -> bool {
    if verdict.vacuous {
        return false;
    }
    if proof_mode {
        verdict.outcome == Outcome::FalsePredicate
    } else {
        verdict.outcome.is_proof()
    }
}

/// One `file(line,col): ...` diagnostic from a transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub message: String,
}

static DIAGNOSTIC: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<file>[^\s(][^\n(]*)\((?P<line>\d+),(?P<col>\d+)\): (?P<msg>[^\n]*)$").ok()
});

static SUMMARY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)finished with (?P<verified>\d+) verified, (?P<errors>\d+) errors?").ok()
});

pub fn diagnostics(response: &str) -> Vec<Diagnostic> {
    let Some(re) = DIAGNOSTIC.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(response)
        .filter_map(|c| {
            Some(Diagnostic {
                file: c.name("file")?.as_str().to_string(),
                line: c.name("line")?.as_str().parse().ok()?,
                col: c.name("col")?.as_str().parse().ok()?,
                message: c.name("msg")?.as_str().to_string(),
            })
        })
        .collect()
}

/// `(verified, errors)` from the verifier's closing summary line.
pub fn summary_counts(response: &str) -> Option<(u32, u32)> {
    let c = SUMMARY.as_ref()?.captures_iter(response).last()?;
    Some((
        c.name("verified")?.as_str().parse().ok()?,
        c.name("errors")?.as_str().parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Markers {
        Markers::new("/tmp/w/p_3.dfy", 20, 16, 31)
    }

    fn one_error(m: &Markers) -> String {
        format!(
            "{}\n/tmp/w/p_3.dfy(18,10): Related location: This is the postcondition that might not hold.\nExecution trace:\n    (0,0): anon0\n\nDafny program verifier finished with 3 verified, 1 error\n",
            m.expected_error
        )
    }

    #[test]
    fn expected_error_line_is_a_correct_proof() {
        let m = markers();
        assert_eq!(parse_oracle_response(&one_error(&m), &m), Outcome::CorrectProof);
    }

    #[test]
    fn error_at_another_position_is_incorrect() {
        let m = markers();
        let moved = Markers::new("/tmp/w/p_3.dfy", 21, 16, 31);
        assert_eq!(parse_oracle_response(&one_error(&moved), &m), Outcome::IncorrectProof);
    }

    #[test]
    fn short_response_is_incorrect() {
        let m = markers();
        assert_eq!(parse_oracle_response("1 error\n", &m), Outcome::IncorrectProof);
    }

    #[test]
    fn inconclusive_at_lemma_start_is_timeout_proof() {
        let m = markers();
        let r = format!(
            "{} (correctness)\n\nDafny program verifier finished with 2 verified, 0 errors, 1 inconclusive\n",
            m.inconclusive_prefix
        );
        assert_eq!(parse_oracle_response(&r, &m), Outcome::CorrectProofByTimeout);
        let off = "/tmp/w/p_3.dfy(2,31): Verification inconclusive\n\n\nx, 1 inconclusive\n";
        assert_eq!(parse_oracle_response(off, &m), Outcome::IncorrectProof);
    }

    #[test]
    fn validity_variant_searches_the_tail() {
        let m = markers();
        let r = format!("noise\n{}\n\nDafny program verifier finished with 3 verified, 1 error\n", m.expected_error);
        assert_eq!(parse_oracle_response(&r, &m), Outcome::IncorrectProof);
        assert_eq!(parse_validity_response(&r, &m), Outcome::CorrectProof);
    }

    #[test]
    fn failures_are_refined_by_their_tail() {
        let file = "/tmp/w/f.dfy";
        assert_eq!(
            refine_failure("Dafny program verifier finished with 4 verified, 0 errors\n", file),
            Outcome::FalsePredicate
        );
        assert_eq!(
            refine_failure("f.dfy(3,4): Error: unresolved identifier: y\n1 resolution/type errors detected in f.dfy\n", file),
            Outcome::InvalidExpr
        );
        assert_eq!(
            refine_failure("f.dfy(3,4): Warning: No terms found to trigger on.\nfinished with 1 verified, 2 errors\n", file),
            Outcome::NoMatchingTrigger
        );
        assert_eq!(refine_failure("", file), Outcome::IncorrectProof);
        assert_eq!(
            refine_failure("finished with 0 verified, 10 errors\n", file),
            Outcome::IncorrectProof
        );
    }

    #[test]
    fn weak_stage_keeps_resolution_errors_distinct() {
        let m = Markers::new("f.dfy", 9, 5, 31);
        let v = classify(
            Stage::Weak,
            "1 resolution/type errors detected in f.dfy\n",
            &m,
            Verdict::default(),
        );
        assert_eq!(v.outcome, Outcome::InvalidExpr);
    }

    #[test]
    fn vacuity_pass_flags_zero_errors() {
        let m = markers();
        let prior = Verdict::new(Outcome::CorrectProof);
        let v = classify(Stage::Vacuous, "finished with 2 verified, 0 errors\n", &m, prior);
        assert_eq!(v, Verdict { outcome: Outcome::VacuousProofPass, vacuous: true });
        let kept = classify(Stage::Vacuous, &one_error(&m), &m, prior);
        assert_eq!(kept, prior);
    }

    #[test]
    fn proof_pass_reports_clean_runs_unless_vacuous() {
        let m = markers();
        let ok = "finished with 5 verified, 0 errors\n";
        let v = classify(Stage::Full, ok, &m, Verdict::new(Outcome::CorrectProof));
        assert_eq!(v.outcome, Outcome::FalsePredicate);
        assert!(discharges(v, true));
        let vac = Verdict { outcome: Outcome::VacuousProofPass, vacuous: true };
        let v = classify(Stage::Full, ok, &m, vac);
        assert_eq!(v.outcome, Outcome::VacuousProofPass);
        assert!(!discharges(v, true));
        let bad = classify(Stage::Full, "finished with 1 verified, 2 errors\n", &m, Verdict::default());
        assert_eq!(bad.outcome, Outcome::IncorrectProof);
    }

    #[test]
    fn validity_check_fails_at_the_lemma_or_the_path_is_unsatisfiable() {
        let m = Markers {
            validity: true,
            ..markers()
        };
        let hit = classify(Stage::Full, &one_error(&m), &m, Verdict::new(Outcome::CorrectProof));
        assert_eq!(hit.outcome, Outcome::CorrectProof);
        assert!(discharges(hit, false));
        assert!(!discharges(hit, true));

        let unsat = classify(Stage::Full, "finished with 5 verified, 0 errors\n", &m, Verdict::default());
        assert_eq!(unsat.outcome, Outcome::FalsePredicate);
        assert!(!discharges(unsat, false));
        assert!(discharges(unsat, true));

        let vac = Verdict { outcome: Outcome::CorrectProof, vacuous: true };
        let v = classify(Stage::Full, &one_error(&m), &m, vac);
        assert_eq!(v.outcome, Outcome::VacuousProofPass);
        assert!(!discharges(v, false));
    }

    #[test]
    fn classification_is_deterministic() {
        let m = markers();
        let r = one_error(&m);
        let a = classify(Stage::Weak, &r, &m, Verdict::default());
        let b = classify(Stage::Weak, &r, &m, Verdict::default());
        assert_eq!(a, b);
    }

    #[test]
    fn diagnostics_and_summary_are_extracted() {
        let m = markers();
        let r = one_error(&m);
        let ds = diagnostics(&r);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].line, 20);
        assert_eq!(ds[0].col, 0);
        assert_eq!(summary_counts(&r), Some((3, 1)));
    }
}
