use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mutspec_ast::{BinOp, Expr, FnKind, Function, Param, Program, Type};
use mutspec_core::{Outcome, Site};
use mutspec_verify::{
    Pipeline, PipelineConfig, Scheduler, SchedulerConfig, VerifyError, VerifyRequest, Worker,
    WorkerReply,
};

const FILE: &str = "f.dfy";

/// What the verifier says about one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Says {
    /// The expected postcondition failure at the rendered position.
    Expected,
    Errors,
    NoErrors,
    Unresolved,
}

/// In-memory verifier that answers by stage and candidate text.
struct ScriptedWorker {
    script: Box<dyn Fn(&str, &str) -> Says + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedWorker {
    fn new(script: impl Fn(&str, &str) -> Says + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }
}

fn candidate_of(code: &str) -> &str {
    code.lines()
        .nth(1)
        .and_then(|l| l.strip_prefix("// "))
        .unwrap_or("")
}

fn proc_of(req: &VerifyRequest) -> &str {
    req.arguments
        .iter()
        .rev()
        .find_map(|a| a.strip_prefix("/proc:*"))
        .and_then(|a| a.strip_suffix('*'))
        .unwrap_or("")
}

fn expected_response(code: &str) -> String {
    let post = code.matches('\n').count();
    format!(
        "{FILE}({post},0): Error: A postcondition might not hold on this return path.\n\
         {FILE}(3,10): Related location: This is the postcondition that might not hold.\n\
         Execution trace:\n    (0,0): anon0\n\n\
         Dafny program verifier finished with 2 verified, 1 error\n"
    )
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn verify(&self, req: &VerifyRequest) -> Result<WorkerReply, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = match (self.script)(proc_of(req), candidate_of(&req.code)) {
            Says::Expected => expected_response(&req.code),
            Says::Errors => "Dafny program verifier finished with 1 verified, 2 errors\n".to_string(),
            Says::NoErrors => "Dafny program verifier finished with 3 verified, 0 errors\n".to_string(),
            Says::Unresolved => format!("{FILE}(4,6): Error: unresolved identifier: y\n1 resolution/type errors detected in {FILE}\n"),
        };
        Ok(WorkerReply {
            response,
            file_name: FILE.to_string(),
        })
    }
}

fn program() -> Program {
    let x = Expr::var("x", Type::Int);
    Program {
        file: FILE.to_string(),
        datatypes: Vec::new(),
        functions: vec![Function::predicate(
            "p",
            vec![Param::new("x", Type::Int)],
            Expr::binary(BinOp::Gt, x, Expr::int(0)),
        )],
    }
}

fn scheduler(worker: Arc<ScriptedWorker>) -> Scheduler {
    Scheduler::new(vec![(worker as Arc<dyn Worker>, 4)], SchedulerConfig::default())
        .expect("scheduler")
}

fn outcome_of(summary: &mutspec_verify::RunSummary, expr: &str) -> Outcome {
    summary
        .candidates
        .iter()
        .find(|c| c.expr == expr)
        .map(|c| c.outcome)
        .unwrap_or_else(|| panic!("no candidate {expr}"))
}

fn with_proof() -> PipelineConfig {
    PipelineConfig {
        proof: Some("mainProof".to_string()),
        ..PipelineConfig::default()
    }
}

fn repaired(summary: &mutspec_verify::RunSummary) -> Vec<&str> {
    summary
        .repairs
        .iter()
        .map(|&i| summary.candidates[i].expr.as_str())
        .collect()
}

#[tokio::test]
async fn seed_whose_proof_goes_through_short_circuits() {
    let worker = ScriptedWorker::new(|proc, cand| match (proc, cand) {
        ("mainProof", "x > 0") => Says::NoErrors,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker.clone());
    let mut pipeline = Pipeline::new(program(), "p", &with_proof()).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    assert!(summary.already_verifies);
    assert!(summary.repairs.is_empty());
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.candidates[0].stages.len(), 1);
}

#[tokio::test]
async fn seed_with_satisfiable_call_path_short_circuits() {
    let worker = ScriptedWorker::new(|proc, cand| match cand {
        "x > 0" if proc.starts_with("validityCheck") => Says::Expected,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker.clone());
    let mut pipeline = Pipeline::new(program(), "p", &PipelineConfig::default()).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    assert!(summary.already_verifies);
    assert_eq!(summary.candidates[0].outcome, Outcome::CorrectProof);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn weakness_alone_does_not_short_circuit() {
    // Every weakness lemma holds, the seed's included, but the proof still fails.
    let worker = ScriptedWorker::new(|proc, _| {
        if proc.starts_with("isAtLeastAsWeak") { Says::Expected } else { Says::Errors }
    });
    let mut sched = scheduler(worker.clone());
    let mut pipeline = Pipeline::new(program(), "p", &with_proof()).expect("pipeline");
    let admitted = pipeline.state().len();

    let summary = pipeline.run(&mut sched).await;

    assert!(!summary.already_verifies);
    assert!(summary.repairs.is_empty());
    assert!(worker.calls.load(Ordering::SeqCst) > admitted);
}

#[tokio::test]
async fn validity_repairs_are_satisfiable_and_not_vacuous() {
    let worker = ScriptedWorker::new(|proc, cand| match (proc, cand) {
        (p, "x >= 0" | "x != 0" | "x == 0") if p.starts_with("isAtLeastAsWeak") => Says::Expected,
        (p, _) if p.starts_with("isAtLeastAsWeak") => Says::Errors,
        (p, "x >= 0") if p.starts_with("isVac") => Says::NoErrors,
        (p, _) if p.starts_with("isVac") => Says::Expected,
        // The seed's path and `x == 0`'s are unsatisfiable.
        (p, "x > 0" | "x == 0") if p.starts_with("validityCheck") => Says::NoErrors,
        (p, _) if p.starts_with("validityCheck") => Says::Expected,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker);
    let mut pipeline = Pipeline::new(program(), "p", &PipelineConfig::default()).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    assert!(!summary.already_verifies);
    assert_eq!(outcome_of(&summary, "x >= 0"), Outcome::VacuousProofPass);
    assert_eq!(outcome_of(&summary, "x != 0"), Outcome::CorrectProof);
    assert_eq!(outcome_of(&summary, "x == 0"), Outcome::FalsePredicate);
    assert_eq!(repaired(&summary), vec!["x != 0"]);
}

#[tokio::test]
async fn proof_repairs_verify_cleanly_and_are_not_vacuous() {
    let worker = ScriptedWorker::new(|proc, cand| match (proc, cand) {
        (p, "x >= 0" | "x != 0" | "x == 0") if p.starts_with("isAtLeastAsWeak") => Says::Expected,
        (p, _) if p.starts_with("isAtLeastAsWeak") => Says::Errors,
        (p, "x >= 0") if p.starts_with("isVac") => Says::NoErrors,
        (p, _) if p.starts_with("isVac") => Says::Expected,
        ("mainProof", "x >= 0" | "x != 0") => Says::NoErrors,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker);
    let mut pipeline = Pipeline::new(program(), "p", &with_proof()).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    assert!(!summary.already_verifies);
    assert_eq!(outcome_of(&summary, "x >= 0"), Outcome::VacuousProofPass);
    assert_eq!(outcome_of(&summary, "x != 0"), Outcome::FalsePredicate);
    assert_eq!(outcome_of(&summary, "x == 0"), Outcome::IncorrectProof);
    assert_eq!(repaired(&summary), vec!["x != 0"]);
}

fn lemma_program() -> Program {
    let x = Expr::var("x", Type::Int);
    let mut pos = Function::predicate("pos", vec![Param::new("x", Type::Int)], Expr::bool(true));
    pos.kind = FnKind::Lemma;
    pos.body = None;
    pos.proof = Some(String::new());
    pos.requires.push(Expr::binary(BinOp::Gt, x.clone(), Expr::int(0)));
    pos.ensures.push(Expr::binary(BinOp::Ne, x, Expr::int(0)));
    Program {
        file: FILE.to_string(),
        datatypes: Vec::new(),
        functions: vec![pos],
    }
}

#[tokio::test]
async fn precondition_repairs_are_judged_by_the_lemma_itself() {
    let worker = ScriptedWorker::new(|proc, cand| match (proc, cand) {
        ("isAtLeastAsWeak_pos", "x >= 0" | "x != 0") => Says::Expected,
        ("isVac_pos", _) => Says::Expected,
        ("pos", "x != 0") => Says::NoErrors,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker);
    let config = PipelineConfig {
        site: Site::Requires(0),
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(lemma_program(), "pos", &config).expect("pipeline");
    assert!(pipeline.builder().reruns_proof());

    let summary = pipeline.run(&mut sched).await;

    assert!(!summary.already_verifies);
    assert_eq!(summary.candidates[0].expr, "x > 0");
    assert_eq!(outcome_of(&summary, "x != 0"), Outcome::FalsePredicate);
    assert_eq!(outcome_of(&summary, "x >= 0"), Outcome::IncorrectProof);
    assert_eq!(repaired(&summary), vec!["x != 0"]);
}

#[test]
fn missing_clause_is_fatal_before_any_job() {
    let config = PipelineConfig {
        site: Site::Ensures(1),
        ..PipelineConfig::default()
    };
    assert!(matches!(
        Pipeline::new(lemma_program(), "pos", &config),
        Err(mutspec_core::SearchError::NoClause { .. })
    ));
}

#[tokio::test]
async fn unresolvable_candidate_is_invalid() {
    let worker = ScriptedWorker::new(|_, cand| {
        if cand == "x < 0" { Says::Unresolved } else { Says::Errors }
    });
    let mut sched = scheduler(worker);
    let mut pipeline = Pipeline::new(program(), "p", &PipelineConfig::default()).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    assert_eq!(outcome_of(&summary, "x < 0"), Outcome::InvalidExpr);
    assert_eq!(outcome_of(&summary, "x == 0"), Outcome::IncorrectProof);
    assert_eq!(summary.counts().get(&Outcome::InvalidExpr), Some(&1));
}

#[tokio::test]
async fn failed_atoms_are_never_combined() {
    let worker = ScriptedWorker::new(|_, _| Says::Errors);
    let mut sched = scheduler(worker.clone());
    let config = PipelineConfig {
        max_search_depth: 3,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(program(), "p", &config).expect("pipeline");
    let admitted = pipeline.state().len();

    let summary = pipeline.run(&mut sched).await;

    assert_eq!(pipeline.state().len(), admitted);
    assert_eq!(worker.calls.load(Ordering::SeqCst), admitted);
    assert!(summary.candidates.iter().all(|c| c.depth <= 1));
}

#[tokio::test]
async fn surviving_atoms_are_combined_at_the_next_depth() {
    let worker = ScriptedWorker::new(|proc, cand| match cand {
        "x >= 0" | "x != 0" if proc.starts_with("isAtLeastAsWeak") => Says::Expected,
        _ => Says::Errors,
    });
    let mut sched = scheduler(worker);
    let config = PipelineConfig {
        max_search_depth: 2,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(program(), "p", &config).expect("pipeline");

    let summary = pipeline.run(&mut sched).await;

    let combined: Vec<&str> = summary
        .candidates
        .iter()
        .filter(|c| c.depth == 1 && c.expr.contains("&&"))
        .map(|c| c.expr.as_str())
        .collect();
    assert_eq!(combined.len(), 1, "{combined:?}");
    assert!(combined[0] == "x >= 0 && x != 0" || combined[0] == "x != 0 && x >= 0");
    assert_eq!(outcome_of(&summary, combined[0]), Outcome::IncorrectProof);
}

#[test]
fn missing_constraint_is_fatal_before_any_job() {
    let config = PipelineConfig {
        constraint: Some("valid".to_string()),
        ..PipelineConfig::default()
    };
    assert!(matches!(
        Pipeline::new(program(), "p", &config),
        Err(mutspec_core::SearchError::MissingConstraint { .. })
    ));
}
