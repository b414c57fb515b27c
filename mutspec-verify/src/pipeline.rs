//! The three-pass search: weakness, vacuity, full proof.

use std::collections::{BTreeMap, HashMap};

use mutspec_ast::{Expr, Program, format_expr};
use mutspec_core::{
    ExpressionCandidate, Mode, ObligationBuilder, Outcome, RemoveDirective, SearchError,
    SearchState, Site, Stage, build_call_graph, constraint_invocations, enumerate_atoms,
    enumerate_paths, erase_conjunct, mutate,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::oracle::{Markers, Verdict, classify, discharges, summary_counts};
use crate::scheduler::{Job, Scheduler};
use crate::worker::VerifyRequest;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub mode: Mode,
    /// Body or contract clause the candidates replace.
    pub site: Site,
    pub max_search_depth: usize,
    pub max_expr_depth: usize,
    pub prune_failed_subsets: bool,
    pub retain_incorrect: bool,
    /// Lemma re-run by the full pass; when absent the validity check is used.
    pub proof: Option<String>,
    pub constraint: Option<String>,
    /// Root of the call graph the validity check walks; defaults to the target.
    pub root: Option<String>,
    pub remove: Vec<RemoveDirective>,
    pub time_limit_multiplier: u32,
    pub verifier_args: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Mutate,
            site: Site::Body,
            max_search_depth: 1,
            max_expr_depth: 2,
            prune_failed_subsets: true,
            retain_incorrect: false,
            proof: None,
            constraint: None,
            root: None,
            remove: Vec::new(),
            time_limit_multiplier: 2,
            verifier_args: mutspec_core::DEFAULT_VERIFIER_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: Outcome,
    pub execution_time: f64,
    pub failure: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CandidateReport {
    pub index: usize,
    pub expr: String,
    pub depth: usize,
    pub bits: String,
    pub stages: Vec<StageResult>,
    pub outcome: Outcome,
    pub vacuous: bool,
}

/// Timing of one classified job, in classification order.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct JobTiming {
    pub index: usize,
    pub start_time: f64,
    pub execution_time: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub target: String,
    /// The unmodified seed already discharges the last obligation.
    pub already_verifies: bool,
    pub candidates: Vec<CandidateReport>,
    pub repairs: Vec<usize>,
    pub timings: Vec<JobTiming>,
}

impl RunSummary {
    /// Final verdict counts over every candidate but the seed.
    pub fn counts(&self) -> BTreeMap<Outcome, usize> {
        let mut counts = BTreeMap::new();
        for c in self.candidates.iter().filter(|c| c.index != 0) {
            *counts.entry(c.outcome).or_insert(0) += 1;
        }
        counts
    }
}

pub struct Pipeline {
    target: String,
    max_search_depth: usize,
    /// The last pass re-runs a configured proof rather than the validity check.
    proof_mode: bool,
    builder: ObligationBuilder,
    state: SearchState,
    verdicts: HashMap<usize, Verdict>,
    stages: BTreeMap<usize, Vec<StageResult>>,
    timings: Vec<JobTiming>,
}

impl Pipeline {
    /// Resolves the target and its site, applies removal directives, builds
    /// the validity path and admits the depth-1 candidates. Every configuration error
    /// surfaces here, before any job exists.
    pub fn new(mut program: Program, target: &str, config: &PipelineConfig) -> Result<Self, SearchError> {
        apply_removals(&mut program, target, &config.remove)?;

        let root_name = config.root.clone().unwrap_or_else(|| target.to_string());
        let root = program
            .function(&root_name)
            .ok_or_else(|| SearchError::unknown_function(&root_name, program.function_names()))?
            .clone();
        let graph = build_call_graph(&program, &root_name)?;
        let paths = enumerate_paths(&graph, &root_name, target);
        if paths.len() > 1 {
            info!(paths = paths.len(), "several call paths reach the target; checking the first");
        }
        let path = paths.into_iter().next().unwrap_or_default();

        let constraint = match &config.constraint {
            Some(name) => {
                let c = program
                    .function(name)
                    .ok_or_else(|| SearchError::MissingConstraint { name: name.clone() })?;
                let calls = constraint_invocations(c, &root);
                (!calls.is_empty()).then(|| Expr::conjoin(calls))
            }
            None => None,
        };

        let builder = ObligationBuilder::at(program, target, config.site, config.mode)?
            .with_time_limit_multiplier(config.time_limit_multiplier)
            .with_verifier_args(config.verifier_args.clone())
            .with_proof(config.proof.clone())
            .with_path(path)
            .with_constraint(constraint);

        let mut state = SearchState::new(config.prune_failed_subsets, config.retain_incorrect);
        let seed = builder.seed().clone();
        match config.mode {
            Mode::Mutate => {
                state.admit_seed(ExpressionCandidate::new(seed.clone(), 0));
                for c in mutate(&seed) {
                    state.admit(c);
                }
            }
            Mode::Conjoin => {
                let atoms = enumerate_atoms(builder.program(), builder.target(), config.max_expr_depth);
                let mut pool_index = Vec::with_capacity(atoms.candidates.len());
                for (k, c) in atoms.candidates.into_iter().enumerate() {
                    pool_index.push(if k == 0 {
                        state.admit_seed(ExpressionCandidate::new(c.expr, 0))
                    } else {
                        state.admit(c)
                    });
                }
                for (a, b) in atoms.negations {
                    state.record_negation(pool_index[a], pool_index[b]);
                }
            }
        }
        info!(
            function = target,
            site = %config.site,
            candidates = state.len(),
            mode = ?config.mode,
            "admitted depth-1 candidates"
        );
        for (i, c) in state.candidates().iter().enumerate() {
            debug!(index = i, expr = %c.text(), "candidate");
        }

        Ok(Self {
            target: target.to_string(),
            max_search_depth: config.max_search_depth,
            proof_mode: builder.reruns_proof(),
            builder,
            state,
            verdicts: HashMap::new(),
            stages: BTreeMap::new(),
            timings: Vec::new(),
        })
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn builder(&self) -> &ObligationBuilder {
        &self.builder
    }

    /// Runs the search to completion against `scheduler`'s workers.
    ///
    /// The seed is checked against the last obligation first; when it already
    /// discharges it no candidate is submitted.
    pub async fn run(&mut self, scheduler: &mut Scheduler) -> RunSummary {
        self.run_pass(scheduler, Stage::Full, &[0]).await;
        if discharges(self.verdict(0), self.proof_mode) {
            info!("proof already goes through; no mutation needed");
            return self.summary(true, Vec::new());
        }

        let first: Vec<usize> = (1..self.state.len()).collect();
        self.run_pass(scheduler, Stage::Weak, &first).await;

        let mut prev = 1..self.state.len();
        for depth in 2..=self.max_search_depth {
            prev = self.state.next_depth(prev);
            if prev.is_empty() {
                info!(depth, "no new combinations");
                break;
            }
            let round: Vec<usize> = prev.clone().collect();
            self.run_pass(scheduler, Stage::Weak, &round).await;
        }

        let survivors: Vec<usize> = (1..self.state.len())
            .filter(|&i| self.verdict(i).outcome.is_proof())
            .collect();
        info!(survivors = survivors.len(), "weakness pass complete");
        if survivors.is_empty() {
            return self.summary(false, Vec::new());
        }

        self.run_pass(scheduler, Stage::Vacuous, &survivors).await;
        self.run_pass(scheduler, Stage::Full, &survivors).await;

        let repairs: Vec<usize> = survivors
            .iter()
            .copied()
            .filter(|&i| discharges(self.verdict(i), self.proof_mode))
            .collect();
        for &i in &repairs {
            if let Some(c) = self.state.candidate(i) {
                info!(index = i, expr = %c.text(), "repair found");
            }
        }
        self.summary(false, repairs)
    }

    fn verdict(&self, index: usize) -> Verdict {
        self.verdicts.get(&index).copied().unwrap_or_default()
    }

    async fn run_pass(&mut self, scheduler: &mut Scheduler, stage: Stage, indices: &[usize]) {
        let items: Vec<(usize, ExpressionCandidate)> = indices
            .iter()
            .filter_map(|&i| self.state.candidate(i).map(|c| (i, c.clone())))
            .collect();
        let rendered = self.builder.render_batch(&items, stage);

        let mut submitted = Vec::with_capacity(rendered.len());
        for (job, (_, candidate)) in rendered.into_iter().zip(&items) {
            let handle = scheduler.submit(Job {
                candidate: job.index,
                stage,
                priority: stage.priority() * 1_000 + candidate.depth as u32,
                request: VerifyRequest {
                    code: job.code.clone(),
                    arguments: job.arguments.clone(),
                },
                label: candidate.text(),
                worker: None,
            });
            submitted.push((handle, job));
        }
        info!(stage = %stage, jobs = submitted.len(), "pass submitted");
        scheduler.run_all().await;

        for (handle, job) in submitted {
            let Some(out) = scheduler.outcome(handle) else {
                warn!(index = job.index, "job has no outcome");
                continue;
            };
            let markers = Markers::for_job(&job, &out.file_name);
            let prior = self.verdict(job.index);
            let verdict = classify(stage, &out.response, &markers, prior);
            debug!(
                index = job.index,
                stage = %stage,
                outcome = %verdict.outcome,
                counts = ?summary_counts(&out.response),
                "classified"
            );
            self.verdicts.insert(job.index, verdict);
            self.state.record(job.index, verdict.outcome);
            self.stages.entry(job.index).or_default().push(StageResult {
                stage,
                outcome: verdict.outcome,
                execution_time: out.execution_time,
                failure: out.failure.clone(),
            });
            self.timings.push(JobTiming {
                index: job.index,
                start_time: out.start_time,
                execution_time: out.execution_time,
            });
        }
    }

    fn summary(&self, already_verifies: bool, repairs: Vec<usize>) -> RunSummary {
        let candidates = self
            .state
            .candidates()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let v = self.verdict(i);
                CandidateReport {
                    index: i,
                    expr: c.text(),
                    depth: c.depth,
                    bits: self.state.bit_string(i).unwrap_or_default(),
                    stages: self.stages.get(&i).cloned().unwrap_or_default(),
                    outcome: v.outcome,
                    vacuous: v.vacuous,
                }
            })
            .collect();
        RunSummary {
            target: self.target.clone(),
            already_verifies,
            candidates,
            repairs,
            timings: self.timings.clone(),
        }
    }
}

/// Drops the conjuncts named by `directives` from the target body.
pub fn apply_removals(
    program: &mut Program,
    target: &str,
    directives: &[RemoveDirective],
) -> Result<(), SearchError> {
    let file = program.file.clone();
    let known = program.function_names();
    let f = program
        .function_mut(target)
        .ok_or_else(|| SearchError::unknown_function(target, known))?;
    for d in directives.iter().filter(|d| d.applies_to(&file)) {
        let Some(body) = &f.body else {
            break;
        };
        match erase_conjunct(body, d.line) {
            Some(rest) => {
                info!(
                    file = %d.file,
                    line = d.line,
                    body = %format_expr(&rest),
                    "removed conjunct"
                );
                f.body = Some(rest);
            }
            None => warn!(line = d.line, "no conjunct starts at or before this line"),
        }
    }
    Ok(())
}
