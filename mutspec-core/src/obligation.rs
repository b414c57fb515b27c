//! Candidate-augmented programs and the lemmas each verification stage checks.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use mutspec_ast::{
    BoundVar, Expr, ExprKind, FnKind, Function, LetBinding, MatchCase, Param, Program, UnaryOp,
    format_expr, format_params, format_program,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::callgraph::PathStep;
use crate::candidate::ExpressionCandidate;
use crate::error::SearchError;

pub const DEFAULT_VERIFIER_ARGS: &[&str] = &[
    "/compile:0",
    "/rlimit:100000",
    "/allowGlobals",
    "/noNLarith",
    "/autoTriggers:1",
    "/verifyAllModules",
];

/// The three verification passes, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Weak,
    Vacuous,
    Full,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Weak, Stage::Vacuous, Stage::Full];

    /// Lower runs first.
    pub fn priority(self) -> u32 {
        match self {
            Stage::Weak => 0,
            Stage::Vacuous => 1,
            Stage::Full => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Weak => "weak",
            Stage::Vacuous => "vacuous",
            Stage::Full => "full",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a candidate takes the place of the target body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The candidate replaces the body.
    #[default]
    Mutate,
    /// The candidate is conjoined to the body.
    Conjoin,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutate" => Ok(Mode::Mutate),
            "conjoin" => Ok(Mode::Conjoin),
            other => Err(format!("unknown mode `{other}` (expected `mutate` or `conjoin`)")),
        }
    }
}

/// Which part of the target a candidate takes the place of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    /// The body of a predicate or function.
    #[default]
    Body,
    /// A precondition of a lemma or method, rewritten in place.
    Requires(usize),
    /// A postcondition of a lemma or method, rewritten in place.
    Ensures(usize),
}

impl Site {
    pub fn is_clause(self) -> bool {
        !matches!(self, Site::Body)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Body => f.write_str("body"),
            Site::Requires(i) => write!(f, "requires:{i}"),
            Site::Ensures(i) => write!(f, "ensures:{i}"),
        }
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("unknown site `{s}` (expected `body`, `requires:N` or `ensures:N`)");
        match s.split_once(':') {
            None if s == "body" => Ok(Site::Body),
            Some((kind, n)) => {
                let i: usize = n.trim().parse().map_err(|_| bad())?;
                match kind {
                    "requires" => Ok(Site::Requires(i)),
                    "ensures" => Ok(Site::Ensures(i)),
                    _ => Err(bad()),
                }
            }
            None => Err(bad()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lemma {
    pub name: String,
    pub text: String,
}

/// One rendered verification request and the source positions its verdict is read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedJob {
    pub index: usize,
    pub stage: Stage,
    pub code: String,
    pub arguments: Vec<String>,
    /// Procedure the verifier is restricted to.
    pub proc_name: String,
    /// Line of the lemma's `{}` body.
    pub postcondition_line: usize,
    pub lemma_start_line: usize,
    pub lemma_name_col: usize,
}

/// 0-based column of the lemma name after `lemma {:timeLimitMultiplier N} `.
pub fn lemma_name_col(time_limit_multiplier: u32) -> usize {
    30 + time_limit_multiplier.to_string().len()
}

pub fn base_name(target: &str) -> String {
    format!("BASE_{target}")
}

fn clause_pred_name(prefix: &str, target: &str) -> String {
    format!("{prefix}_{target}_Pred")
}

#[derive(Clone, Debug)]
pub struct ObligationBuilder {
    program: Program,
    target: Function,
    site: Site,
    original: Expr,
    /// Pre-state copies of formals read under `old(..)`, as `(formal, copy)`.
    olds: Vec<(String, Param)>,
    mode: Mode,
    time_limit_multiplier: u32,
    verifier_args: Vec<String>,
    proof: Option<String>,
    path: Vec<PathStep>,
    constraint: Option<Expr>,
}

impl ObligationBuilder {
    pub fn new(program: Program, target: &str, mode: Mode) -> Result<Self, SearchError> {
        Self::at(program, target, Site::Body, mode)
    }

    /// Builder whose candidates replace `site` of `target`.
    pub fn at(program: Program, target: &str, site: Site, mode: Mode) -> Result<Self, SearchError> {
        let f = program
            .function(target)
            .ok_or_else(|| SearchError::unknown_function(target, program.function_names()))?;
        let no_clause = || SearchError::NoClause {
            name: target.to_string(),
            site: site.to_string(),
        };
        let original = match site {
            Site::Body => f.body.clone().ok_or_else(|| SearchError::NoBody {
                name: target.to_string(),
            })?,
            Site::Requires(i) => f.requires.get(i).cloned().ok_or_else(no_clause)?,
            Site::Ensures(i) => f.ensures.get(i).cloned().ok_or_else(no_clause)?,
        };
        let target = f.clone();
        let olds = match site {
            Site::Ensures(_) => old_formals(&target),
            _ => Vec::new(),
        };
        let path = vec![PathStep {
            decl: target.name.clone(),
            call: None,
            cond: None,
        }];
        Ok(Self {
            program,
            target,
            site,
            original,
            olds,
            mode,
            time_limit_multiplier: 2,
            verifier_args: DEFAULT_VERIFIER_ARGS.iter().map(|s| s.to_string()).collect(),
            proof: None,
            path,
            constraint: None,
        })
    }

    pub fn with_time_limit_multiplier(mut self, n: u32) -> Self {
        self.time_limit_multiplier = n;
        self
    }

    pub fn with_verifier_args(mut self, args: Vec<String>) -> Self {
        self.verifier_args = args;
        self
    }

    pub fn with_proof(mut self, proof: Option<String>) -> Self {
        self.proof = proof;
        self
    }

    /// Call path used for the validity obligation; ignored when empty.
    pub fn with_path(mut self, path: Vec<PathStep>) -> Self {
        if !path.is_empty() {
            self.path = path;
        }
        self
    }

    /// Constraint over the root's formals, added as a `requires` of the validity check.
    pub fn with_constraint(mut self, constraint: Option<Expr>) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn target(&self) -> &Function {
        &self.target
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn site(&self) -> Site {
        self.site
    }

    /// The expression at the site before any candidate is put in place.
    pub fn seed(&self) -> &Expr {
        &self.original
    }

    /// The last pass re-verifies a proof instead of the validity check. A
    /// rewritten contract is always judged by re-verifying its own proof.
    pub fn reruns_proof(&self) -> bool {
        self.proof.is_some() || self.site.is_clause()
    }

    /// Procedure the last pass runs when it re-verifies a proof.
    fn final_proc(&self) -> String {
        self.proof.clone().unwrap_or_else(|| self.target.name.clone())
    }

    /// The target body with `candidate` put in place according to the mode.
    pub fn substituted_body(&self, candidate: &Expr) -> Expr {
        let body = self.original.clone();
        match self.mode {
            Mode::Mutate => candidate.clone(),
            Mode::Conjoin if candidate.is_true() => body,
            Mode::Conjoin if candidate.has_cardinality() => Expr::and(candidate.clone(), body),
            Mode::Conjoin => Expr::and(body, candidate.clone()),
        }
    }

    /// Full program with the candidate put in place. A body candidate gets an
    /// untouched `BASE_` copy declared right after the target; a clause
    /// candidate gets the `BASE_`/`MUTATED_` predicates over the contract.
    pub fn substituted_program(&self, candidate: &Expr) -> String {
        let mut program = self.program.clone();
        let name = self.target.name.clone();
        let Some(at) = program.functions.iter().position(|f| f.name == name) else {
            return format_program(&program);
        };
        let replaced = self.substituted_body(candidate);

        match self.site {
            Site::Body => {
                let mut copy = self.target.clone();
                copy.name = base_name(&name);
                let calls = HashMap::from([(name.clone(), copy.name.clone())]);
                copy.body = copy.body.as_ref().map(|b| substitute(b, &HashMap::new(), &calls));

                program.functions[at].body = Some(replaced);
                program.functions.insert(at + 1, copy);
            }
            Site::Requires(i) | Site::Ensures(i) => {
                let base = self.clause_pred(clause_pred_name("BASE", &name), &self.original);
                let mutated = self.clause_pred(clause_pred_name("MUTATED", &name), &replaced);
                let f = &mut program.functions[at];
                if let Site::Requires(_) = self.site {
                    f.requires[i] = replaced;
                } else {
                    f.ensures[i] = replaced;
                }
                program.functions.insert(at, mutated);
                program.functions.insert(at, base);
            }
        }
        format_program(&program)
    }

    /// The target's contract at the site as one predicate, with `clause`
    /// standing in for the clause under search.
    fn clause_pred(&self, name: String, clause: &Expr) -> Function {
        let lifted = self.lifted();
        let (requires, clauses) = match self.site {
            Site::Requires(i) => {
                let mut reqs = self.target.requires.clone();
                reqs[i] = clause.clone();
                (Vec::new(), reqs)
            }
            Site::Ensures(i) => {
                let mut ens = self.target.ensures.clone();
                ens[i] = clause.clone();
                (
                    self.target
                        .requires
                        .iter()
                        .map(|r| substitute(r, &lifted, &HashMap::new()))
                        .collect(),
                    ens.iter().map(|e| lift_old(e, &lifted)).collect(),
                )
            }
            Site::Body => (Vec::new(), vec![clause.clone()]),
        };
        Function {
            name,
            kind: FnKind::Predicate,
            pos: self.target.pos,
            type_params: self.target.type_params.clone(),
            params: self.lemma_params(),
            result: mutspec_ast::Type::Bool,
            requires,
            ensures: Vec::new(),
            body: Some(Expr::conjoin(clauses)),
            proof: None,
        }
    }

    /// Formal renames that move a pre-state read onto its `_OLD` copy.
    fn lifted(&self) -> HashMap<String, String> {
        self.olds
            .iter()
            .map(|(formal, copy)| (formal.clone(), copy.name.clone()))
            .collect()
    }

    fn header(&self, name: &str, params: &[Param], type_params: &[String]) -> String {
        let mut out = format!(
            "lemma {{:timeLimitMultiplier {}}} {name}",
            self.time_limit_multiplier
        );
        if !type_params.is_empty() {
            let tps: Vec<String> = type_params.iter().map(|t| format!("{t}(0,!new)")).collect();
            out.push('<');
            out.push_str(&tps.join(", "));
            out.push('>');
        }
        out.push('(');
        out.push_str(&format_params(params));
        out.push_str(")\n");
        out
    }

    fn lemma(&self, name: String, clauses: Vec<String>) -> Lemma {
        let mut text = self.header(&name, &self.lemma_params(), &self.target.type_params);
        for c in clauses {
            text.push_str("  ");
            text.push_str(&c);
            text.push('\n');
        }
        text.push_str("{}");
        Lemma { name, text }
    }

    fn target_requires(&self) -> Vec<String> {
        self.target
            .requires
            .iter()
            .map(|r| format!("requires {}", format_expr(r)))
            .collect()
    }

    /// Formals every stage lemma quantifies over.
    fn lemma_params(&self) -> Vec<Param> {
        let mut params: Vec<Param> = self.olds.iter().map(|(_, p)| p.clone()).collect();
        params.extend(self.target.params.iter().cloned());
        params
    }

    /// Preconditions every stage lemma assumes. A rewritten precondition is
    /// itself part of the predicates, so none are repeated.
    fn context_requires(&self) -> Vec<String> {
        match self.site {
            Site::Body => self.target_requires(),
            Site::Requires(_) => Vec::new(),
            Site::Ensures(_) => {
                let lifted = self.lifted();
                self.target
                    .requires
                    .iter()
                    .map(|r| format!("requires {}", format_expr(&substitute(r, &lifted, &HashMap::new()))))
                    .collect()
            }
        }
    }

    fn pred_call(&self, name: String) -> String {
        format_expr(&Expr::call(
            name,
            self.lemma_params().iter().map(Param::as_expr).collect(),
            mutspec_ast::Type::Bool,
        ))
    }

    /// The unmodified side of each comparison.
    fn base_call(&self) -> String {
        match self.site {
            Site::Body => format_expr(&Expr::call(
                base_name(&self.target.name),
                self.target.params.iter().map(Param::as_expr).collect(),
                self.target.result.clone(),
            )),
            _ => self.pred_call(clause_pred_name("BASE", &self.target.name)),
        }
    }

    /// The side carrying the candidate.
    fn candidate_call(&self) -> String {
        match self.site {
            Site::Body => format_expr(&self.target.self_call()),
            _ => self.pred_call(clause_pred_name("MUTATED", &self.target.name)),
        }
    }

    /// Pass 1: the original implies the candidate. Without formals there is
    /// nothing to quantify over and the implication is one `ensures`.
    pub fn weak_lemma(&self) -> Lemma {
        let mut clauses = self.context_requires();
        let (base, cand) = (self.base_call(), self.candidate_call());
        if self.lemma_params().is_empty() {
            clauses.push(match self.site {
                Site::Body => format!("ensures {cand} ==> {base}"),
                _ => format!("ensures {base} ==> {cand}"),
            });
        } else {
            clauses.push(format!("requires {base}"));
            clauses.push(format!("ensures {cand}"));
        }
        self.lemma(format!("isAtLeastAsWeak_{}", self.target.name), clauses)
    }

    /// Pass 2: a satisfiable candidate cannot prove `false`.
    pub fn vacuity_lemma(&self) -> Lemma {
        let mut clauses = self.context_requires();
        clauses.push(format!("requires {}", self.candidate_call()));
        clauses.push("ensures false".to_string());
        self.lemma(format!("isVac_{}", self.target.name), clauses)
    }

    pub fn same_lemma(&self) -> Lemma {
        let mut clauses = self.context_requires();
        clauses.push(format!("ensures {} <==> {}", self.base_call(), self.candidate_call()));
        self.lemma(format!("isSame_{}", self.target.name), clauses)
    }

    pub fn stronger_lemma(&self) -> Lemma {
        let mut clauses = self.context_requires();
        clauses.push(format!("requires {}", self.candidate_call()));
        clauses.push(format!("ensures {}", self.base_call()));
        self.lemma(format!("isStronger_{}", self.target.name), clauses)
    }

    /// Pass 3 without a configured proof: the preconditions along the call path
    /// are jointly satisfiable.
    ///
    /// Each step is resolved on its own, so a step naming an unknown function
    /// drops only the links it takes part in.
    pub fn validity_lemma(&self) -> Lemma {
        let steps: Vec<(&PathStep, Option<&Function>)> = self
            .path
            .iter()
            .map(|s| (s, self.program.function(&s.decl)))
            .collect();
        let name = format!(
            "validityCheck_{}",
            self.path
                .iter()
                .map(|s| s.decl.as_str())
                .collect::<Vec<_>>()
                .join("_")
        );

        let mut params: Vec<Param> = Vec::new();
        let mut type_params: Vec<String> = Vec::new();
        for d in steps.iter().filter_map(|(_, d)| *d) {
            for p in &d.params {
                params.push(Param::new(format!("{}_{}", d.name, p.name), p.ty.clone()));
            }
            for t in &d.type_params {
                if !type_params.contains(t) {
                    type_params.push(t.clone());
                }
            }
        }

        let root = steps.first().and_then(|(_, d)| *d);
        let mut clauses = Vec::new();
        if let Some(root) = root {
            for r in &root.requires {
                clauses.push(format!("requires {}", format_expr(&prefixed(root, r))));
            }
            let args = root
                .params
                .iter()
                .map(|p| prefixed(root, &p.as_expr()))
                .collect();
            clauses.push(format!("requires {}", format_expr(&root.call_with(args))));
        }
        for link in steps.windows(2) {
            let ((_, caller), (step, callee)) = (link[0], link[1]);
            let (Some(caller), Some(callee)) = (caller, callee) else {
                continue;
            };
            if let Some(cond) = &step.cond {
                clauses.push(format!("requires {}", format_expr(&prefixed(caller, cond))));
            }
            let args: Vec<Expr> = match step.call.as_ref().map(|c| &c.kind) {
                Some(ExprKind::Call { args, .. }) => args.iter().map(|a| prefixed(caller, a)).collect(),
                _ => Vec::new(),
            };
            for (arg, formal) in args.iter().zip(&callee.params) {
                clauses.push(format!(
                    "requires {} == {}_{}",
                    format_expr(arg),
                    callee.name,
                    formal.name
                ));
            }
            for r in &callee.requires {
                clauses.push(format!("requires {}", format_expr(&prefixed(callee, r))));
            }
            clauses.push(format!("requires {}", format_expr(&callee.call_with(args))));
        }
        if let (Some(c), Some(root)) = (&self.constraint, root) {
            clauses.push(format!("requires {}", format_expr(&prefixed(root, c))));
        }
        clauses.push("ensures false".to_string());

        let mut text = self.header(&name, &params, &type_params);
        for c in clauses {
            text.push_str("  ");
            text.push_str(&c);
            text.push('\n');
        }
        text.push_str("{}");
        Lemma { name, text }
    }

    /// Lemma appended for `stage`; `None` when pass 3 re-runs the configured proof.
    pub fn stage_lemma(&self, stage: Stage) -> Option<Lemma> {
        match stage {
            Stage::Weak => Some(self.weak_lemma()),
            Stage::Vacuous => Some(self.vacuity_lemma()),
            Stage::Full if self.reruns_proof() => None,
            Stage::Full => Some(self.validity_lemma()),
        }
    }

    pub fn arguments(&self, proc_name: &str) -> Vec<String> {
        let mut args = self.verifier_args.clone();
        args.push("/exitAfterFirstError".to_string());
        args.push(format!("/proc:*{proc_name}*"));
        args
    }

    pub fn render(&self, index: usize, candidate: &ExpressionCandidate, stage: Stage) -> RenderedJob {
        let mut code = format!("// #{index}\n// {}\n", candidate.text());
        code.push_str(&self.substituted_program(&candidate.expr));
        code.push_str("\n\n");

        let lemma = self.stage_lemma(stage);
        let (proc_name, lemma_start_line, postcondition_line) = match &lemma {
            Some(l) => {
                let start = line_count(&code) + 1;
                code.push_str(&l.text);
                code.push('\n');
                (l.name.clone(), start, line_count(&code))
            }
            None => (self.final_proc(), 0, 0),
        };
        RenderedJob {
            index,
            stage,
            arguments: self.arguments(&proc_name),
            code,
            proc_name,
            postcondition_line,
            lemma_start_line,
            lemma_name_col: lemma_name_col(self.time_limit_multiplier),
        }
    }

    /// Renders every candidate in parallel; output order follows `items`.
    pub fn render_batch(&self, items: &[(usize, ExpressionCandidate)], stage: Stage) -> Vec<RenderedJob> {
        items
            .par_iter()
            .map(|(i, c)| self.render(*i, c, stage))
            .collect()
    }
}

fn line_count(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

/// `e` with `decl`'s formals renamed to `<decl>_<formal>`.
fn prefixed(decl: &Function, e: &Expr) -> Expr {
    let vars: HashMap<String, String> = decl
        .params
        .iter()
        .map(|p| (p.name.clone(), format!("{}_{}", decl.name, p.name)))
        .collect();
    substitute(e, &vars, &HashMap::new())
}

/// Formals read under `old(..)` in `f`'s postconditions, each paired with
/// the `<formal>_OLD` parameter that carries its pre-state value.
fn old_formals(f: &Function) -> Vec<(String, Param)> {
    let mut out: Vec<(String, Param)> = Vec::new();
    for e in &f.ensures {
        e.walk(&mut |node| {
            let ExprKind::Unary {
                op: UnaryOp::Old,
                operand,
            } = &node.kind
            else {
                return;
            };
            operand.walk(&mut |inner| {
                let ExprKind::Var { name } = &inner.kind else {
                    return;
                };
                let Some(formal) = f.params.iter().find(|p| &p.name == name) else {
                    return;
                };
                if out.iter().all(|(n, _)| n != name) {
                    out.push((name.clone(), Param::new(format!("{name}_OLD"), formal.ty.clone())));
                }
            });
        });
    }
    out
}

/// `e` with every `old(x)` replaced by `x` read through `lifted`.
fn lift_old(e: &Expr, lifted: &HashMap<String, String>) -> Expr {
    match &e.kind {
        ExprKind::Unary {
            op: UnaryOp::Old,
            operand,
        } => substitute(operand, lifted, &HashMap::new()),
        _ => e.map_children(|c| lift_old(c, lifted)),
    }
}

/// Renames free variables per `vars` and callees per `calls`; binders shadow.
pub fn substitute(
    e: &Expr,
    vars: &HashMap<String, String>,
    calls: &HashMap<String, String>,
) -> Expr {
    let sub = |x: &Expr| substitute(x, vars, calls);
    let boxed = |x: &Expr| Box::new(substitute(x, vars, calls));
    let kind = match &e.kind {
        ExprKind::Lit { .. } => e.kind.clone(),
        ExprKind::Var { name } => ExprKind::Var {
            name: vars.get(name).cloned().unwrap_or_else(|| name.clone()),
        },
        ExprKind::Field { base, field } => ExprKind::Field {
            base: boxed(base),
            field: field.clone(),
        },
        ExprKind::IsCtor { base, ctor } => ExprKind::IsCtor {
            base: boxed(base),
            ctor: ctor.clone(),
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: boxed(operand),
        },
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op: *op,
            left: boxed(left),
            right: boxed(right),
        },
        ExprKind::Ite { test, then, els } => ExprKind::Ite {
            test: boxed(test),
            then: boxed(then),
            els: boxed(els),
        },
        ExprKind::Match { scrutinee, cases } => ExprKind::Match {
            scrutinee: boxed(scrutinee),
            cases: cases
                .iter()
                .map(|c| {
                    let inner = without(vars, &c.binders);
                    MatchCase {
                        ctor: c.ctor.clone(),
                        binders: c.binders.clone(),
                        body: substitute(&c.body, &inner, calls),
                    }
                })
                .collect(),
        },
        ExprKind::Let { bindings, body } => {
            let inner = without(vars, bindings.iter().map(|b| &b.name));
            ExprKind::Let {
                bindings: bindings
                    .iter()
                    .map(|b| LetBinding {
                        name: b.name.clone(),
                        rhs: sub(&b.rhs),
                    })
                    .collect(),
                body: Box::new(substitute(body, &inner, calls)),
            }
        }
        ExprKind::Quant {
            kind,
            bound,
            range,
            term,
        } => {
            let inner = without(vars, bound.iter().map(|b: &BoundVar| &b.name));
            ExprKind::Quant {
                kind: *kind,
                bound: bound.clone(),
                range: range.as_ref().map(|r| Box::new(substitute(r, &inner, calls))),
                term: Box::new(substitute(term, &inner, calls)),
            }
        }
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: calls.get(callee).cloned().unwrap_or_else(|| callee.clone()),
            args: args.iter().map(sub).collect(),
        },
        ExprKind::Index { base, index, upper } => ExprKind::Index {
            base: boxed(base),
            index: boxed(index),
            upper: upper.as_ref().map(|u| boxed(u)),
        },
    };
    Expr {
        pos: e.pos,
        ty: e.ty.clone(),
        kind,
    }
}

fn without<'a>(
    vars: &HashMap<String, String>,
    names: impl IntoIterator<Item = &'a String>,
) -> HashMap<String, String> {
    let mut inner = vars.clone();
    for n in names {
        inner.remove(n);
    }
    inner
}
