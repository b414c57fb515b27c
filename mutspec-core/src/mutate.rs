//! Syntactic mutation of specification bodies.
//!
//! `alternatives` returns every variant of a node reachable by one catalog rule
//! applied at that node or anywhere below it, always including the node itself,
//! so that parents can rewrap child results without special cases.

use std::collections::HashSet;

use mutspec_ast::{BinOp, Expr, ExprKind, LetBinding, Literal, MatchCase, Type, UnaryOp, format_expr};
use tracing::debug;

use crate::candidate::ExpressionCandidate;

/// All mutants of `seed`, deduplicated by printed form, seed excluded.
pub fn mutate(seed: &Expr) -> Vec<ExpressionCandidate> {
    let original = format_expr(seed);
    let out: Vec<ExpressionCandidate> = alternatives(seed)
        .into_iter()
        .filter(|e| format_expr(e) != original)
        .map(ExpressionCandidate::atom)
        .collect();
    debug!(seed = %original, count = out.len(), "mutated seed");
    out
}

/// Collects variants of one node, dropping duplicates and anything whose type
/// differs from the node being replaced.
struct Variants {
    ty: Type,
    seen: HashSet<String>,
    out: Vec<Expr>,
}

impl Variants {
    fn new(ty: &Type) -> Self {
        Self {
            ty: ty.clone(),
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, e: Expr) {
        if e.ty != self.ty {
            return;
        }
        if self.seen.insert(format_expr(&e)) {
            self.out.push(e);
        }
    }
}

pub fn alternatives(e: &Expr) -> Vec<Expr> {
    let mut v = Variants::new(&e.ty);
    v.push(e.clone());
    match &e.kind {
        ExprKind::Binary { op, left, right } => {
            binary_alternatives(&mut v, e, *op, left, right);
        }
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => {
            v.push(operand.as_ref().clone().at(e.pos));
            for m in alternatives(operand) {
                v.push(Expr::not(m).at(e.pos));
            }
        }
        ExprKind::Unary { op, operand } => {
            for m in alternatives(operand) {
                v.push(Expr::unary(*op, m).at(e.pos));
            }
        }
        ExprKind::Lit {
            value: Literal::Int(n),
        } => {
            if let Some(up) = n.checked_add(1) {
                v.push(Expr::int(up).at(e.pos));
            }
            if let Some(down) = n.checked_sub(1) {
                v.push(Expr::int(down).at(e.pos));
            }
        }
        ExprKind::Ite { test, then, els } => {
            for m in alternatives(test) {
                v.push(rebuilt(e, Expr::ite(m, then.as_ref().clone(), els.as_ref().clone())));
            }
            for m in alternatives(then) {
                v.push(rebuilt(e, Expr::ite(test.as_ref().clone(), m, els.as_ref().clone())));
            }
            for m in alternatives(els) {
                v.push(rebuilt(e, Expr::ite(test.as_ref().clone(), then.as_ref().clone(), m)));
            }
        }
        ExprKind::Quant {
            kind,
            bound,
            range,
            term,
        } => {
            for m in alternatives(term) {
                v.push(rebuilt(
                    e,
                    Expr::quant(*kind, bound.clone(), range.as_deref().cloned(), m),
                ));
            }
            if let Some(r) = range {
                for m in alternatives(r) {
                    v.push(rebuilt(
                        e,
                        Expr::quant(*kind, bound.clone(), Some(m), term.as_ref().clone()),
                    ));
                }
            }
            v.push(Expr::not(e.clone()).at(e.pos));
        }
        ExprKind::Let { bindings, body } => {
            for (i, b) in bindings.iter().enumerate() {
                for m in alternatives(&b.rhs) {
                    let mut next = bindings.clone();
                    next[i] = LetBinding {
                        name: b.name.clone(),
                        rhs: m,
                    };
                    v.push(rebuilt(e, Expr::let_in(next, body.as_ref().clone())));
                }
            }
            for m in alternatives(body) {
                v.push(rebuilt(e, Expr::let_in(bindings.clone(), m)));
            }
        }
        ExprKind::Match { scrutinee, cases } => {
            for (i, c) in cases.iter().enumerate() {
                for m in alternatives(&c.body) {
                    let mut next = cases.clone();
                    next[i] = MatchCase {
                        ctor: c.ctor.clone(),
                        binders: c.binders.clone(),
                        body: m,
                    };
                    v.push(rebuilt(
                        e,
                        Expr::new(
                            ExprKind::Match {
                                scrutinee: scrutinee.clone(),
                                cases: next,
                            },
                            e.ty.clone(),
                        ),
                    ));
                }
            }
        }
        ExprKind::Field { base, field } => {
            for m in alternatives(base) {
                v.push(rebuilt(e, Expr::field(m, field.clone(), e.ty.clone())));
            }
        }
        ExprKind::IsCtor { base, ctor } => {
            for m in alternatives(base) {
                v.push(rebuilt(e, Expr::is_ctor(m, ctor.clone())));
            }
        }
        ExprKind::Index { base, index, upper } => {
            for m in alternatives(base) {
                v.push(rebuilt(
                    e,
                    index_node(m, index.as_ref().clone(), upper.as_deref().cloned(), &e.ty),
                ));
            }
            for m in alternatives(index) {
                v.push(rebuilt(
                    e,
                    index_node(base.as_ref().clone(), m, upper.as_deref().cloned(), &e.ty),
                ));
            }
        }
        ExprKind::Lit { .. } | ExprKind::Var { .. } | ExprKind::Call { .. } => {}
    }
    v.out
}

fn binary_alternatives(v: &mut Variants, e: &Expr, op: BinOp, left: &Expr, right: &Expr) {
    if op.is_logical() {
        for (a, b) in sign_flips(left, right) {
            v.push(Expr::and(a.clone(), b.clone()).at(e.pos));
            v.push(Expr::or(a, b).at(e.pos));
        }
    } else if op.is_relational() {
        for alt in relational_ops(&left.ty) {
            v.push(Expr::binary(alt, left.clone(), right.clone()).at(e.pos));
        }
    } else if op.is_membership() {
        let swapped = if op == BinOp::In {
            BinOp::NotIn
        } else {
            BinOp::In
        };
        v.push(Expr::binary(swapped, left.clone(), right.clone()).at(e.pos));
    } else if op.is_arith() {
        for alt in arith_ops(&left.ty) {
            v.push(Expr::binary(alt, left.clone(), right.clone()).at(e.pos));
        }
        if left.ty.is_int() && right.ty.is_int() {
            for l in nudged(left) {
                v.push(Expr::binary(op, l, right.clone()).at(e.pos));
            }
            for r in nudged(right) {
                v.push(Expr::binary(op, left.clone(), r).at(e.pos));
            }
        }
    }
    for m in alternatives(left) {
        v.push(rebuilt(e, Expr::binary(op, m, right.clone())));
    }
    for m in alternatives(right) {
        v.push(rebuilt(e, Expr::binary(op, left.clone(), m)));
    }
}

// (a, b), (!a, b), (a, !b), (!a, !b)
fn sign_flips(a: &Expr, b: &Expr) -> [(Expr, Expr); 4] {
    [
        (a.clone(), b.clone()),
        (a.clone().negate(), b.clone()),
        (a.clone(), b.clone().negate()),
        (a.clone().negate(), b.clone().negate()),
    ]
}

fn relational_ops(operand: &Type) -> Vec<BinOp> {
    if operand.is_ordered() {
        vec![
            BinOp::Eq,
            BinOp::Ne,
            BinOp::Lt,
            BinOp::Le,
            BinOp::Gt,
            BinOp::Ge,
        ]
    } else {
        vec![BinOp::Eq, BinOp::Ne]
    }
}

fn arith_ops(operand: &Type) -> Vec<BinOp> {
    match operand {
        Type::Int => vec![BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod],
        Type::Real => vec![BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div],
        _ => Vec::new(),
    }
}

fn nudged(e: &Expr) -> [Expr; 2] {
    [
        Expr::binary(BinOp::Add, e.clone(), Expr::int(1)),
        Expr::binary(BinOp::Sub, e.clone(), Expr::int(1)),
    ]
}

fn index_node(base: Expr, index: Expr, upper: Option<Expr>, ty: &Type) -> Expr {
    Expr::new(
        ExprKind::Index {
            base: Box::new(base),
            index: Box::new(index),
            upper: upper.map(Box::new),
        },
        ty.clone(),
    )
}

// Rewrapped nodes keep the original position so line-based lookups still resolve.
fn rebuilt(original: &Expr, e: Expr) -> Expr {
    e.at(original.pos)
}
