//! Depth-1 argument expressions for "conjoin" mode.
//!
//! Every formal of the target is unfolded into the small terms a missing
//! conjunct is usually built from, and same-typed terms are paired into
//! equalities and comparisons.

use std::collections::{HashMap, HashSet};

use mutspec_ast::{BinOp, Expr, ExprKind, Function, Program, Type, UnaryOp, format_expr};
use tracing::debug;

use crate::candidate::ExpressionCandidate;

/// Atomic candidates, `true` first, plus negation pairs as indices into `candidates`.
#[derive(Clone, Debug, Default)]
pub struct AtomSet {
    pub candidates: Vec<ExpressionCandidate>,
    pub negations: Vec<(usize, usize)>,
}

impl AtomSet {
    fn push(&mut self, seen: &mut HashSet<String>, e: Expr) -> Option<usize> {
        if !seen.insert(format_expr(&e)) {
            return None;
        }
        self.candidates.push(ExpressionCandidate::atom(e));
        Some(self.candidates.len() - 1)
    }

    fn push_pair(&mut self, seen: &mut HashSet<String>, a: Expr, b: Expr) {
        let first = self.push(seen, a);
        let second = self.push(seen, b);
        if let (Some(x), Some(y)) = (first, second) {
            self.negations.push((x, y));
        }
    }
}

pub fn enumerate_atoms(program: &Program, func: &Function, max_expr_depth: usize) -> AtomSet {
    let mut terms: Vec<Expr> = Vec::new();
    for p in &func.params {
        traverse_formal(program, p.as_expr(), 1, max_expr_depth, &mut terms);
    }

    let mut groups: Vec<(String, Vec<Expr>)> = Vec::new();
    let mut discriminators: Vec<Expr> = Vec::new();
    let mut seen_terms: HashSet<String> = HashSet::new();
    for t in terms {
        if !seen_terms.insert(format_expr(&t)) {
            continue;
        }
        if matches!(t.kind, ExprKind::IsCtor { .. }) {
            discriminators.push(t);
            continue;
        }
        let key = t.ty.display();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(t),
            None => groups.push((key, vec![t])),
        }
    }

    let classes = func
        .body
        .as_ref()
        .map(equality_classes)
        .unwrap_or_default();
    let same_class = |a: &Expr, b: &Expr| {
        match (classes.get(&format_expr(a)), classes.get(&format_expr(b))) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    };

    let mut out = AtomSet::default();
    let mut seen: HashSet<String> = HashSet::new();
    out.push(&mut seen, Expr::bool(true));
    for (_, members) in &groups {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (a, b) = (&members[i], &members[j]);
                if (a.is_literal() && b.is_literal()) || same_class(a, b) {
                    continue;
                }
                out.push_pair(
                    &mut seen,
                    Expr::binary(BinOp::Eq, a.clone(), b.clone()),
                    Expr::binary(BinOp::Ne, a.clone(), b.clone()),
                );
                if a.ty.is_ordered() {
                    out.push_pair(
                        &mut seen,
                        Expr::binary(BinOp::Lt, a.clone(), b.clone()),
                        Expr::binary(BinOp::Ge, a.clone(), b.clone()),
                    );
                    out.push_pair(
                        &mut seen,
                        Expr::binary(BinOp::Le, a.clone(), b.clone()),
                        Expr::binary(BinOp::Gt, a.clone(), b.clone()),
                    );
                }
            }
        }
    }
    for d in discriminators {
        out.push(&mut seen, d);
    }
    debug!(
        function = %func.name,
        atoms = out.candidates.len(),
        negation_pairs = out.negations.len(),
        "enumerated argument expressions"
    );
    out
}

fn traverse_formal(program: &Program, e: Expr, depth: usize, max: usize, out: &mut Vec<Expr>) {
    let ty = e.ty.clone();
    out.push(e.clone());
    match &ty {
        Type::Bool => out.push(Expr::bool(true)),
        Type::Int => {
            out.push(Expr::int(0));
            out.push(Expr::int(1));
            if depth < max {
                out.push(Expr::binary(BinOp::Add, e.clone(), Expr::int(1)));
                out.push(Expr::binary(BinOp::Sub, e.clone(), Expr::int(1)));
            }
        }
        Type::Seq { elem } => {
            out.push(Expr::unary(UnaryOp::Card, e.clone()));
            if depth < max {
                let first = Expr::index(e.clone(), Expr::int(0), elem.as_ref().clone());
                traverse_formal(program, first, depth + 1, max, out);
            }
        }
        Type::Set { .. } | Type::Multiset { .. } | Type::Map { .. } => {
            out.push(Expr::unary(UnaryOp::Card, e.clone()));
        }
        Type::Named { .. } => {
            let Some(dt) = program.datatype_of(&ty) else {
                return;
            };
            if dt.ctors.len() > 1 {
                for c in &dt.ctors {
                    out.push(Expr::is_ctor(e.clone(), c.name.clone()));
                }
            }
            if depth < max {
                let mut fields_seen: HashSet<&str> = HashSet::new();
                for c in &dt.ctors {
                    for f in &c.fields {
                        if fields_seen.insert(f.name.as_str()) {
                            let access = Expr::field(e.clone(), f.name.clone(), f.ty.clone());
                            traverse_formal(program, access, depth + 1, max, out);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Groups printed terms that the body already equates (`a == b` conjuncts),
/// mapping each term to a class id.
pub fn equality_classes(body: &Expr) -> HashMap<String, usize> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for c in body.conjuncts() {
        if let ExprKind::Binary {
            op: BinOp::Eq,
            left,
            right,
        } = &c.kind
        {
            let (l, r) = (format_expr(left), format_expr(right));
            if l == r {
                continue;
            }
            adjacency.entry(l.clone()).or_default().push(r.clone());
            adjacency.entry(r).or_default().push(l);
        }
    }

    let mut class_of: HashMap<String, usize> = HashMap::new();
    let mut next = 0;
    let mut roots: Vec<&String> = adjacency.keys().collect();
    roots.sort();
    for root in roots {
        if class_of.contains_key(root) {
            continue;
        }
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if class_of.contains_key(&node) {
                continue;
            }
            class_of.insert(node.clone(), next);
            if let Some(neighbours) = adjacency.get(&node) {
                stack.extend(neighbours.iter().cloned());
            }
        }
        next += 1;
    }
    class_of
}

/// Every type-compatible invocation of `constraint` over the formals of `root`.
pub fn constraint_invocations(constraint: &Function, root: &Function) -> Vec<Expr> {
    let mut by_type: HashMap<String, Vec<Expr>> = HashMap::new();
    for p in &root.params {
        by_type.entry(p.ty.display()).or_default().push(p.as_expr());
    }
    let mut calls: Vec<Vec<Expr>> = vec![Vec::new()];
    for p in &constraint.params {
        let Some(options) = by_type.get(&p.ty.display()) else {
            return Vec::new();
        };
        calls = calls
            .into_iter()
            .flat_map(|prefix| {
                options.iter().map(move |o| {
                    let mut next = prefix.clone();
                    next.push(o.clone());
                    next
                })
            })
            .collect();
    }
    calls
        .into_iter()
        .map(|args| constraint.call_with(args))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutspec_ast::{Ctor, Datatype, Param};

    fn texts(set: &AtomSet) -> Vec<String> {
        set.candidates.iter().map(|c| c.text()).collect()
    }

    #[test]
    fn int_formals_pair_into_comparisons() {
        let program = Program {
            file: "a.dfy".to_string(),
            datatypes: Vec::new(),
            functions: Vec::new(),
        };
        let f = Function::predicate(
            "p",
            vec![Param::new("x", Type::Int), Param::new("y", Type::Int)],
            Expr::bool(true),
        );
        let atoms = enumerate_atoms(&program, &f, 1);
        let t = texts(&atoms);
        assert_eq!(t[0], "true");
        for expected in ["x == y", "x != y", "x < y", "x >= y", "x <= y", "x > y", "x == 0"] {
            assert!(t.contains(&expected.to_string()), "missing {expected}: {t:?}");
        }
        assert!(!t.contains(&"0 == 1".to_string()), "literal pairs are skipped");
        let eq = t.iter().position(|s| s == "x == y").expect("eq");
        let ne = t.iter().position(|s| s == "x != y").expect("ne");
        assert!(atoms.negations.contains(&(eq, ne)));
    }

    #[test]
    fn datatype_formals_add_discriminators_and_fields() {
        let program = Program {
            file: "a.dfy".to_string(),
            datatypes: vec![Datatype {
                name: "Opt".to_string(),
                type_params: Vec::new(),
                ctors: vec![
                    Ctor {
                        name: "None".to_string(),
                        fields: Vec::new(),
                    },
                    Ctor {
                        name: "Some".to_string(),
                        fields: vec![Param::new("v", Type::Int)],
                    },
                ],
            }],
            functions: Vec::new(),
        };
        let f = Function::predicate(
            "p",
            vec![Param::new("o", Type::named("Opt")), Param::new("n", Type::Int)],
            Expr::bool(true),
        );
        let t = texts(&enumerate_atoms(&program, &f, 2));
        assert!(t.contains(&"o.None?".to_string()));
        assert!(t.contains(&"o.Some?".to_string()));
        assert!(t.contains(&"o.v == n".to_string()));
    }

    #[test]
    fn already_equal_terms_are_not_paired() {
        let program = Program {
            file: "a.dfy".to_string(),
            datatypes: Vec::new(),
            functions: Vec::new(),
        };
        let x = Expr::var("x", Type::Int);
        let y = Expr::var("y", Type::Int);
        let f = Function::predicate(
            "p",
            vec![Param::new("x", Type::Int), Param::new("y", Type::Int)],
            Expr::binary(BinOp::Eq, x, y),
        );
        let t = texts(&enumerate_atoms(&program, &f, 1));
        assert!(!t.contains(&"x == y".to_string()));
        assert!(!t.contains(&"x < y".to_string()));
        assert!(t.contains(&"x == 0".to_string()));
    }

    #[test]
    fn equality_classes_are_transitive() {
        let v = |n: &str| Expr::var(n, Type::Int);
        let body = Expr::and(
            Expr::binary(BinOp::Eq, v("a"), v("b")),
            Expr::and(
                Expr::binary(BinOp::Eq, v("b"), v("c")),
                Expr::binary(BinOp::Eq, v("d"), v("e")),
            ),
        );
        let classes = equality_classes(&body);
        assert_eq!(classes["a"], classes["c"]);
        assert_ne!(classes["a"], classes["d"]);
    }

    #[test]
    fn constraint_invocations_cover_type_compatible_arguments() {
        let root = Function::predicate(
            "root",
            vec![
                Param::new("a", Type::Int),
                Param::new("b", Type::Int),
                Param::new("s", Type::seq(Type::Int)),
            ],
            Expr::bool(true),
        );
        let constraint = Function::predicate(
            "valid",
            vec![Param::new("n", Type::Int)],
            Expr::bool(true),
        );
        let calls: Vec<String> = constraint_invocations(&constraint, &root)
            .iter()
            .map(format_expr)
            .collect();
        assert_eq!(calls, vec!["valid(a)", "valid(b)"]);
    }
}
