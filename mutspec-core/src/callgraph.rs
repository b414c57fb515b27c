use std::collections::{BTreeMap, HashSet, VecDeque};

use mutspec_ast::{Expr, ExprKind, LetBinding, Program, QuantKind, format_expr};
use tracing::debug;

use crate::error::SearchError;

/// One call site: `caller` invokes `callee` through `call`, reached under `cond`.
#[derive(Clone, Debug, PartialEq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub call: Expr,
    pub cond: Option<Expr>,
}

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    pub root: String,
    edges: Vec<CallEdge>,
    outgoing: BTreeMap<String, Vec<usize>>,
}

impl CallGraph {
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn outgoing(&self, caller: &str) -> impl Iterator<Item = &CallEdge> {
        self.outgoing
            .get(caller)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    fn add(&mut self, edge: CallEdge) {
        self.outgoing
            .entry(edge.caller.clone())
            .or_default()
            .push(self.edges.len());
        self.edges.push(edge);
    }
}

/// One hop of a call chain. The first step of a path has no call or condition.
#[derive(Clone, Debug, PartialEq)]
pub struct PathStep {
    pub decl: String,
    pub call: Option<Expr>,
    pub cond: Option<Expr>,
}

pub type CallPath = Vec<PathStep>;

/// Breadth-first walk from `root`'s body recording every call together with the
/// condition accumulated on the way to it.
pub fn build_call_graph(program: &Program, root: &str) -> Result<CallGraph, SearchError> {
    let root_fn = program
        .function(root)
        .ok_or_else(|| SearchError::unknown_function(root, program.function_names()))?;

    let mut graph = CallGraph {
        root: root.to_string(),
        ..CallGraph::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(Expr, Option<Expr>, String)> = VecDeque::new();
    if let Some(body) = &root_fn.body {
        queue.push_back((body.clone(), None, root.to_string()));
    }

    while let Some((expr, cond, owner)) = queue.pop_front() {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                if let Some(target) = program.function(callee) {
                    let key = format!(
                        "{owner} -> {callee} -> {}",
                        cond.as_ref().map(format_expr).unwrap_or_else(|| "NULL".to_string())
                    );
                    if callee != &owner && seen.insert(key) {
                        graph.add(CallEdge {
                            caller: owner.clone(),
                            callee: callee.clone(),
                            call: expr.clone(),
                            cond: cond.clone(),
                        });
                        if let Some(body) = &target.body {
                            queue.push_back((body.clone(), None, callee.clone()));
                        }
                    }
                }
                for a in args {
                    queue.push_back((a.clone(), cond.clone(), owner.clone()));
                }
            }
            ExprKind::Ite { test, then, els } => {
                queue.push_back((test.as_ref().clone(), cond.clone(), owner.clone()));
                let taken = extend_cond(cond.clone(), test.as_ref().clone());
                let skipped = extend_cond(cond, test.as_ref().clone().negate());
                queue.push_back((then.as_ref().clone(), Some(taken), owner.clone()));
                queue.push_back((els.as_ref().clone(), Some(skipped), owner));
            }
            ExprKind::Match { scrutinee, cases } => {
                queue.push_back((scrutinee.as_ref().clone(), cond.clone(), owner.clone()));
                for case in cases {
                    let mut case_cond = extend_cond(
                        cond.clone(),
                        Expr::is_ctor(scrutinee.as_ref().clone(), case.ctor.clone()),
                    );
                    let bindings = case_bindings(program, scrutinee, &case.ctor, &case.binders);
                    if !bindings.is_empty() {
                        case_cond = wrap_let(Some(case_cond), bindings);
                    }
                    queue.push_back((case.body.clone(), Some(case_cond), owner.clone()));
                }
            }
            ExprKind::Let { bindings, body } => {
                for b in bindings {
                    queue.push_back((b.rhs.clone(), cond.clone(), owner.clone()));
                }
                let inner = wrap_let(cond, bindings.clone());
                queue.push_back((body.as_ref().clone(), Some(inner), owner));
            }
            ExprKind::Quant {
                bound, range, term, ..
            } => {
                let mut inner = cond.clone().unwrap_or_else(|| Expr::bool(true));
                if let Some(r) = range {
                    inner = and_cond(inner, r.as_ref().clone());
                }
                let wrapped = Expr::quant(QuantKind::Exists, bound.clone(), None, inner);
                if let Some(r) = range {
                    queue.push_back((r.as_ref().clone(), cond.clone(), owner.clone()));
                }
                queue.push_back((term.as_ref().clone(), Some(wrapped), owner));
            }
            _ => {
                for child in expr.children() {
                    queue.push_back((child.clone(), cond.clone(), owner.clone()));
                }
            }
        }
    }
    debug!(root, edges = graph.edges.len(), "built call graph");
    Ok(graph)
}

fn and_cond(cond: Expr, extra: Expr) -> Expr {
    if cond.is_true() {
        extra
    } else {
        Expr::and(cond, extra)
    }
}

/// Adds `extra` to an accumulated condition. Conditions that already carry
/// binders (a let or an existential wrapper) take it inside their scope.
fn extend_cond(cond: Option<Expr>, extra: Expr) -> Expr {
    let Some(cond) = cond else {
        return extra;
    };
    let pos = cond.pos;
    match cond.kind {
        ExprKind::Let { bindings, body } => Expr::let_in(bindings, and_cond(*body, extra)).at(pos),
        ExprKind::Quant {
            kind,
            bound,
            range,
            term,
        } => Expr::quant(kind, bound, range.map(|r| *r), and_cond(*term, extra)).at(pos),
        kind => Expr::and(
            Expr {
                pos,
                ty: cond.ty,
                kind,
            },
            extra,
        ),
    }
}

/// `var x := rhs; <cond or true>`, flattening into an enclosing let.
fn wrap_let(cond: Option<Expr>, bindings: Vec<LetBinding>) -> Expr {
    match cond {
        Some(Expr {
            kind:
                ExprKind::Let {
                    bindings: outer,
                    body,
                },
            ..
        }) => {
            let mut all = outer;
            all.extend(bindings);
            Expr::let_in(all, *body)
        }
        Some(c) => Expr::let_in(bindings, c),
        None => Expr::let_in(bindings, Expr::bool(true)),
    }
}

fn case_bindings(
    program: &Program,
    scrutinee: &Expr,
    ctor: &str,
    binders: &[String],
) -> Vec<LetBinding> {
    let Some(dt) = program.datatype_of(&scrutinee.ty) else {
        return Vec::new();
    };
    let Some(c) = dt.ctors.iter().find(|c| c.name == ctor) else {
        return Vec::new();
    };
    binders
        .iter()
        .zip(&c.fields)
        .filter(|(name, _)| name.as_str() != "_")
        .map(|(name, field)| LetBinding {
            name: name.clone(),
            rhs: Expr::field(scrutinee.clone(), field.name.clone(), field.ty.clone()),
        })
        .collect()
}

/// Every simple path from `source` to `dest`, depth first. When none exists the
/// single trivial path `[source]` is returned.
pub fn enumerate_paths(graph: &CallGraph, source: &str, dest: &str) -> Vec<CallPath> {
    let mut paths = Vec::new();
    let mut current: CallPath = vec![PathStep {
        decl: source.to_string(),
        call: None,
        cond: None,
    }];
    if source != dest {
        let mut on_path: HashSet<String> = HashSet::from([source.to_string()]);
        dfs(graph, source, dest, &mut current, &mut on_path, &mut paths);
    }
    if paths.is_empty() {
        paths.push(current);
    }
    paths
}

fn dfs(
    graph: &CallGraph,
    at: &str,
    dest: &str,
    current: &mut CallPath,
    on_path: &mut HashSet<String>,
    paths: &mut Vec<CallPath>,
) {
    for edge in graph.outgoing(at) {
        if on_path.contains(&edge.callee) {
            continue;
        }
        current.push(PathStep {
            decl: edge.callee.clone(),
            call: Some(edge.call.clone()),
            cond: edge.cond.clone(),
        });
        if edge.callee == dest {
            paths.push(current.clone());
        } else {
            on_path.insert(edge.callee.clone());
            dfs(graph, &edge.callee, dest, current, on_path, paths);
            on_path.remove(&edge.callee);
        }
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutspec_ast::{BinOp, Ctor, Datatype, Function, MatchCase, Param, Type};

    fn x() -> Expr {
        Expr::var("x", Type::Int)
    }

    fn pred(name: &str, body: Expr) -> Function {
        Function::predicate(name, vec![Param::new("x", Type::Int)], body)
    }

    fn call(name: &str) -> Expr {
        Expr::call(name, vec![x()], Type::Bool)
    }

    fn program(functions: Vec<Function>) -> Program {
        Program {
            file: "g.dfy".to_string(),
            datatypes: Vec::new(),
            functions,
        }
    }

    #[test]
    fn conditional_calls_carry_branch_conditions() {
        let test = Expr::binary(BinOp::Gt, x(), Expr::int(0));
        let root = pred("root", Expr::ite(test, call("a"), call("b")));
        let p = program(vec![root, pred("a", Expr::bool(true)), pred("b", call("a"))]);
        let g = build_call_graph(&p, "root").expect("graph");
        let conds: Vec<(String, String, Option<String>)> = g
            .edges()
            .iter()
            .map(|e| {
                (
                    e.caller.clone(),
                    e.callee.clone(),
                    e.cond.as_ref().map(format_expr),
                )
            })
            .collect();
        assert_eq!(
            conds,
            vec![
                ("root".to_string(), "a".to_string(), Some("x > 0".to_string())),
                ("root".to_string(), "b".to_string(), Some("!(x > 0)".to_string())),
                ("b".to_string(), "a".to_string(), None),
            ]
        );
    }

    #[test]
    fn duplicate_and_self_edges_are_suppressed() {
        let root = pred("root", Expr::and(call("a"), Expr::and(call("a"), call("root"))));
        let p = program(vec![root, pred("a", Expr::bool(true))]);
        let g = build_call_graph(&p, "root").expect("graph");
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn match_cases_bind_fields_and_test_constructor() {
        let opt = Type::named("Opt");
        let o = Expr::var("o", opt.clone());
        let m = Expr::new(
            ExprKind::Match {
                scrutinee: Box::new(o),
                cases: vec![
                    MatchCase {
                        ctor: "None".to_string(),
                        binders: Vec::new(),
                        body: Expr::bool(false),
                    },
                    MatchCase {
                        ctor: "Some".to_string(),
                        binders: vec!["v".to_string()],
                        body: Expr::call("a", vec![Expr::var("v", Type::Int)], Type::Bool),
                    },
                ],
            },
            Type::Bool,
        );
        let root = Function::predicate("root", vec![Param::new("o", opt)], m);
        let p = Program {
            file: "g.dfy".to_string(),
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
                        fields: vec![Param::new("val", Type::Int)],
                    },
                ],
            }],
            functions: vec![root, pred("a", Expr::bool(true))],
        };
        let g = build_call_graph(&p, "root").expect("graph");
        let cond = g.edges()[0].cond.as_ref().map(format_expr);
        assert_eq!(cond.as_deref(), Some("var v := o.val; o.Some?"));
    }

    #[test]
    fn paths_follow_every_route_and_fall_back_to_trivial() {
        let test = Expr::binary(BinOp::Gt, x(), Expr::int(0));
        let root = pred("root", Expr::ite(test, call("a"), call("b")));
        let p = program(vec![root, pred("a", call("c")), pred("b", call("c")), pred("c", Expr::bool(true))]);
        let g = build_call_graph(&p, "root").expect("graph");
        let paths = enumerate_paths(&g, "root", "c");
        let names: Vec<Vec<String>> = paths
            .iter()
            .map(|p| p.iter().map(|s| s.decl.clone()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["root".to_string(), "a".to_string(), "c".to_string()],
                vec!["root".to_string(), "b".to_string(), "c".to_string()],
            ]
        );

        let none = enumerate_paths(&g, "c", "root");
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].len(), 1);
        assert!(none[0][0].call.is_none());
    }

    #[test]
    fn unknown_root_is_an_error() {
        let p = program(vec![pred("a", Expr::bool(true))]);
        assert!(matches!(
            build_call_graph(&p, "nope"),
            Err(SearchError::UnknownFunction { .. })
        ));
    }
}
