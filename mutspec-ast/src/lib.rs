#![forbid(unsafe_code)]

mod fmt;

pub use fmt::{format_expr, format_function, format_params, format_program, format_type};

use serde::{Deserialize, Serialize};

/// Source position of a node, 1-based line and column as reported by the resolver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Type {
    Bool,
    Int,
    Real,
    Char,
    String,
    Seq { elem: Box<Type> },
    Set { elem: Box<Type> },
    Multiset { elem: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    // Nominal datatype with type arguments (e.g. `List<int>`).
    Named {
        name: String,
        #[serde(default)]
        args: Vec<Type>,
    },
    Param { name: String },
    Unknown,
}

impl Type {
    pub fn seq(elem: Type) -> Self {
        Type::Seq {
            elem: Box::new(elem),
        }
    }

    pub fn set(elem: Type) -> Self {
        Type::Set {
            elem: Box::new(elem),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Type::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }

    /// Types that admit `<`, `<=`, `>`, `>=` as total orders.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Type::Int | Type::Real | Type::Char)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Real)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Type::Seq { .. } | Type::Set { .. } | Type::Multiset { .. } | Type::Map { .. }
        )
    }

    pub fn display(&self) -> String {
        format_type(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "lit", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Bool(bool),
    Int(i64),
    // Kept textual so decimal literals survive printing unchanged.
    Real(String),
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    /// Cardinality `|e|`.
    Card,
    /// Pre-state value `old(e)` in a postcondition.
    Old,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    And,
    Or,
    Iff,
    Implies,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Iff | BinOp::Implies)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_membership(self) -> bool {
        matches!(self, BinOp::In | BinOp::NotIn)
    }

    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    /// Whether the operator yields `bool` regardless of operand type.
    pub fn yields_bool(self) -> bool {
        self.is_logical() || self.is_relational() || self.is_membership()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Iff => "<==>",
            BinOp::Implies => "==>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "!in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantKind {
    Forall,
    Exists,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundVar {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LetBinding {
    pub name: String,
    pub rhs: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchCase {
    pub ctor: String,
    #[serde(default)]
    pub binders: Vec<String>,
    pub body: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub pos: Pos,
    pub ty: Type,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ExprKind {
    Lit {
        value: Literal,
    },
    Var {
        name: String,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    /// Datatype discriminator `base.Ctor?`.
    IsCtor {
        base: Box<Expr>,
        ctor: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ite {
        test: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },
    Quant {
        kind: QuantKind,
        bound: Vec<BoundVar>,
        #[serde(default)]
        range: Option<Box<Expr>>,
        term: Box<Expr>,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// `base[index]`, or the slice `base[index..upper]` when `upper` is present.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        #[serde(default)]
        upper: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self {
            pos: Pos::default(),
            ty,
            kind,
        }
    }

    pub fn at(mut self, pos: Pos) -> Self {
        self.pos = pos;
        self
    }

    pub fn bool(value: bool) -> Self {
        Expr::new(
            ExprKind::Lit {
                value: Literal::Bool(value),
            },
            Type::Bool,
        )
    }

    pub fn int(value: i64) -> Self {
        Expr::new(
            ExprKind::Lit {
                value: Literal::Int(value),
            },
            Type::Int,
        )
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Expr::new(ExprKind::Var { name: name.into() }, ty)
    }

    pub fn field(base: Expr, field: impl Into<String>, ty: Type) -> Self {
        Expr::new(
            ExprKind::Field {
                base: Box::new(base),
                field: field.into(),
            },
            ty,
        )
    }

    pub fn is_ctor(base: Expr, ctor: impl Into<String>) -> Self {
        Expr::new(
            ExprKind::IsCtor {
                base: Box::new(base),
                ctor: ctor.into(),
            },
            Type::Bool,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg => operand.ty.clone(),
            UnaryOp::Card => Type::Int,
            UnaryOp::Old => operand.ty.clone(),
        };
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    /// Builds `left op right`, deriving the result type from the operator.
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        let ty = if op.yields_bool() {
            Type::Bool
        } else {
            left.ty.clone()
        };
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Or, left, right)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand)
    }

    /// Logical negation that cancels an existing `!` instead of stacking another.
    pub fn negate(self) -> Self {
        match self.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            kind => Expr::not(Expr {
                pos: self.pos,
                ty: self.ty,
                kind,
            }),
        }
    }

    pub fn ite(test: Expr, then: Expr, els: Expr) -> Self {
        let ty = then.ty.clone();
        Expr::new(
            ExprKind::Ite {
                test: Box::new(test),
                then: Box::new(then),
                els: Box::new(els),
            },
            ty,
        )
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>, ty: Type) -> Self {
        Expr::new(
            ExprKind::Call {
                callee: callee.into(),
                args,
            },
            ty,
        )
    }

    pub fn index(base: Expr, index: Expr, ty: Type) -> Self {
        Expr::new(
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
                upper: None,
            },
            ty,
        )
    }

    pub fn let_in(bindings: Vec<LetBinding>, body: Expr) -> Self {
        let ty = body.ty.clone();
        Expr::new(
            ExprKind::Let {
                bindings,
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn quant(kind: QuantKind, bound: Vec<BoundVar>, range: Option<Expr>, term: Expr) -> Self {
        Expr::new(
            ExprKind::Quant {
                kind,
                bound,
                range: range.map(Box::new),
                term: Box::new(term),
            },
            Type::Bool,
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Lit { .. })
    }

    pub fn is_true(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Lit {
                value: Literal::Bool(true)
            }
        )
    }

    /// Top-level conjuncts, flattening nested `&&` left to right.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        collect_conjuncts(self, &mut out);
        out
    }

    /// Re-joins conjuncts with `&&`; an empty list yields `true`.
    pub fn conjoin(parts: Vec<Expr>) -> Expr {
        let mut iter = parts.into_iter();
        match iter.next() {
            None => Expr::bool(true),
            Some(first) => iter.fold(first, Expr::and),
        }
    }

    pub fn has_cardinality(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(
                e.kind,
                ExprKind::Unary {
                    op: UnaryOp::Card,
                    ..
                }
            ) {
                found = true;
            }
        });
        found
    }

    /// Immediate sub-expressions in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Lit { .. } | ExprKind::Var { .. } => Vec::new(),
            ExprKind::Field { base, .. } | ExprKind::IsCtor { base, .. } => vec![base],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Ite { test, then, els } => vec![test, then, els],
            ExprKind::Match { scrutinee, cases } => {
                let mut out: Vec<&Expr> = vec![scrutinee];
                out.extend(cases.iter().map(|c| &c.body));
                out
            }
            ExprKind::Let { bindings, body } => {
                let mut out: Vec<&Expr> = bindings.iter().map(|b| &b.rhs).collect();
                out.push(body);
                out
            }
            ExprKind::Quant { range, term, .. } => {
                let mut out: Vec<&Expr> = Vec::new();
                if let Some(r) = range {
                    out.push(r);
                }
                out.push(term);
                out
            }
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::Index { base, index, upper } => {
                let mut out: Vec<&Expr> = vec![base, index];
                if let Some(u) = upper {
                    out.push(u);
                }
                out
            }
        }
    }

    /// A copy of this node with every immediate sub-expression replaced by `f(child)`.
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        let kind = match &self.kind {
            ExprKind::Lit { .. } | ExprKind::Var { .. } => self.kind.clone(),
            ExprKind::Field { base, field } => ExprKind::Field {
                base: Box::new(f(base)),
                field: field.clone(),
            },
            ExprKind::IsCtor { base, ctor } => ExprKind::IsCtor {
                base: Box::new(f(base)),
                ctor: ctor.clone(),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(f(operand)),
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: Box::new(f(left)),
                right: Box::new(f(right)),
            },
            ExprKind::Ite { test, then, els } => ExprKind::Ite {
                test: Box::new(f(test)),
                then: Box::new(f(then)),
                els: Box::new(f(els)),
            },
            ExprKind::Match { scrutinee, cases } => ExprKind::Match {
                scrutinee: Box::new(f(scrutinee)),
                cases: cases
                    .iter()
                    .map(|c| MatchCase {
                        ctor: c.ctor.clone(),
                        binders: c.binders.clone(),
                        body: f(&c.body),
                    })
                    .collect(),
            },
            ExprKind::Let { bindings, body } => ExprKind::Let {
                bindings: bindings
                    .iter()
                    .map(|b| LetBinding {
                        name: b.name.clone(),
                        rhs: f(&b.rhs),
                    })
                    .collect(),
                body: Box::new(f(body)),
            },
            ExprKind::Quant {
                kind,
                bound,
                range,
                term,
            } => ExprKind::Quant {
                kind: *kind,
                bound: bound.clone(),
                range: range.as_ref().map(|r| Box::new(f(r))),
                term: Box::new(f(term)),
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: callee.clone(),
                args: args.iter().map(|a| f(a)).collect(),
            },
            ExprKind::Index { base, index, upper } => ExprKind::Index {
                base: Box::new(f(base)),
                index: Box::new(f(index)),
                upper: upper.as_ref().map(|u| Box::new(f(u))),
            },
        };
        Expr {
            pos: self.pos,
            ty: self.ty.clone(),
            kind,
        }
    }

    /// Pre-order visit of this node and every descendant.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match &expr.kind {
        ExprKind::Binary {
            op: BinOp::And,
            left,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        _ => out.push(expr),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn as_expr(&self) -> Expr {
        Expr::var(self.name.clone(), self.ty.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FnKind {
    Function,
    Predicate,
    Lemma,
    /// Imperative method; only its contract is ever rewritten.
    Method,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub kind: FnKind,
    #[serde(default)]
    pub pos: Pos,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "default_result")]
    pub result: Type,
    #[serde(default)]
    pub requires: Vec<Expr>,
    #[serde(default)]
    pub ensures: Vec<Expr>,
    #[serde(default)]
    pub body: Option<Expr>,
    /// Verbatim statement body of a lemma; emitted unchanged.
    #[serde(default)]
    pub proof: Option<String>,
}

fn default_result() -> Type {
    Type::Bool
}

impl Function {
    pub fn predicate(name: impl Into<String>, params: Vec<Param>, body: Expr) -> Self {
        Self {
            name: name.into(),
            kind: FnKind::Predicate,
            pos: Pos::default(),
            type_params: Vec::new(),
            params,
            result: Type::Bool,
            requires: Vec::new(),
            ensures: Vec::new(),
            body: Some(body),
            proof: None,
        }
    }

    /// `name(p1, p2, ...)` applied to this function's own formals.
    pub fn self_call(&self) -> Expr {
        self.call_with(self.params.iter().map(Param::as_expr).collect())
    }

    pub fn call_with(&self, args: Vec<Expr>) -> Expr {
        Expr::call(self.name.clone(), args, self.result.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ctor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Param>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub ctors: Vec<Ctor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// File name the verifier reports diagnostics against.
    pub file: String,
    #[serde(default)]
    pub datatypes: Vec<Datatype>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn datatype(&self, name: &str) -> Option<&Datatype> {
        self.datatypes.iter().find(|d| d.name == name)
    }

    /// Datatype declaration behind a `Named` type, if the program declares one.
    pub fn datatype_of(&self, ty: &Type) -> Option<&Datatype> {
        match ty {
            Type::Named { name, .. } => self.datatype(name),
            _ => None,
        }
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }
}
