use crate::{
    BinOp, Datatype, Expr, ExprKind, FnKind, Function, Literal, Param, Program, QuantKind, Type,
    UnaryOp,
};

const INDENT: &str = "  ";

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    let mut first = true;
    for dt in &program.datatypes {
        if !first {
            out.push('\n');
        }
        first = false;
        fmt_datatype(&mut out, dt);
    }
    for f in &program.functions {
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(&format_function(f));
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr, Prec::Lowest);
    out
}

pub fn format_type(ty: &Type) -> String {
    let mut out = String::new();
    fmt_type(&mut out, ty);
    out
}

/// `a: int, b: seq<T>` parameter list, without the surrounding parentheses.
pub fn format_params(params: &[Param]) -> String {
    let mut out = String::new();
    fmt_params(&mut out, params);
    out
}

pub fn format_function(f: &Function) -> String {
    let mut out = String::new();
    out.push_str(match f.kind {
        FnKind::Function => "function ",
        FnKind::Predicate => "predicate ",
        FnKind::Lemma => "lemma ",
        FnKind::Method => "method ",
    });
    out.push_str(&f.name);
    if !f.type_params.is_empty() {
        out.push('<');
        out.push_str(&f.type_params.join(", "));
        out.push('>');
    }
    out.push('(');
    fmt_params(&mut out, &f.params);
    out.push(')');
    if f.kind == FnKind::Function {
        out.push_str(": ");
        fmt_type(&mut out, &f.result);
    }
    out.push('\n');
    for r in &f.requires {
        out.push_str(INDENT);
        out.push_str("requires ");
        fmt_expr(&mut out, r, Prec::Lowest);
        out.push('\n');
    }
    for e in &f.ensures {
        out.push_str(INDENT);
        out.push_str("ensures ");
        fmt_expr(&mut out, e, Prec::Lowest);
        out.push('\n');
    }
    match (&f.body, &f.proof) {
        (Some(body), _) => {
            out.push_str("{\n");
            out.push_str(INDENT);
            fmt_expr(&mut out, body, Prec::Lowest);
            out.push_str("\n}\n");
        }
        (None, Some(proof)) => {
            out.push_str("{\n");
            out.push_str(proof.trim_end());
            out.push_str("\n}\n");
        }
        (None, None) => out.push_str("{}\n"),
    }
    out
}

fn fmt_params(out: &mut String, params: &[Param]) {
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&p.name);
        out.push_str(": ");
        fmt_type(out, &p.ty);
    }
}

fn fmt_datatype(out: &mut String, dt: &Datatype) {
    out.push_str("datatype ");
    out.push_str(&dt.name);
    if !dt.type_params.is_empty() {
        out.push('<');
        out.push_str(&dt.type_params.join(", "));
        out.push('>');
    }
    out.push_str(" = ");
    for (i, c) in dt.ctors.iter().enumerate() {
        if i > 0 {
            out.push_str(" | ");
        }
        out.push_str(&c.name);
        if !c.fields.is_empty() {
            out.push('(');
            fmt_params(out, &c.fields);
            out.push(')');
        }
    }
    out.push('\n');
}

fn fmt_type(out: &mut String, ty: &Type) {
    match ty {
        Type::Bool => out.push_str("bool"),
        Type::Int => out.push_str("int"),
        Type::Real => out.push_str("real"),
        Type::Char => out.push_str("char"),
        Type::String => out.push_str("string"),
        Type::Seq { elem } => fmt_applied(out, "seq", std::slice::from_ref(elem.as_ref())),
        Type::Set { elem } => fmt_applied(out, "set", std::slice::from_ref(elem.as_ref())),
        Type::Multiset { elem } => {
            fmt_applied(out, "multiset", std::slice::from_ref(elem.as_ref()))
        }
        Type::Map { key, value } => {
            out.push_str("map<");
            fmt_type(out, key);
            out.push_str(", ");
            fmt_type(out, value);
            out.push('>');
        }
        Type::Named { name, args } => fmt_applied(out, name, args),
        Type::Param { name } => out.push_str(name),
        Type::Unknown => out.push_str("<unknown>"),
    }
}

fn fmt_applied(out: &mut String, name: &str, args: &[Type]) {
    out.push_str(name);
    if args.is_empty() {
        return;
    }
    out.push('<');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_type(out, a);
    }
    out.push('>');
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Iff,
    Implies,
    Or,
    And,
    Cmp,
    Add,
    Mul,
    Unary,
    Postfix,
    Primary,
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::Iff => Prec::Iff,
        BinOp::Implies => Prec::Implies,
        BinOp::Or => Prec::Or,
        BinOp::And => Prec::And,
        BinOp::Eq
        | BinOp::Ne
        | BinOp::Lt
        | BinOp::Le
        | BinOp::Gt
        | BinOp::Ge
        | BinOp::In
        | BinOp::NotIn => Prec::Cmp,
        BinOp::Add | BinOp::Sub => Prec::Add,
        BinOp::Mul | BinOp::Div | BinOp::Mod => Prec::Mul,
    }
}

fn expr_prec(expr: &Expr) -> Prec {
    match &expr.kind {
        ExprKind::Lit {
            value: Literal::Int(n),
        } if *n < 0 => Prec::Unary,
        ExprKind::Lit { .. } | ExprKind::Var { .. } => Prec::Primary,
        ExprKind::Unary {
            op: UnaryOp::Card | UnaryOp::Old,
            ..
        } => Prec::Primary,
        ExprKind::Unary { .. } => Prec::Unary,
        ExprKind::Binary { op, .. } => bin_prec(*op),
        ExprKind::Field { .. }
        | ExprKind::IsCtor { .. }
        | ExprKind::Call { .. }
        | ExprKind::Index { .. } => Prec::Postfix,
        ExprKind::Ite { .. }
        | ExprKind::Match { .. }
        | ExprKind::Let { .. }
        | ExprKind::Quant { .. } => Prec::Lowest,
    }
}

fn needs_parens(parent: Prec, child: Prec) -> bool {
    child < parent
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

// Same-precedence chains print bare only where re-parsing gives the same tree.
fn chains_without_parens(parent: BinOp, child: BinOp, side: Side) -> bool {
    match side {
        Side::Left => match parent {
            BinOp::And | BinOp::Or => child == parent,
            BinOp::Add | BinOp::Sub => matches!(child, BinOp::Add | BinOp::Sub),
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                matches!(child, BinOp::Mul | BinOp::Div | BinOp::Mod)
            }
            _ => false,
        },
        Side::Right => match parent {
            BinOp::And | BinOp::Or | BinOp::Add | BinOp::Mul | BinOp::Implies => child == parent,
            _ => false,
        },
    }
}

fn fmt_operand(out: &mut String, child: &Expr, parent_op: BinOp, side: Side) {
    let my = bin_prec(parent_op);
    let cp = expr_prec(child);
    let wrap = needs_parens(my, cp)
        || match &child.kind {
            ExprKind::Binary { op, .. } if cp == my => !chains_without_parens(parent_op, *op, side),
            // `&&` and `||` never mix without parentheses.
            ExprKind::Binary { op, .. } => {
                matches!(parent_op, BinOp::And | BinOp::Or)
                    && matches!(op, BinOp::And | BinOp::Or)
                    && *op != parent_op
            }
            _ => false,
        };
    if wrap {
        out.push('(');
        fmt_expr(out, child, Prec::Lowest);
        out.push(')');
    } else {
        fmt_expr(out, child, my);
    }
}

fn fmt_expr(out: &mut String, expr: &Expr, parent_prec: Prec) {
    let my = expr_prec(expr);
    let parens = needs_parens(parent_prec, my);
    if parens {
        out.push('(');
    }
    match &expr.kind {
        ExprKind::Lit { value } => fmt_literal(out, value),
        ExprKind::Var { name } => out.push_str(name),
        ExprKind::Field { base, field } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('.');
            out.push_str(field);
        }
        ExprKind::IsCtor { base, ctor } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('.');
            out.push_str(ctor);
            out.push('?');
        }
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Card => {
                out.push('|');
                fmt_expr(out, operand, Prec::Lowest);
                out.push('|');
            }
            UnaryOp::Not => {
                out.push('!');
                fmt_expr(out, operand, Prec::Unary);
            }
            UnaryOp::Neg => {
                out.push('-');
                fmt_expr(out, operand, Prec::Unary);
            }
            UnaryOp::Old => {
                out.push_str("old(");
                fmt_expr(out, operand, Prec::Lowest);
                out.push(')');
            }
        },
        ExprKind::Binary { op, left, right } => {
            fmt_operand(out, left, *op, Side::Left);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_operand(out, right, *op, Side::Right);
        }
        ExprKind::Ite { test, then, els } => {
            out.push_str("if ");
            fmt_expr(out, test, Prec::Lowest);
            out.push_str(" then ");
            fmt_expr(out, then, Prec::Lowest);
            out.push_str(" else ");
            fmt_expr(out, els, Prec::Lowest);
        }
        ExprKind::Match { scrutinee, cases } => {
            out.push_str("match ");
            fmt_expr(out, scrutinee, Prec::Postfix);
            out.push_str(" {");
            for c in cases {
                out.push_str(" case ");
                out.push_str(&c.ctor);
                if !c.binders.is_empty() {
                    out.push('(');
                    out.push_str(&c.binders.join(", "));
                    out.push(')');
                }
                out.push_str(" => ");
                fmt_expr(out, &c.body, Prec::Lowest);
            }
            out.push_str(" }");
        }
        ExprKind::Let { bindings, body } => {
            for b in bindings {
                out.push_str("var ");
                out.push_str(&b.name);
                out.push_str(" := ");
                fmt_expr(out, &b.rhs, Prec::Lowest);
                out.push_str("; ");
            }
            fmt_expr(out, body, Prec::Lowest);
        }
        ExprKind::Quant {
            kind,
            bound,
            range,
            term,
        } => {
            out.push_str(match kind {
                QuantKind::Forall => "forall ",
                QuantKind::Exists => "exists ",
            });
            for (i, b) in bound.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&b.name);
                out.push_str(": ");
                fmt_type(out, &b.ty);
            }
            if let Some(r) = range {
                out.push_str(" | ");
                fmt_expr(out, r, Prec::Lowest);
            }
            out.push_str(" :: ");
            fmt_expr(out, term, Prec::Lowest);
        }
        ExprKind::Call { callee, args } => {
            out.push_str(callee);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_expr(out, a, Prec::Lowest);
            }
            out.push(')');
        }
        ExprKind::Index { base, index, upper } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('[');
            fmt_expr(out, index, Prec::Lowest);
            if let Some(u) = upper {
                out.push_str("..");
                fmt_expr(out, u, Prec::Lowest);
            }
            out.push(']');
        }
    }
    if parens {
        out.push(')');
    }
}

fn fmt_literal(out: &mut String, lit: &Literal) {
    match lit {
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(n) => out.push_str(&n.to_string()),
        Literal::Real(r) => out.push_str(r),
        Literal::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
    }
}
