use mutspec_ast::{Expr, format_expr};

/// A candidate specification body and the composition depth it was built at.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionCandidate {
    pub expr: Expr,
    pub depth: usize,
}

impl ExpressionCandidate {
    pub fn new(expr: Expr, depth: usize) -> Self {
        Self { expr, depth }
    }

    pub fn atom(expr: Expr) -> Self {
        Self::new(expr, 1)
    }

    /// Conjunction of two candidates; depth is the larger of the two.
    pub fn conjoin(&self, other: &ExpressionCandidate) -> Self {
        Self::new(
            Expr::and(self.expr.clone(), other.expr.clone()),
            self.depth.max(other.depth),
        )
    }

    pub fn text(&self) -> String {
        format_expr(&self.expr)
    }
}
