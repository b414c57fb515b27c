use mutspec_ast::Expr;

use crate::error::SearchError;

/// `file:line`: drop the conjunct covering `line` from the target body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveDirective {
    pub file: String,
    pub line: u32,
}

impl RemoveDirective {
    /// Whether the directive names `file`, comparing base names so that a
    /// directive written against a relative path still matches.
    pub fn applies_to(&self, file: &str) -> bool {
        base_name(&self.file) == base_name(file)
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

pub fn parse_remove_directives(text: &str) -> Result<Vec<RemoveDirective>, SearchError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let bad = || SearchError::BadRemoveDirective {
                directive: item.to_string(),
            };
            let (file, line) = item.rsplit_once(':').ok_or_else(bad)?;
            let line: u32 = line.trim().parse().map_err(|_| bad())?;
            if file.is_empty() {
                return Err(bad());
            }
            Ok(RemoveDirective {
                file: file.to_string(),
                line,
            })
        })
        .collect()
}

/// First source line touched by `e`, ignoring synthesized nodes without a position.
fn start_line(e: &Expr) -> Option<u32> {
    let mut first: Option<u32> = None;
    e.walk(&mut |n| {
        if n.pos.line > 0 {
            first = Some(first.map_or(n.pos.line, |f| f.min(n.pos.line)));
        }
    });
    first
}

/// Removes the last top-level conjunct starting at or before `line`.
/// Returns `None` when no conjunct qualifies.
pub fn erase_conjunct(body: &Expr, line: u32) -> Option<Expr> {
    let parts = body.conjuncts();
    let victim = parts
        .iter()
        .rposition(|c| start_line(c).is_some_and(|l| l <= line))?;
    let kept: Vec<Expr> = parts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != victim)
        .map(|(_, c)| c.clone())
        .collect();
    Some(Expr::conjoin(kept))
}
