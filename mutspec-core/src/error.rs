use miette::Diagnostic;
use thiserror::Error;

/// Configuration and input errors that stop a run before any job is submitted.
#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("couldn't find function {name}")]
    #[diagnostic(
        code(mutspec::unknown_function),
        help("known functions: {}", known.join(", "))
    )]
    UnknownFunction { name: String, known: Vec<String> },

    #[error("constraint function {name} not found")]
    #[diagnostic(code(mutspec::constraint))]
    MissingConstraint { name: String },

    #[error("function {name} has no body to mutate")]
    #[diagnostic(code(mutspec::no_body))]
    NoBody { name: String },

    #[error("{name} has no clause at {site}")]
    #[diagnostic(code(mutspec::no_clause), help("clauses are numbered from 0 in declaration order"))]
    NoClause { name: String, site: String },

    #[error("malformed remove directive `{directive}`")]
    #[diagnostic(code(mutspec::remove), help("expected `file:line[,file:line...]`"))]
    BadRemoveDirective { directive: String },
}

impl SearchError {
    pub fn unknown_function(name: &str, known: Vec<String>) -> Self {
        SearchError::UnknownFunction {
            name: name.to_string(),
            known,
        }
    }
}
