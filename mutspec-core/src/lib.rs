#![forbid(unsafe_code)]

pub mod callgraph;
pub mod candidate;
pub mod erase;
pub mod error;
pub mod mutate;
pub mod obligation;
pub mod outcome;
pub mod pool;
pub mod seeds;

pub use callgraph::{CallEdge, CallGraph, CallPath, PathStep, build_call_graph, enumerate_paths};
pub use candidate::ExpressionCandidate;
pub use erase::{RemoveDirective, erase_conjunct, parse_remove_directives};
pub use error::SearchError;
pub use mutate::{alternatives, mutate};
pub use obligation::{
    DEFAULT_VERIFIER_ARGS, Lemma, Mode, ObligationBuilder, RenderedJob, Site, Stage, lemma_name_col,
};
pub use outcome::Outcome;
pub use pool::{BitSet, SearchState};
pub use seeds::{AtomSet, constraint_invocations, enumerate_atoms, equality_classes};
