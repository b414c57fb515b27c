use std::fmt;

use serde::{Deserialize, Serialize};

/// Verdict assigned to a candidate for one verification pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Unknown,
    CorrectProof,
    CorrectProofByTimeout,
    IncorrectProof,
    FalsePredicate,
    InvalidExpr,
    NoMatchingTrigger,
    VacuousProofPass,
}

impl Outcome {
    pub const ALL: [Outcome; 8] = [
        Outcome::Unknown,
        Outcome::CorrectProof,
        Outcome::CorrectProofByTimeout,
        Outcome::IncorrectProof,
        Outcome::FalsePredicate,
        Outcome::InvalidExpr,
        Outcome::NoMatchingTrigger,
        Outcome::VacuousProofPass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Unknown => "Unknown",
            Outcome::CorrectProof => "CorrectProof",
            Outcome::CorrectProofByTimeout => "CorrectProofByTimeout",
            Outcome::IncorrectProof => "IncorrectProof",
            Outcome::FalsePredicate => "FalsePredicate",
            Outcome::InvalidExpr => "InvalidExpr",
            Outcome::NoMatchingTrigger => "NoMatchingTrigger",
            Outcome::VacuousProofPass => "VacuousProofPass",
        }
    }

    /// Passed the positional check, either outright or by the verifier's own timeout.
    pub fn is_proof(self) -> bool {
        matches!(self, Outcome::CorrectProof | Outcome::CorrectProofByTimeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
