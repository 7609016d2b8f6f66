use crate::error::{ErrorKind, RejectReason};
use crate::proof::Verdict;

/// Result of validating one mint output or spend input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Rejected(RejectReason),
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Validation::Accepted => None,
            Validation::Rejected(reason) => Some(*reason),
        }
    }

    /// Peer misbehavior score for relaying the rejected item
    pub fn misbehavior_score(&self) -> u32 {
        self.reason().map_or(0, |r| r.misbehavior_score())
    }

    /// Temporal rejections may become valid once the chain advances
    pub fn may_retry(&self) -> bool {
        self.reason().is_some_and(|r| r.kind() == ErrorKind::Temporal)
    }
}

impl From<Verdict> for Validation {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid => Validation::Accepted,
            Verdict::Invalid(reason) => Validation::Rejected(reason),
        }
    }
}
