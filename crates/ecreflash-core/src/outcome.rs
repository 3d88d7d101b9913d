//! Terminal outcome classification
//!
//! The one question the operator needs answered is whether irreversible
//! flash mutation had begun when things stopped, not which status code came
//! back. Every terminal state of a reflash attempt maps onto exactly one of
//! four outcomes.

use crate::error::Error;
use crate::session::{SessionEnd, SessionReport, VerifyOutcome};

/// What a reflash attempt amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every region written and verified; EC flash access is locked again.
    SafeSuccess,
    /// The operator cancelled before anything irreversible happened.
    SafeAbort,
    /// Rejected before any flash mutation; the EC still runs its old
    /// firmware.
    SafeRejected(Error),
    /// Failure at or past the first erase, or a verify mismatch: the EC may
    /// not have intact firmware to boot from.
    UnsafeFailure(Error),
}

impl Outcome {
    /// Whether this outcome calls for the may-no-longer-boot warning.
    pub fn is_unsafe(&self) -> bool {
        matches!(self, Outcome::UnsafeFailure(_))
    }

    /// Classify an error raised before the session touched hardware.
    pub fn from_error(err: Error) -> Self {
        match err {
            Error::Aborted => Outcome::SafeAbort,
            err => Outcome::SafeRejected(err),
        }
    }
}

impl SessionReport {
    /// Classify this terminal session record.
    pub fn outcome(&self) -> Outcome {
        match &self.end {
            SessionEnd::Done => {
                match self
                    .regions
                    .iter()
                    .find(|r| r.outcome != VerifyOutcome::Match)
                {
                    None => Outcome::SafeSuccess,
                    // Command-level success with a bad read-back is still a
                    // bad flash.
                    Some(r) => Outcome::UnsafeFailure(Error::VerifyMismatch { region: r.name }),
                }
            }
            SessionEnd::Failed { phase, code } => {
                let err = Error::EcCommand { phase: *phase, code: *code };
                if phase.irreversible() {
                    Outcome::UnsafeFailure(err)
                } else {
                    Outcome::SafeRejected(err)
                }
            }
        }
    }
}
