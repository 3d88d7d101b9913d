//! Error types for ecreflash-core

use thiserror::Error;

use crate::readiness::ReadinessStatus;
use crate::session::Phase;

/// Errors that can end a reflash attempt.
///
/// Everything raised before the erase phase leaves the EC running its
/// original firmware; `EcCommand` and `VerifyMismatch` carry the context the
/// outcome classification needs to tell a safe stop from an unsafe one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The identity signature did not match; there is no EC to talk to.
    #[error("no EC detected (identity signature mismatch)")]
    HardwareAbsent,

    /// AC or battery state does not permit flashing.
    #[error("system not ready: {0}")]
    NotReady(ReadinessStatus),

    /// The firmware image has the wrong size for this flash part.
    #[error("firmware image is {actual} bytes (expected {expected})")]
    SizeMismatch {
        /// Size the region plan requires.
        expected: usize,
        /// Size of the supplied image.
        actual: usize,
    },

    /// The verification buffer could not be allocated.
    #[error("failed to allocate the verification buffer")]
    AllocationFailed,

    /// The firmware image could not be read.
    #[error("failed to read the firmware image: {0}")]
    Io(String),

    /// The operator cancelled during the countdown.
    #[error("aborted by operator")]
    Aborted,

    /// An EC command returned a negative result.
    #[error("EC command failed while {phase} (result {code})")]
    EcCommand {
        /// Protocol step the command belonged to.
        phase: Phase,
        /// Raw negative result, for diagnostics.
        code: i32,
    },

    /// A region read back different bytes than were written.
    #[error("verification mismatch in {region} region")]
    VerifyMismatch {
        /// Name of the first region that failed the byte compare.
        region: &'static str,
    },
}

/// Result type alias using the crate error.
pub type Result<T> = core::result::Result<T, Error>;
