//! Flash update session
//!
//! Drives unlock, erase, write, verify, lock as an explicit state machine
//! over one owned firmware image. Once the first erase command goes out the
//! EC has no intact firmware until the sequence completes, so every command
//! failure is terminal for the session (no retries, no partial re-runs) and
//! the terminal record keeps track of whether that window had been entered.

use core::fmt;

use crate::ec::{EcTransport, FlashAccess, FlashNotify, EC_CMD_FLASH_NOTIFIED};
use crate::error::{Error, Result};
use crate::plan::RegionPlan;

/// Protocol step a command belongs to, for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Flash-notified commands opening EC flash access.
    Unlock,
    /// Region erases.
    Erase,
    /// Region writes from the firmware image.
    Write,
    /// Region read-back for verification.
    Verify,
    /// Flash-notified commands closing EC flash access.
    Lock,
}

impl Phase {
    /// Whether flash contents have been disturbed by the time this phase
    /// runs. A failure here leaves the EC without firmware it can boot.
    pub fn irreversible(self) -> bool {
        !matches!(self, Phase::Unlock)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unlock => "unlocking flash",
            Phase::Erase => "erasing",
            Phase::Write => "writing",
            Phase::Verify => "verifying",
            Phase::Lock => "locking flash",
        })
    }
}

/// Per-region verification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The read-back matched the image byte for byte.
    Match,
    /// The read-back differed from the image.
    Mismatch,
    /// The session ended before this region was compared.
    NotRun,
}

/// Verification record for one planned region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionResult {
    /// Region name from the plan.
    pub name: &'static str,
    /// Result of the byte compare.
    pub outcome: VerifyOutcome,
}

/// States of the update sequence. `Failed` is absorbing and reachable from
/// every non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing sent yet.
    Idle,
    /// Opening EC flash access.
    Unlocking,
    /// Erasing planned regions.
    Erasing,
    /// Writing planned regions.
    Writing,
    /// Reading regions back and comparing.
    Verifying,
    /// Closing EC flash access.
    Locking,
    /// Terminal success.
    Done,
    /// Terminal failure: the first negative command result, with the phase
    /// it happened in.
    Failed {
        /// Phase the failing command belonged to.
        phase: Phase,
        /// Raw negative result.
        code: i32,
    },
}

/// Terminal state of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// All commands succeeded; see the region results for verification.
    Done,
    /// A command failed and the sequence stopped there.
    Failed {
        /// Phase the failing command belonged to.
        phase: Phase,
        /// Raw negative result.
        code: i32,
    },
}

/// Observer for session progress. All callbacks default to no-ops; console
/// rendering lives with the caller.
pub trait SessionObserver {
    /// A phase is starting.
    fn phase_started(&mut self, _phase: Phase) {}
    /// A region operation within a phase is starting.
    fn region_started(&mut self, _phase: Phase, _region: &'static str) {}
    /// A region operation within a phase succeeded.
    fn region_completed(&mut self, _phase: Phase, _region: &'static str) {}
    /// A phase finished with every command succeeding.
    fn phase_completed(&mut self, _phase: Phase) {}
    /// A region's read-back was compared against the image.
    fn region_checked(&mut self, _region: &'static str, _outcome: VerifyOutcome) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Terminal record of a session, consumed by outcome classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// How the sequence ended.
    pub end: SessionEnd,
    /// Verification results in plan order.
    pub regions: Vec<RegionResult>,
    /// Most recent raw EC command result, for diagnostics.
    pub last_ec_error: Option<i32>,
}

impl SessionReport {
    /// Whether flash was disturbed before the session ended: a failure at or
    /// past the first erase, or a completed run whose read-back differed.
    pub fn device_at_risk(&self) -> bool {
        match &self.end {
            SessionEnd::Failed { phase, .. } => phase.irreversible(),
            SessionEnd::Done => self
                .regions
                .iter()
                .any(|r| r.outcome != VerifyOutcome::Match),
        }
    }
}

/// One firmware update attempt.
///
/// Owns the firmware image and the verification buffer for its whole
/// lifetime and walks the state machine exactly once; both buffers are
/// released on every exit path when the session is consumed.
#[derive(Debug)]
pub struct FlashSession {
    plan: RegionPlan,
    image: Vec<u8>,
    verify: Vec<u8>,
    state: SessionState,
    last_ec_error: Option<i32>,
    regions: Vec<RegionResult>,
}

impl FlashSession {
    /// Take ownership of a loaded firmware image.
    ///
    /// The image length must equal the plan's image size, and the verify
    /// buffer is allocated up front, so both failure modes surface before
    /// any hardware interaction.
    pub fn new(plan: RegionPlan, image: Vec<u8>) -> Result<Self> {
        debug_assert!(plan.validate().is_ok());
        if image.len() != plan.image_size as usize {
            return Err(Error::SizeMismatch {
                expected: plan.image_size as usize,
                actual: image.len(),
            });
        }
        let mut verify = Vec::new();
        verify
            .try_reserve_exact(image.len())
            .map_err(|_| Error::AllocationFailed)?;
        verify.resize(image.len(), 0);
        let regions = plan
            .regions
            .iter()
            .map(|r| RegionResult { name: r.name, outcome: VerifyOutcome::NotRun })
            .collect();
        Ok(Self {
            plan,
            image,
            verify,
            state: SessionState::Idle,
            last_ec_error: None,
            regions,
        })
    }

    /// Current machine state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the whole sequence to a terminal state.
    ///
    /// Regions are processed strictly in plan order within each phase, and
    /// each phase completes for all regions before the next begins. There is
    /// no cancellation point in here and no retry; the first negative result
    /// is terminal.
    pub fn run<D, O>(mut self, dev: &mut D, obs: &mut O) -> SessionReport
    where
        D: EcTransport + FlashAccess + ?Sized,
        O: SessionObserver,
    {
        // Failing to open access leaves the original firmware untouched.
        self.state = SessionState::Unlocking;
        obs.phase_started(Phase::Unlock);
        for flag in [FlashNotify::AccessSpi, FlashNotify::FirmwareStart] {
            let rv = self.notify(dev, flag);
            if rv < 0 {
                return self.fail(Phase::Unlock, rv);
            }
        }
        obs.phase_completed(Phase::Unlock);

        // From the first erase on there is no intact firmware on the chip.
        self.state = SessionState::Erasing;
        obs.phase_started(Phase::Erase);
        for i in 0..self.plan.regions.len() {
            let region = self.plan.regions[i].clone();
            obs.region_started(Phase::Erase, region.name);
            let rv = dev.erase(region.base, region.size);
            self.last_ec_error = Some(rv);
            if rv < 0 {
                return self.fail(Phase::Erase, rv);
            }
            obs.region_completed(Phase::Erase, region.name);
        }
        obs.phase_completed(Phase::Erase);

        self.state = SessionState::Writing;
        obs.phase_started(Phase::Write);
        for i in 0..self.plan.regions.len() {
            let region = self.plan.regions[i].clone();
            obs.region_started(Phase::Write, region.name);
            let rv = dev.write(region.base, region.slice(&self.image));
            self.last_ec_error = Some(rv);
            if rv < 0 {
                return self.fail(Phase::Write, rv);
            }
            obs.region_completed(Phase::Write, region.name);
        }
        obs.phase_completed(Phase::Write);

        self.state = SessionState::Verifying;
        obs.phase_started(Phase::Verify);
        for i in 0..self.plan.regions.len() {
            let region = self.plan.regions[i].clone();
            obs.region_started(Phase::Verify, region.name);
            let rv = dev.read(region.base, region.slice_mut(&mut self.verify));
            self.last_ec_error = Some(rv);
            if rv < 0 {
                return self.fail(Phase::Verify, rv);
            }
            obs.region_completed(Phase::Verify, region.name);
        }
        // Mismatches are recorded, not fatal: flash access still has to be
        // locked, and the outcome classification surfaces them afterwards.
        for i in 0..self.plan.regions.len() {
            let region = self.plan.regions[i].clone();
            let outcome = if region.slice(&self.verify) == region.slice(&self.image) {
                VerifyOutcome::Match
            } else {
                log::warn!("{} region read-back does not match the image", region.name);
                VerifyOutcome::Mismatch
            };
            self.regions[i].outcome = outcome;
            obs.region_checked(region.name, outcome);
        }
        obs.phase_completed(Phase::Verify);

        self.state = SessionState::Locking;
        obs.phase_started(Phase::Lock);
        for flag in [FlashNotify::AccessSpiDone, FlashNotify::FirmwareDone] {
            let rv = self.notify(dev, flag);
            if rv < 0 {
                return self.fail(Phase::Lock, rv);
            }
        }
        obs.phase_completed(Phase::Lock);

        self.state = SessionState::Done;
        self.finish(SessionEnd::Done)
    }

    fn notify<D: EcTransport + ?Sized>(&mut self, dev: &mut D, flag: FlashNotify) -> i32 {
        let rv = dev.send(EC_CMD_FLASH_NOTIFIED, 0, &[flag as u8], &mut []);
        self.last_ec_error = Some(rv);
        rv
    }

    fn fail(mut self, phase: Phase, code: i32) -> SessionReport {
        log::error!("EC command failed while {} (result {})", phase, code);
        self.state = SessionState::Failed { phase, code };
        self.finish(SessionEnd::Failed { phase, code })
    }

    fn finish(self, end: SessionEnd) -> SessionReport {
        SessionReport {
            end,
            regions: self.regions,
            last_ec_error: self.last_ec_error,
        }
    }
}
