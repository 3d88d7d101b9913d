//! ecreflash-dummy - In-memory EC emulator
//!
//! Emulates the EC's flash host commands and telemetry window in memory so
//! the update flow can run without hardware. Every command is logged in
//! order, single commands can be made to fail, and read-backs can be
//! corrupted, which makes this the mock device for session tests. It is also
//! selectable as a programmer for exercising the CLI.

use ecreflash_core::ec::{
    ec_error, BatteryFlags, EcMemory, EcTransport, EC_CMD_FLASH_ERASE, EC_CMD_FLASH_NOTIFIED,
    EC_CMD_FLASH_READ, EC_CMD_FLASH_WRITE, EC_MEMMAP_BATT_CAP, EC_MEMMAP_BATT_FLAG,
    EC_MEMMAP_BATT_LFCC, EC_MEMMAP_ID, EC_RES_INVALID_COMMAND, EC_RES_INVALID_PARAM,
};

/// Telemetry and geometry for the emulated EC.
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Size of the emulated flash part in bytes.
    pub flash_size: usize,
    /// Identity tag served from the memory map.
    pub id: [u8; 2],
    /// Whether external power reads as connected.
    pub ac_present: bool,
    /// Current battery capacity counter.
    pub battery_capacity: u32,
    /// Last-full-charge capacity counter.
    pub battery_full: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_size: 512 * 1024,
            id: *b"EC",
            ac_present: true,
            battery_capacity: 4200,
            battery_full: 4800,
        }
    }
}

/// Kind of host command, for fault injection and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// A flash-notified command.
    Notify,
    /// A flash erase.
    Erase,
    /// A flash write chunk.
    Write,
    /// A flash read chunk.
    Read,
}

/// One logged host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Flash-notified with the given flag.
    Notify(u8),
    /// Erase of the given range.
    Erase {
        /// Start offset.
        offset: u32,
        /// Length in bytes.
        size: u32,
    },
    /// Write chunk to the given range.
    Write {
        /// Start offset.
        offset: u32,
        /// Length in bytes.
        size: u32,
    },
    /// Read chunk of the given range.
    Read {
        /// Start offset.
        offset: u32,
        /// Length in bytes.
        size: u32,
    },
}

impl FlashOp {
    /// The command kind this op belongs to.
    pub fn kind(&self) -> OpKind {
        match self {
            FlashOp::Notify(_) => OpKind::Notify,
            FlashOp::Erase { .. } => OpKind::Erase,
            FlashOp::Write { .. } => OpKind::Write,
            FlashOp::Read { .. } => OpKind::Read,
        }
    }
}

struct Fault {
    kind: OpKind,
    remaining: u32,
    code: i32,
}

/// In-memory EC.
///
/// Flash semantics follow the real part: erase fills with `0xFF`, a write
/// can only clear bits.
pub struct DummyEc {
    config: DummyConfig,
    flash: Vec<u8>,
    ops: Vec<FlashOp>,
    fault: Option<Fault>,
    corrupt_read_at: Option<u32>,
}

impl DummyEc {
    /// Create an emulated EC with the given configuration, flash erased.
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        Self {
            config,
            flash,
            ops: Vec::new(),
            fault: None,
            corrupt_read_at: None,
        }
    }

    /// Create an emulated EC with the default configuration.
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// The emulated flash contents.
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Mutable access to the emulated flash contents.
    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    /// The configuration.
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Every host command seen so far, in order.
    pub fn ops(&self) -> &[FlashOp] {
        &self.ops
    }

    /// Fail the next command of `kind` with `code`.
    pub fn fail_next(&mut self, kind: OpKind, code: i32) {
        self.fail_nth(kind, 0, code)
    }

    /// Fail the `nth` (0-based) upcoming command of `kind` with `code`.
    pub fn fail_nth(&mut self, kind: OpKind, nth: u32, code: i32) {
        self.fault = Some(Fault { kind, remaining: nth, code });
    }

    /// Flip the byte at `addr` in every subsequent flash read.
    pub fn corrupt_read_at(&mut self, addr: u32) {
        self.corrupt_read_at = Some(addr);
    }

    fn take_fault(&mut self, kind: OpKind) -> Option<i32> {
        let fault = self.fault.as_mut()?;
        if fault.kind != kind {
            return None;
        }
        if fault.remaining > 0 {
            fault.remaining -= 1;
            return None;
        }
        let code = fault.code;
        self.fault = None;
        Some(code)
    }

    fn range(&self, offset: u32, size: u32) -> Option<core::ops::Range<usize>> {
        let start = offset as usize;
        let end = start.checked_add(size as usize)?;
        (end <= self.flash.len()).then_some(start..end)
    }
}

fn decode_params(request: &[u8]) -> Option<(u32, u32)> {
    let offset = u32::from_le_bytes(request.get(..4)?.try_into().ok()?);
    let size = u32::from_le_bytes(request.get(4..8)?.try_into().ok()?);
    Some((offset, size))
}

impl EcTransport for DummyEc {
    fn send(&mut self, command: u16, _version: u8, request: &[u8], response: &mut [u8]) -> i32 {
        match command {
            EC_CMD_FLASH_NOTIFIED => {
                let flag = request.first().copied().unwrap_or(0);
                self.ops.push(FlashOp::Notify(flag));
                if let Some(code) = self.take_fault(OpKind::Notify) {
                    return code;
                }
                0
            }
            EC_CMD_FLASH_ERASE => {
                let Some((offset, size)) = decode_params(request) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                self.ops.push(FlashOp::Erase { offset, size });
                if let Some(code) = self.take_fault(OpKind::Erase) {
                    return code;
                }
                let Some(range) = self.range(offset, size) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                self.flash[range].fill(0xFF);
                0
            }
            EC_CMD_FLASH_WRITE => {
                let Some((offset, size)) = decode_params(request) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                self.ops.push(FlashOp::Write { offset, size });
                if let Some(code) = self.take_fault(OpKind::Write) {
                    return code;
                }
                let data = &request[8..];
                if data.len() != size as usize {
                    return ec_error(EC_RES_INVALID_PARAM);
                }
                let Some(range) = self.range(offset, size) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                // Programming can only clear bits; erase must come first.
                for (cell, byte) in self.flash[range].iter_mut().zip(data) {
                    *cell &= byte;
                }
                0
            }
            EC_CMD_FLASH_READ => {
                let Some((offset, size)) = decode_params(request) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                self.ops.push(FlashOp::Read { offset, size });
                if let Some(code) = self.take_fault(OpKind::Read) {
                    return code;
                }
                if size as usize > response.len() {
                    return ec_error(EC_RES_INVALID_PARAM);
                }
                let Some(range) = self.range(offset, size) else {
                    return ec_error(EC_RES_INVALID_PARAM);
                };
                response[..size as usize].copy_from_slice(&self.flash[range]);
                if let Some(addr) = self.corrupt_read_at {
                    if addr >= offset && addr < offset + size {
                        response[(addr - offset) as usize] ^= 0xFF;
                    }
                }
                size as i32
            }
            other => {
                log::debug!("dummy EC: unhandled command 0x{:04X}", other);
                ec_error(EC_RES_INVALID_COMMAND)
            }
        }
    }
}

impl EcMemory for DummyEc {
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
        fn put(out: &mut [u8], src: &[u8]) {
            let n = out.len().min(src.len());
            out[..n].copy_from_slice(&src[..n]);
        }

        match offset {
            EC_MEMMAP_ID => put(out, &self.config.id),
            EC_MEMMAP_BATT_FLAG => {
                let mut flags = BatteryFlags::BATT_PRESENT;
                if self.config.ac_present {
                    flags |= BatteryFlags::AC_PRESENT | BatteryFlags::CHARGING;
                } else {
                    flags |= BatteryFlags::DISCHARGING;
                }
                put(out, &[flags.bits()]);
            }
            EC_MEMMAP_BATT_CAP => put(out, &self.config.battery_capacity.to_le_bytes()),
            EC_MEMMAP_BATT_LFCC => put(out, &self.config.battery_full.to_le_bytes()),
            _ => out.fill(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecreflash_core::ec::{EC_RES_ERROR, EC_RES_ACCESS_DENIED};
    use ecreflash_core::outcome::Outcome;
    use ecreflash_core::plan::{FlashRegion, RegionPlan};
    use ecreflash_core::protocol::HostFlash;
    use ecreflash_core::readiness::check_readiness;
    use ecreflash_core::session::{
        FlashSession, NullObserver, Phase, SessionEnd, VerifyOutcome,
    };
    use ecreflash_core::Error;

    const RO_BASE: u32 = 0;
    const RO_SIZE: u32 = 0x400;
    const RW_BASE: u32 = 0x800;
    const RW_SIZE: u32 = 0x400;
    const IMAGE_SIZE: usize = 0x1000;

    fn test_plan() -> RegionPlan {
        RegionPlan {
            image_size: IMAGE_SIZE as u32,
            regions: vec![
                FlashRegion { name: "RO", base: RO_BASE, size: RO_SIZE },
                FlashRegion { name: "RW", base: RW_BASE, size: RW_SIZE },
            ],
        }
    }

    fn test_image() -> Vec<u8> {
        let mut image = vec![0u8; IMAGE_SIZE];
        image[RO_BASE as usize..(RO_BASE + RO_SIZE) as usize].fill(0xA5);
        image[RW_BASE as usize..(RW_BASE + RW_SIZE) as usize].fill(0x3C);
        image
    }

    fn test_ec() -> DummyEc {
        let mut ec = DummyEc::new(DummyConfig {
            flash_size: IMAGE_SIZE,
            ..DummyConfig::default()
        });
        // Old firmware everywhere, including the preserved gap.
        ec.flash_mut().fill(0x11);
        ec
    }

    fn run_session(ec: &mut DummyEc, image: Vec<u8>) -> ecreflash_core::session::SessionReport {
        let session = FlashSession::new(test_plan(), image).unwrap();
        let mut flash = HostFlash::new(&mut *ec);
        session.run(&mut flash, &mut NullObserver)
    }

    fn ops_of_kind(ec: &DummyEc, kind: OpKind) -> Vec<FlashOp> {
        ec.ops().iter().copied().filter(|op| op.kind() == kind).collect()
    }

    #[test]
    fn full_session_round_trips_and_preserves_gaps() {
        let mut ec = test_ec();
        let image = test_image();
        let report = run_session(&mut ec, image.clone());

        assert_eq!(report.end, SessionEnd::Done);
        assert!(report
            .regions
            .iter()
            .all(|r| r.outcome == VerifyOutcome::Match));
        assert_eq!(report.outcome(), Outcome::SafeSuccess);

        // Planned regions carry the image bytes.
        assert_eq!(
            &ec.flash()[..RO_SIZE as usize],
            &image[..RO_SIZE as usize]
        );
        assert_eq!(
            &ec.flash()[RW_BASE as usize..(RW_BASE + RW_SIZE) as usize],
            &image[RW_BASE as usize..(RW_BASE + RW_SIZE) as usize]
        );
        // The gap between RO and RW and the tail were never touched.
        assert!(ec.flash()[(RO_BASE + RO_SIZE) as usize..RW_BASE as usize]
            .iter()
            .all(|&b| b == 0x11));
        assert!(ec.flash()[(RW_BASE + RW_SIZE) as usize..]
            .iter()
            .all(|&b| b == 0x11));
    }

    #[test]
    fn notify_sequence_brackets_the_flash_work() {
        let mut ec = test_ec();
        run_session(&mut ec, test_image());

        let notifies = ops_of_kind(&ec, OpKind::Notify);
        assert_eq!(
            notifies,
            vec![
                FlashOp::Notify(0x00), // access enabled
                FlashOp::Notify(0x01), // firmware start
                FlashOp::Notify(0x03), // access disabled
                FlashOp::Notify(0x02), // firmware done
            ]
        );
        // The first two precede all flash ops, the last two follow them.
        let kinds: Vec<OpKind> = ec.ops().iter().map(FlashOp::kind).collect();
        assert_eq!(kinds[0], OpKind::Notify);
        assert_eq!(kinds[1], OpKind::Notify);
        assert_eq!(kinds[kinds.len() - 2], OpKind::Notify);
        assert_eq!(kinds[kinds.len() - 1], OpKind::Notify);
        assert!(kinds[2..kinds.len() - 2].iter().all(|k| *k != OpKind::Notify));
    }

    #[test]
    fn regions_are_processed_in_plan_order_per_phase() {
        let mut ec = test_ec();
        run_session(&mut ec, test_image());

        assert_eq!(
            ops_of_kind(&ec, OpKind::Erase),
            vec![
                FlashOp::Erase { offset: RO_BASE, size: RO_SIZE },
                FlashOp::Erase { offset: RW_BASE, size: RW_SIZE },
            ]
        );

        // Writes and reads are chunked; every RO chunk must come before the
        // first RW chunk, and chunks walk upward within a region.
        for kind in [OpKind::Write, OpKind::Read] {
            let ops = ops_of_kind(&ec, kind);
            let offsets: Vec<u32> = ops
                .iter()
                .map(|op| match op {
                    FlashOp::Write { offset, .. } | FlashOp::Read { offset, .. } => *offset,
                    _ => unreachable!(),
                })
                .collect();
            let first_rw = offsets.iter().position(|&o| o >= RW_BASE).unwrap();
            assert!(offsets[..first_rw].iter().all(|&o| o < RO_BASE + RO_SIZE));
            assert!(offsets[first_rw..].iter().all(|&o| o >= RW_BASE));
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            assert_eq!(offsets, sorted);
        }

        // Phase barriers: all erases before all writes before all reads.
        let kinds: Vec<OpKind> = ec.ops().iter().map(FlashOp::kind).collect();
        let last_erase = kinds.iter().rposition(|k| *k == OpKind::Erase).unwrap();
        let first_write = kinds.iter().position(|k| *k == OpKind::Write).unwrap();
        let last_write = kinds.iter().rposition(|k| *k == OpKind::Write).unwrap();
        let first_read = kinds.iter().position(|k| *k == OpKind::Read).unwrap();
        assert!(last_erase < first_write);
        assert!(last_write < first_read);
    }

    #[test]
    fn wrong_size_image_never_reaches_the_ec() {
        let mut ec = test_ec();
        let err = FlashSession::new(test_plan(), vec![0u8; IMAGE_SIZE / 2]).unwrap_err();
        assert_eq!(
            err,
            Error::SizeMismatch { expected: IMAGE_SIZE, actual: IMAGE_SIZE / 2 }
        );
        assert_eq!(Outcome::from_error(err.clone()), Outcome::SafeRejected(err));
        assert!(ec.ops().is_empty());
    }

    #[test]
    fn unlock_failure_stops_before_any_erase() {
        let mut ec = test_ec();
        let code = ec_error(EC_RES_ACCESS_DENIED);
        ec.fail_next(OpKind::Notify, code);
        let report = run_session(&mut ec, test_image());

        assert_eq!(report.end, SessionEnd::Failed { phase: Phase::Unlock, code });
        assert_eq!(report.last_ec_error, Some(code));
        assert!(!report.device_at_risk());
        assert!(matches!(report.outcome(), Outcome::SafeRejected(_)));
        assert!(ops_of_kind(&ec, OpKind::Erase).is_empty());
        // The old firmware is untouched.
        assert!(ec.flash().iter().all(|&b| b == 0x11));
    }

    #[test]
    fn erase_failure_is_unsafe_and_stops_the_sequence() {
        let mut ec = test_ec();
        let code = ec_error(EC_RES_ERROR);
        ec.fail_next(OpKind::Erase, code);
        let report = run_session(&mut ec, test_image());

        assert_eq!(report.end, SessionEnd::Failed { phase: Phase::Erase, code });
        assert!(report.device_at_risk());
        assert_eq!(
            report.outcome(),
            Outcome::UnsafeFailure(Error::EcCommand { phase: Phase::Erase, code })
        );
        assert!(ops_of_kind(&ec, OpKind::Write).is_empty());
        assert!(ops_of_kind(&ec, OpKind::Read).is_empty());
        // Nothing after the failing command, not even the RW erase or the
        // closing notifications.
        assert_eq!(ops_of_kind(&ec, OpKind::Erase).len(), 1);
        assert_eq!(ops_of_kind(&ec, OpKind::Notify).len(), 2);
        // All regions were left unchecked.
        assert!(report.regions.iter().all(|r| r.outcome == VerifyOutcome::NotRun));
    }

    #[test]
    fn write_failure_mid_region_is_unsafe() {
        let mut ec = test_ec();
        let code = ec_error(EC_RES_ERROR);
        ec.fail_nth(OpKind::Write, 3, code);
        let report = run_session(&mut ec, test_image());

        assert_eq!(report.end, SessionEnd::Failed { phase: Phase::Write, code });
        assert!(report.outcome().is_unsafe());
        assert_eq!(ops_of_kind(&ec, OpKind::Write).len(), 4);
        assert!(ops_of_kind(&ec, OpKind::Read).is_empty());
    }

    #[test]
    fn readback_corruption_fails_only_that_region() {
        let mut ec = test_ec();
        ec.corrupt_read_at(RW_BASE + 5);
        let report = run_session(&mut ec, test_image());

        // Every command succeeded, yet the outcome is unsafe.
        assert_eq!(report.end, SessionEnd::Done);
        assert_eq!(report.regions[0].name, "RO");
        assert_eq!(report.regions[0].outcome, VerifyOutcome::Match);
        assert_eq!(report.regions[1].name, "RW");
        assert_eq!(report.regions[1].outcome, VerifyOutcome::Mismatch);
        assert_eq!(
            report.outcome(),
            Outcome::UnsafeFailure(Error::VerifyMismatch { region: "RW" })
        );
        // Lock was still attempted after the mismatch.
        let notifies = ops_of_kind(&ec, OpKind::Notify);
        assert_eq!(notifies.len(), 4);
        assert_eq!(notifies[2], FlashOp::Notify(0x03));
        assert_eq!(notifies[3], FlashOp::Notify(0x02));
    }

    #[test]
    fn lock_failure_is_unsafe_even_with_a_good_image() {
        let mut ec = test_ec();
        let code = ec_error(EC_RES_ERROR);
        ec.fail_nth(OpKind::Notify, 2, code);
        let report = run_session(&mut ec, test_image());

        assert_eq!(report.end, SessionEnd::Failed { phase: Phase::Lock, code });
        assert!(report.outcome().is_unsafe());
        // The image itself verified fine before the lock failed.
        assert!(report
            .regions
            .iter()
            .all(|r| r.outcome == VerifyOutcome::Match));
    }

    #[test]
    fn telemetry_feeds_the_readiness_gate() {
        let mut ec = DummyEc::new_default();
        let status = check_readiness(&mut ec).unwrap();
        assert!(status.is_ready());
        assert_eq!(status.battery_percent, Some(87));

        let mut ec = DummyEc::new(DummyConfig {
            ac_present: false,
            ..DummyConfig::default()
        });
        assert!(!check_readiness(&mut ec).unwrap().is_ready());

        let mut ec = DummyEc::new(DummyConfig {
            id: *b"??",
            ..DummyConfig::default()
        });
        assert_eq!(check_readiness(&mut ec), Err(Error::HardwareAbsent));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let mut ec = DummyEc::new_default();
        let rv = ec.send(0x7777, 0, &[], &mut []);
        assert_eq!(rv, ec_error(EC_RES_INVALID_COMMAND));
    }
}
