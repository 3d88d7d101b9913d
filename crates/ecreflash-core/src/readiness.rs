//! Readiness gate
//!
//! GO/NO-GO telemetry check run before, and again right after, the abort
//! window: the EC must answer to its identity tag, AC must be connected, and
//! the battery must hold at least [`MIN_BATTERY_PERCENT`] percent. The reads
//! are side-effect free, so the gate can run as often as needed.

use core::fmt;

use crate::ec::{
    BatteryFlags, EcMemory, EC_ID_TAG, EC_MEMMAP_BATT_CAP, EC_MEMMAP_BATT_FLAG,
    EC_MEMMAP_BATT_LFCC, EC_MEMMAP_ID,
};
use crate::error::{Error, Result};

/// Minimum battery charge, in percent, to allow flashing.
pub const MIN_BATTERY_PERCENT: u8 = 20;

/// Snapshot of the power telemetry a flash attempt is gated on.
///
/// Computed fresh on every check and never stored; the state can change
/// while the operator watches the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessStatus {
    /// Whether external power is connected.
    pub ac_present: bool,
    /// Battery charge in percent. `None` when the full-charge counter reads
    /// zero and no meaningful percentage exists.
    pub battery_percent: Option<u8>,
}

impl ReadinessStatus {
    /// Whether flashing may proceed.
    pub fn is_ready(&self) -> bool {
        self.ac_present && self.battery_percent.is_some_and(|p| p >= MIN_BATTERY_PERCENT)
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ac = if self.ac_present { "AC connected" } else { "AC disconnected" };
        match self.battery_percent {
            Some(p) => write!(f, "{}, battery at {}%", ac, p),
            None => write!(f, "{}, battery capacity unknown", ac),
        }
    }
}

/// Query identity and power telemetry and report readiness.
///
/// Fails with [`Error::HardwareAbsent`] when the identity signature does not
/// match; that is fatal to the whole operation, there is no EC to talk to.
pub fn check_readiness<M: EcMemory + ?Sized>(ec: &mut M) -> Result<ReadinessStatus> {
    let mut id = [0u8; 2];
    ec.read_mapped(EC_MEMMAP_ID, &mut id);
    if id != EC_ID_TAG {
        return Err(Error::HardwareAbsent);
    }

    let mut flag = [0u8; 1];
    ec.read_mapped(EC_MEMMAP_BATT_FLAG, &mut flag);
    let ac_present = BatteryFlags::from_bits_truncate(flag[0]).contains(BatteryFlags::AC_PRESENT);

    let mut word = [0u8; 4];
    ec.read_mapped(EC_MEMMAP_BATT_CAP, &mut word);
    let capacity = u32::from_le_bytes(word);
    ec.read_mapped(EC_MEMMAP_BATT_LFCC, &mut word);
    let full = u32::from_le_bytes(word);

    // A zero full-charge counter leaves the percentage undefined; that gates
    // the same way an empty battery would.
    let battery_percent = if full == 0 {
        None
    } else {
        Some((100 * u64::from(capacity) / u64::from(full)).min(100) as u8)
    };

    let status = ReadinessStatus { ac_present, battery_percent };
    log::debug!("readiness: {}", status);
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMemmap {
        id: [u8; 2],
        flags: BatteryFlags,
        capacity: u32,
        full: u32,
    }

    impl FakeMemmap {
        fn on_ac(capacity: u32, full: u32) -> Self {
            Self {
                id: EC_ID_TAG,
                flags: BatteryFlags::AC_PRESENT | BatteryFlags::BATT_PRESENT,
                capacity,
                full,
            }
        }
    }

    impl EcMemory for FakeMemmap {
        fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
            match offset {
                EC_MEMMAP_ID => out.copy_from_slice(&self.id),
                EC_MEMMAP_BATT_FLAG => out[0] = self.flags.bits(),
                EC_MEMMAP_BATT_CAP => out.copy_from_slice(&self.capacity.to_le_bytes()),
                EC_MEMMAP_BATT_LFCC => out.copy_from_slice(&self.full.to_le_bytes()),
                _ => out.fill(0),
            }
        }
    }

    #[test]
    fn identity_mismatch_is_fatal() {
        let mut ec = FakeMemmap::on_ac(100, 100);
        ec.id = *b"XX";
        assert_eq!(check_readiness(&mut ec), Err(Error::HardwareAbsent));
    }

    #[test]
    fn zero_full_charge_counter_is_not_ready() {
        let mut ec = FakeMemmap::on_ac(4000, 0);
        let status = check_readiness(&mut ec).unwrap();
        assert_eq!(status.battery_percent, None);
        assert!(!status.is_ready());
    }

    #[test]
    fn battery_threshold_boundary() {
        let mut ec = FakeMemmap::on_ac(19, 100);
        assert!(!check_readiness(&mut ec).unwrap().is_ready());

        let mut ec = FakeMemmap::on_ac(20, 100);
        assert!(check_readiness(&mut ec).unwrap().is_ready());
    }

    #[test]
    fn percent_is_floored() {
        // 1999/10000 floors to 19, still below the threshold.
        let mut ec = FakeMemmap::on_ac(1999, 10000);
        let status = check_readiness(&mut ec).unwrap();
        assert_eq!(status.battery_percent, Some(19));
        assert!(!status.is_ready());
    }

    #[test]
    fn missing_ac_is_not_ready() {
        let mut ec = FakeMemmap::on_ac(90, 100);
        ec.flags = BatteryFlags::BATT_PRESENT | BatteryFlags::DISCHARGING;
        let status = check_readiness(&mut ec).unwrap();
        assert_eq!(status.battery_percent, Some(90));
        assert!(!status.is_ready());
    }

    #[test]
    fn full_battery_on_ac_is_ready() {
        let mut ec = FakeMemmap::on_ac(4800, 4800);
        let status = check_readiness(&mut ec).unwrap();
        assert_eq!(status.battery_percent, Some(100));
        assert!(status.is_ready());
    }
}
