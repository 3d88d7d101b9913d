//! EC protocol constants and collaborator interfaces
//!
//! Everything the orchestration needs from the outside world is behind the
//! traits in this module: a host-command transport, the memory-mapped
//! telemetry window, address-based flash access, and a keystroke source.
//!
//! The EC's signed-result convention is preserved verbatim as the external
//! contract: every command returns an `i32`, `< 0` is failure (the EC status
//! code folded negative), `>= 0` is success with an optional response payload
//! length.

use bitflags::bitflags;

/// Offset of the 2-byte identity tag in the EC memory map.
pub const EC_MEMMAP_ID: u8 = 0x20;
/// Offset of the current battery capacity counter (u32, little endian).
pub const EC_MEMMAP_BATT_CAP: u8 = 0x48;
/// Offset of the battery status flags byte.
pub const EC_MEMMAP_BATT_FLAG: u8 = 0x4C;
/// Offset of the last-full-charge capacity counter (u32, little endian).
pub const EC_MEMMAP_BATT_LFCC: u8 = 0x58;

/// Identity tag expected at [`EC_MEMMAP_ID`] on a live EC.
pub const EC_ID_TAG: [u8; 2] = *b"EC";

/// Read a range of the EC's flash chip.
pub const EC_CMD_FLASH_READ: u16 = 0x0011;
/// Program a range of the EC's flash chip.
pub const EC_CMD_FLASH_WRITE: u16 = 0x0012;
/// Erase a range of the EC's flash chip.
pub const EC_CMD_FLASH_ERASE: u16 = 0x0013;
/// Tell the EC an external agent is about to touch, or is done touching,
/// its flash chip.
pub const EC_CMD_FLASH_NOTIFIED: u16 = 0x3E01;

/// Flag payload carried by [`EC_CMD_FLASH_NOTIFIED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlashNotify {
    /// External flash access is about to begin; the EC must stop driving
    /// the chip.
    AccessSpi = 0x00,
    /// A firmware update sequence is starting.
    FirmwareStart = 0x01,
    /// The firmware update sequence is finished.
    FirmwareDone = 0x02,
    /// External flash access is over; the EC may use the chip again.
    AccessSpiDone = 0x03,
}

bitflags! {
    /// Battery status bits at [`EC_MEMMAP_BATT_FLAG`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BatteryFlags: u8 {
        /// External power is connected.
        const AC_PRESENT = 0x01;
        /// A battery is attached.
        const BATT_PRESENT = 0x02;
        /// The battery is discharging.
        const DISCHARGING = 0x04;
        /// The battery is charging.
        const CHARGING = 0x08;
        /// Charge has dropped to a critical level.
        const LEVEL_CRITICAL = 0x10;
    }
}

/// Offset folded into failed command results: a command the EC answers with
/// status `n` surfaces as `-(EC_RESULT_BASE + n)`.
pub const EC_RESULT_BASE: i32 = 1000;

/// EC status codes seen inside negative command results.
pub const EC_RES_INVALID_COMMAND: u32 = 1;
/// Generic EC-side failure.
pub const EC_RES_ERROR: u32 = 2;
/// Malformed or out-of-range request parameters.
pub const EC_RES_INVALID_PARAM: u32 = 3;
/// The EC refused the operation.
pub const EC_RES_ACCESS_DENIED: u32 = 4;
/// The response packet was malformed.
pub const EC_RES_INVALID_RESPONSE: u32 = 5;
/// The response checksum did not add up.
pub const EC_RES_INVALID_CHECKSUM: u32 = 7;
/// The EC did not answer in time.
pub const EC_RES_TIMEOUT: u32 = 10;
/// Response or request larger than the transport window.
pub const EC_RES_OVERFLOW: u32 = 11;
/// Transport-level failure talking to the EC.
pub const EC_RES_BUS_ERROR: u32 = 15;

/// Fold an EC status code into the negative result convention.
pub fn ec_error(status: u32) -> i32 {
    -(EC_RESULT_BASE + status as i32)
}

/// Protocol name for the EC status inside a failed result, for diagnostics.
///
/// Returns `None` for non-negative results and for codes outside the
/// protocol's status table.
pub fn result_name(rv: i32) -> Option<&'static str> {
    if rv >= 0 {
        return None;
    }
    Some(match -rv - EC_RESULT_BASE {
        0 => "SUCCESS",
        1 => "INVALID_COMMAND",
        2 => "ERROR",
        3 => "INVALID_PARAM",
        4 => "ACCESS_DENIED",
        5 => "INVALID_RESPONSE",
        6 => "INVALID_VERSION",
        7 => "INVALID_CHECKSUM",
        8 => "IN_PROGRESS",
        9 => "UNAVAILABLE",
        10 => "TIMEOUT",
        11 => "OVERFLOW",
        12 => "INVALID_HEADER",
        13 => "REQUEST_TRUNCATED",
        14 => "RESPONSE_TOO_BIG",
        15 => "BUS_ERROR",
        16 => "BUSY",
        _ => return None,
    })
}

/// Transport for EC host commands.
pub trait EcTransport {
    /// Send one host command and block until the EC answers.
    ///
    /// `response` receives the reply payload; the return value is the
    /// payload length on success or a negative EC status on failure.
    fn send(&mut self, command: u16, version: u8, request: &[u8], response: &mut [u8]) -> i32;
}

/// Read-only view of the EC's memory-mapped telemetry window.
pub trait EcMemory {
    /// Copy `out.len()` bytes starting at `offset` of the memory map.
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]);
}

/// Address-based access to the EC's flash chip.
///
/// Same signed-result convention as [`EcTransport`].
pub trait FlashAccess {
    /// Erase `len` bytes starting at `offset`.
    fn erase(&mut self, offset: u32, len: u32) -> i32;
    /// Program `data` starting at `offset`.
    fn write(&mut self, offset: u32, data: &[u8]) -> i32;
    /// Read `out.len()` bytes starting at `offset`.
    fn read(&mut self, offset: u32, out: &mut [u8]) -> i32;
}

/// Non-blocking source of operator keystrokes.
pub trait KeySource {
    /// Return a pending keystroke without waiting, if there is one.
    fn poll_key(&mut self) -> Option<u8>;
}

/// Combined bound for type-erased backend handles.
///
/// The programmer registry hands out `Box<dyn EcDevice>` so the commands
/// never see a concrete transport type.
pub trait EcDevice: EcTransport + EcMemory {}

impl<T: EcTransport + EcMemory> EcDevice for T {}

impl<T: EcTransport + ?Sized> EcTransport for &mut T {
    fn send(&mut self, command: u16, version: u8, request: &[u8], response: &mut [u8]) -> i32 {
        (**self).send(command, version, request, response)
    }
}

impl<T: EcMemory + ?Sized> EcMemory for &mut T {
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
        (**self).read_mapped(offset, out)
    }
}

impl<T: EcTransport + ?Sized> EcTransport for Box<T> {
    fn send(&mut self, command: u16, version: u8, request: &[u8], response: &mut [u8]) -> i32 {
        (**self).send(command, version, request, response)
    }
}

impl<T: EcMemory + ?Sized> EcMemory for Box<T> {
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
        (**self).read_mapped(offset, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_name_decodes_known_codes() {
        assert_eq!(result_name(ec_error(EC_RES_ERROR)), Some("ERROR"));
        assert_eq!(result_name(ec_error(EC_RES_ACCESS_DENIED)), Some("ACCESS_DENIED"));
        assert_eq!(result_name(ec_error(16)), Some("BUSY"));
    }

    #[test]
    fn result_name_rejects_success_and_garbage() {
        assert_eq!(result_name(0), None);
        assert_eq!(result_name(42), None);
        assert_eq!(result_name(-1), None);
        assert_eq!(result_name(ec_error(900)), None);
    }
}
