//! ecreflash-lpc - LPC host-command transport
//!
//! Talks to the EC over the LPC bus with raw port I/O: host commands go
//! through the 256-byte packet window as v3 checksummed packets, telemetry
//! comes straight from the memory-mapped range. Needs `iopl(3)`, so root,
//! and x86 `in`/`out` instructions, so the crate is empty on other
//! architectures.

#![cfg(any(target_arch = "x86", target_arch = "x86_64"))]

use std::io;
use std::time::{Duration, Instant};

use ecreflash_core::ec::{
    ec_error, EcMemory, EcTransport, EC_ID_TAG, EC_MEMMAP_ID, EC_RES_INVALID_CHECKSUM,
    EC_RES_INVALID_RESPONSE, EC_RES_OVERFLOW, EC_RES_TIMEOUT,
};

#[inline(always)]
unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe {
        core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nostack));
    }
    value
}

#[inline(always)]
unsafe fn outb(port: u16, value: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("al") value, in("dx") port, options(nostack));
    }
}

/// EC result byte mirrored on the legacy data port.
const EC_LPC_ADDR_HOST_DATA: u16 = 0x200;
/// Command/status port; writing here starts a command.
const EC_LPC_ADDR_HOST_CMD: u16 = 0x204;
/// Base of the 256-byte host packet window.
const EC_LPC_ADDR_HOST_PACKET: u16 = 0x800;
/// Base of the memory-mapped telemetry range.
const EC_LPC_ADDR_MEMMAP: u16 = 0x900;

/// Command byte selecting the v3 packet protocol.
const EC_COMMAND_PROTOCOL_3: u8 = 0xDA;
const EC_HOST_REQUEST_VERSION: u8 = 3;
const EC_HOST_RESPONSE_VERSION: u8 = 3;

/// Status bits on [`EC_LPC_ADDR_HOST_CMD`]; the EC is busy while either is
/// set.
const EC_LPC_STATUS_FROM_HOST: u8 = 0x02;
const EC_LPC_STATUS_PROCESSING: u8 = 0x04;
const EC_LPC_STATUS_BUSY_MASK: u8 = EC_LPC_STATUS_FROM_HOST | EC_LPC_STATUS_PROCESSING;

const HOST_PACKET_SIZE: usize = 0x100;
/// Request and response headers share the same 8-byte length.
const HEADER_LEN: usize = 8;
/// Largest payload one packet can carry.
pub const MAX_PAYLOAD: usize = HOST_PACKET_SIZE - HEADER_LEN;

const BUSY_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Build the v3 request header for `data`, checksummed so the whole packet
/// sums to zero modulo 256.
fn build_request(command: u16, version: u8, data: &[u8]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = EC_HOST_REQUEST_VERSION;
    header[2..4].copy_from_slice(&command.to_le_bytes());
    header[4] = version;
    header[6..8].copy_from_slice(&(data.len() as u16).to_le_bytes());
    let sum = packet_sum(&header, data);
    header[1] = sum.wrapping_neg();
    header
}

fn packet_sum(header: &[u8], data: &[u8]) -> u8 {
    header
        .iter()
        .chain(data)
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// EC reached over LPC port I/O.
///
/// Construction probes the memory map for the identity tag, so a handle
/// always refers to an EC that was answering at open time.
pub struct LpcTransport {
    _priv: (),
}

impl LpcTransport {
    /// Raise the I/O privilege level and probe for a live EC.
    pub fn open() -> io::Result<Self> {
        if unsafe { libc::iopl(3) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut transport = Self { _priv: () };
        let mut id = [0u8; 2];
        transport.read_mapped(EC_MEMMAP_ID, &mut id);
        if id != EC_ID_TAG {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no EC on the LPC bus (id bytes {:02X} {:02X})", id[0], id[1]),
            ));
        }
        log::debug!("EC answering on the LPC memmap window");
        Ok(transport)
    }

    fn wait_ready(&self) -> bool {
        let deadline = Instant::now() + BUSY_TIMEOUT;
        loop {
            let status = unsafe { inb(EC_LPC_ADDR_HOST_CMD) };
            if status & EC_LPC_STATUS_BUSY_MASK == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl EcTransport for LpcTransport {
    fn send(&mut self, command: u16, version: u8, request: &[u8], response: &mut [u8]) -> i32 {
        if request.len() > MAX_PAYLOAD {
            return ec_error(EC_RES_OVERFLOW);
        }
        if !self.wait_ready() {
            return ec_error(EC_RES_TIMEOUT);
        }

        let header = build_request(command, version, request);
        unsafe {
            for (i, byte) in header.iter().chain(request).enumerate() {
                outb(EC_LPC_ADDR_HOST_PACKET + i as u16, *byte);
            }
            outb(EC_LPC_ADDR_HOST_CMD, EC_COMMAND_PROTOCOL_3);
        }

        if !self.wait_ready() {
            return ec_error(EC_RES_TIMEOUT);
        }
        let result = unsafe { inb(EC_LPC_ADDR_HOST_DATA) } as u32;
        if result != 0 {
            return ec_error(result);
        }

        let mut reply = [0u8; HEADER_LEN];
        for (i, byte) in reply.iter_mut().enumerate() {
            *byte = unsafe { inb(EC_LPC_ADDR_HOST_PACKET + i as u16) };
        }
        if reply[0] != EC_HOST_RESPONSE_VERSION {
            return ec_error(EC_RES_INVALID_RESPONSE);
        }
        let ec_result = u16::from_le_bytes([reply[2], reply[3]]) as u32;
        let data_len = u16::from_le_bytes([reply[4], reply[5]]) as usize;
        if data_len > MAX_PAYLOAD || data_len > response.len() {
            return ec_error(EC_RES_OVERFLOW);
        }
        for (i, byte) in response[..data_len].iter_mut().enumerate() {
            *byte = unsafe { inb(EC_LPC_ADDR_HOST_PACKET + (HEADER_LEN + i) as u16) };
        }
        if packet_sum(&reply, &response[..data_len]) != 0 {
            return ec_error(EC_RES_INVALID_CHECKSUM);
        }
        if ec_result != 0 {
            return ec_error(ec_result);
        }
        data_len as i32
    }
}

impl EcMemory for LpcTransport {
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = unsafe { inb(EC_LPC_ADDR_MEMMAP + offset as u16 + i as u16) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_layout() {
        let header = build_request(0x3E01, 2, &[0xAB, 0xCD]);
        assert_eq!(header[0], EC_HOST_REQUEST_VERSION);
        assert_eq!(u16::from_le_bytes([header[2], header[3]]), 0x3E01);
        assert_eq!(header[4], 2);
        assert_eq!(header[5], 0);
        assert_eq!(u16::from_le_bytes([header[6], header[7]]), 2);
    }

    #[test]
    fn request_packet_sums_to_zero() {
        let data = [0x01, 0xFF, 0x7E];
        let header = build_request(0x0011, 0, &data);
        assert_eq!(packet_sum(&header, &data), 0);

        let header = build_request(0x0013, 0, &[]);
        assert_eq!(packet_sum(&header, &[]), 0);
    }

    #[test]
    fn response_sum_detects_corruption() {
        let data = [0x10, 0x20];
        let mut header = build_request(0x0012, 0, &data);
        header[1] = header[1].wrapping_add(1);
        assert_ne!(packet_sum(&header, &data), 0);
    }
}
