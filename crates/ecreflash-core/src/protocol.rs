//! Host-command flash driver
//!
//! Expresses region erase/write/read as EC host commands over any
//! [`EcTransport`]. Writes and reads are chunked to the host packet payload
//! budget; the first negative result from any chunk ends the operation with
//! that result, leaving the remainder untouched.

use crate::ec::{
    EcMemory, EcTransport, FlashAccess, EC_CMD_FLASH_ERASE, EC_CMD_FLASH_READ, EC_CMD_FLASH_WRITE,
};

/// Largest data payload carried by one flash read or write command. The
/// host packet window is 256 bytes; headers and the offset/size parameters
/// take the rest.
pub const FLASH_CHUNK: usize = 0xC0;

/// Byte length of the offset/size parameter block.
const PARAMS_LEN: usize = 8;

fn params(offset: u32, size: u32) -> [u8; PARAMS_LEN] {
    let mut p = [0u8; PARAMS_LEN];
    p[..4].copy_from_slice(&offset.to_le_bytes());
    p[4..].copy_from_slice(&size.to_le_bytes());
    p
}

/// [`FlashAccess`] over an [`EcTransport`].
///
/// Wraps any transport and adds the flash command encoding; the transport
/// itself stays reachable for notification commands and telemetry reads.
pub struct HostFlash<T> {
    transport: T,
}

impl<T> HostFlash<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Give the transport back.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: EcTransport> FlashAccess for HostFlash<T> {
    fn erase(&mut self, offset: u32, len: u32) -> i32 {
        log::debug!("flash erase 0x{:X}+0x{:X}", offset, len);
        self.transport
            .send(EC_CMD_FLASH_ERASE, 0, &params(offset, len), &mut [])
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> i32 {
        log::debug!("flash write 0x{:X}+0x{:X}", offset, data.len());
        let mut request = [0u8; PARAMS_LEN + FLASH_CHUNK];
        let mut sent = 0usize;
        while sent < data.len() {
            let chunk = (data.len() - sent).min(FLASH_CHUNK);
            let at = offset + sent as u32;
            request[..PARAMS_LEN].copy_from_slice(&params(at, chunk as u32));
            request[PARAMS_LEN..PARAMS_LEN + chunk].copy_from_slice(&data[sent..sent + chunk]);
            let rv = self
                .transport
                .send(EC_CMD_FLASH_WRITE, 0, &request[..PARAMS_LEN + chunk], &mut []);
            if rv < 0 {
                return rv;
            }
            sent += chunk;
        }
        0
    }

    fn read(&mut self, offset: u32, out: &mut [u8]) -> i32 {
        log::debug!("flash read 0x{:X}+0x{:X}", offset, out.len());
        let total = out.len();
        let mut done = 0usize;
        while done < total {
            let chunk = (total - done).min(FLASH_CHUNK);
            let at = offset + done as u32;
            let rv = self.transport.send(
                EC_CMD_FLASH_READ,
                0,
                &params(at, chunk as u32),
                &mut out[done..done + chunk],
            );
            if rv < 0 {
                return rv;
            }
            done += chunk;
        }
        total as i32
    }
}

impl<T: EcTransport> EcTransport for HostFlash<T> {
    fn send(&mut self, command: u16, version: u8, request: &[u8], response: &mut [u8]) -> i32 {
        self.transport.send(command, version, request, response)
    }
}

impl<T: EcMemory> EcMemory for HostFlash<T> {
    fn read_mapped(&mut self, offset: u8, out: &mut [u8]) {
        self.transport.read_mapped(offset, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport that records every command and answers success.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(u16, Vec<u8>)>,
        fail_from: Option<usize>,
    }

    impl EcTransport for RecordingTransport {
        fn send(&mut self, command: u16, _version: u8, request: &[u8], response: &mut [u8]) -> i32 {
            self.sent.push((command, request.to_vec()));
            if self.fail_from.is_some_and(|n| self.sent.len() > n) {
                return -1002;
            }
            response.fill(0xEC);
            response.len() as i32
        }
    }

    fn decode_params(request: &[u8]) -> (u32, u32) {
        let offset = u32::from_le_bytes(request[..4].try_into().unwrap());
        let size = u32::from_le_bytes(request[4..8].try_into().unwrap());
        (offset, size)
    }

    #[test]
    fn erase_is_a_single_command() {
        let mut flash = HostFlash::new(RecordingTransport::default());
        assert_eq!(flash.erase(0x1000, 0x4000), 0);

        let transport = flash.into_inner();
        assert_eq!(transport.sent.len(), 1);
        let (command, request) = &transport.sent[0];
        assert_eq!(*command, EC_CMD_FLASH_ERASE);
        assert_eq!(decode_params(request), (0x1000, 0x4000));
    }

    #[test]
    fn write_chunks_carry_ascending_offsets() {
        let mut flash = HostFlash::new(RecordingTransport::default());
        let data = vec![0xA5u8; FLASH_CHUNK * 2 + 10];
        assert_eq!(flash.write(0x400, &data), 0);

        let transport = flash.into_inner();
        assert_eq!(transport.sent.len(), 3);
        let expect = [
            (0x400, FLASH_CHUNK as u32),
            (0x400 + FLASH_CHUNK as u32, FLASH_CHUNK as u32),
            (0x400 + 2 * FLASH_CHUNK as u32, 10),
        ];
        for ((command, request), (offset, size)) in transport.sent.iter().zip(expect) {
            assert_eq!(*command, EC_CMD_FLASH_WRITE);
            assert_eq!(decode_params(request), (offset, size));
            assert_eq!(request.len(), PARAMS_LEN + size as usize);
        }
    }

    #[test]
    fn read_covers_the_whole_buffer() {
        let mut flash = HostFlash::new(RecordingTransport::default());
        let mut out = vec![0u8; FLASH_CHUNK + 1];
        assert_eq!(flash.read(0, &mut out), (FLASH_CHUNK + 1) as i32);
        assert!(out.iter().all(|&b| b == 0xEC));

        let transport = flash.into_inner();
        assert_eq!(transport.sent.len(), 2);
        assert_eq!(decode_params(&transport.sent[1].1), (FLASH_CHUNK as u32, 1));
    }

    #[test]
    fn chunk_failure_stops_the_transfer() {
        let mut transport = RecordingTransport::default();
        transport.fail_from = Some(1);
        let mut flash = HostFlash::new(transport);
        let data = vec![0u8; FLASH_CHUNK * 4];
        assert_eq!(flash.write(0, &data), -1002);
        // First chunk succeeded, second failed, nothing after.
        assert_eq!(flash.into_inner().sent.len(), 2);
    }
}
