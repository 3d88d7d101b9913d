//! Flash region plan
//!
//! Which byte ranges of the chip an update erases and writes, as a value the
//! state machine consumes. Bytes outside the listed regions are never
//! touched, which is how board-specific reserved areas (a secondary boot
//! region, factory data) survive the update. Alternate hardware targets
//! supply a different plan; the state machine does not change.

use thiserror::Error;

/// Expected firmware image size for the supported part (512 KiB).
pub const FLASH_IMAGE_SIZE: u32 = 512 * 1024;

/// One contiguous range of flash, named for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRegion {
    /// Name shown to the operator ("RO", "RW").
    pub name: &'static str,
    /// First byte offset covered.
    pub base: u32,
    /// Length in bytes.
    pub size: u32,
}

impl FlashRegion {
    /// One past the last byte offset covered.
    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    /// The matching sub-slice of a full-image buffer.
    pub fn slice<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.base as usize..self.end() as usize]
    }

    /// The matching mutable sub-slice of a full-image buffer.
    pub fn slice_mut<'a>(&self, image: &'a mut [u8]) -> &'a mut [u8] {
        &mut image[self.base as usize..self.end() as usize]
    }

    fn overlaps(&self, other: &FlashRegion) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

/// Plan invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A region has zero length.
    #[error("region {0} is empty")]
    EmptyRegion(&'static str),
    /// A region extends past the image.
    #[error("region {0} extends past the image")]
    OutOfBounds(&'static str),
    /// Two regions share bytes.
    #[error("regions {0} and {1} overlap")]
    Overlap(&'static str, &'static str),
}

/// The set of flash ranges one update touches, in strict update order.
///
/// Regions are erased, written, and verified in the order listed here; the
/// session never reorders or interleaves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    /// Expected size of both the firmware image and the flash part.
    pub image_size: u32,
    /// Regions in update order.
    pub regions: Vec<FlashRegion>,
}

impl RegionPlan {
    /// Plan for the supported 512 KiB EC flash part: RO then RW, with
    /// 0x3C000-0x3FFFF and 0x79000-0x7FFFF left untouched.
    pub fn framework() -> Self {
        Self {
            image_size: FLASH_IMAGE_SIZE,
            regions: vec![
                FlashRegion { name: "RO", base: 0x0, size: 0x3C000 },
                FlashRegion { name: "RW", base: 0x40000, size: 0x39000 },
            ],
        }
    }

    /// Check the plan invariants: no empty regions, everything inside the
    /// image, no overlap.
    pub fn validate(&self) -> core::result::Result<(), PlanError> {
        for r in &self.regions {
            if r.size == 0 {
                return Err(PlanError::EmptyRegion(r.name));
            }
            match r.base.checked_add(r.size) {
                Some(end) if end <= self.image_size => {}
                _ => return Err(PlanError::OutOfBounds(r.name)),
            }
        }
        for (i, a) in self.regions.iter().enumerate() {
            for b in &self.regions[i + 1..] {
                if a.overlaps(b) {
                    return Err(PlanError::Overlap(a.name, b.name));
                }
            }
        }
        Ok(())
    }
}
