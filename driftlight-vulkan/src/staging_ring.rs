//! Per-frame staging ring: a single host-coherent, CPU-writable buffer that
//! every upload this frame (mesh vertices/indices, texture mips, GPU mirror
//! rewrites) bump-allocates from. Reset once per frame; nothing is freed
//! individually, which is why it is a ring and not a `RangeAllocator` —
//! uploads never outlive the frame that wrote them once the copy command has
//! been submitted.

use ash::vk;
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{Error, Result};

pub const DEFAULT_STAGING_RING_SIZE: u64 = 128 * 1024 * 1024;

/// Bytes reserved at the tail of the ring that ordinary uploads may not
/// consume, so a latency-sensitive copy (e.g. a readback-triggered bake)
/// issued later in the frame still has room.
const EMERGENCY_RESERVE: u64 = 4 * 1024 * 1024;

pub struct StagingRing {
    buffer: Buffer,
    capacity: u64,
    cursor: u64,
}

pub struct StagingAllocation {
    pub offset: u64,
    pub size: u64,
}

impl StagingRing {
    pub fn new(ctx: Arc<GpuContext>, capacity: u64) -> Result<Self> {
        let buffer = Buffer::new(
            ctx,
            capacity,
            vk::BufferUsageFlags::TRANSFER_SRC,
            gpu_allocator::MemoryLocation::CpuToGpu,
            "staging-ring",
        )?;
        Ok(Self { buffer, capacity, cursor: 0 })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Reset the bump cursor. Called once at the start of each frame, after
    /// the deletion queue confirms no in-flight copy still reads this ring's
    /// previous contents.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn can_fit(&self, size: u64, use_emergency_reserve: bool) -> bool {
        let limit = if use_emergency_reserve { self.capacity } else { self.capacity.saturating_sub(EMERGENCY_RESERVE) };
        self.cursor + size <= limit
    }

    /// Bump-allocate `size` bytes and copy `data` in. `use_emergency_reserve`
    /// lets latency-sensitive callers (DDGI bake readback) dip into the
    /// tail reserve; routine uploads should pass `false` and back off when
    /// `can_fit` returns false instead.
    pub fn write(&mut self, data: &[u8], use_emergency_reserve: bool) -> Result<StagingAllocation> {
        let size = data.len() as u64;
        if !self.can_fit(size, use_emergency_reserve) {
            return Err(Error::Core(driftlight_core::Error::OutOfMemory));
        }

        let offset = self.cursor;
        self.buffer.write(offset, data)?;
        self.cursor += size;
        Ok(StagingAllocation { offset, size })
    }

    pub fn used_bytes(&self) -> u64 {
        self.cursor
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn emergency_reserve_constant_is_smaller_than_default_ring_size() {
        assert!(super::EMERGENCY_RESERVE < super::DEFAULT_STAGING_RING_SIZE);
    }
}
