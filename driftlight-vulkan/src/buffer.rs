//! Generic GPU buffer wrapper: a `vk::Buffer` plus its `gpu_allocator`
//! allocation. Every higher-level buffer in this crate (giga-buffer,
//! staging ring, scene UBOs) is built from one of these rather than
//! touching `ash`/`gpu_allocator` directly.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::{Error, Result};

pub struct Buffer {
    ctx: Arc<GpuContext>,
    pub(crate) handle: vk::Buffer,
    allocation: Option<Allocation>,
    pub(crate) size: u64,
}

impl Buffer {
    pub fn new(
        ctx: Arc<GpuContext>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        label: &str,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { ctx.device.create_buffer(&create_info, None).map_err(Error::Vulkan)? };
        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(handle) };

        let allocation = {
            let mut allocator = ctx.allocator.lock().map_err(|_| Error::DeviceLost("allocator mutex poisoned".into()))?;
            allocator
                .allocate(&AllocationCreateDesc {
                    name: label,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| Error::DeviceLost(e.to_string()))?
        };

        unsafe {
            ctx.device
                .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
                .map_err(Error::Vulkan)?;
        }

        Ok(Self { ctx, handle, allocation: Some(allocation), size })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn device_address(&self) -> u64 {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.handle);
        unsafe { self.ctx.device.get_buffer_device_address(&info) }
    }

    /// Write `data` at `offset` bytes into a host-visible buffer. Panics in
    /// debug builds are avoided in favour of an explicit error — calling
    /// this on a device-local (non-mapped) buffer is a caller bug, not a
    /// recoverable runtime condition, but we still return `Result` so the
    /// upload queue can log and skip rather than crash an interactive frame.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| Error::Core(driftlight_core::Error::InvalidResource("buffer has no allocation".into())))?;
        let mapped = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::Core(driftlight_core::Error::InvalidResource("buffer is not host-visible".into())))?
            .as_ptr() as *mut u8;

        if offset + data.len() as u64 > self.size {
            return Err(Error::Core(driftlight_core::Error::InvalidResource(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            ))));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    /// Read `len` bytes at `offset` from a host-visible (mapped) buffer.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| Error::Core(driftlight_core::Error::InvalidResource("buffer has no allocation".into())))?;
        let mapped = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::Core(driftlight_core::Error::InvalidResource("buffer is not host-visible".into())))?
            .as_ptr() as *const u8;

        if offset + len > self.size {
            return Err(Error::Core(driftlight_core::Error::InvalidResource(format!(
                "read of {len} bytes at offset {offset} exceeds buffer size {}",
                self.size
            ))));
        }

        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.add(offset as usize), out.as_mut_ptr(), len as usize);
        }
        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.ctx.allocator.lock() {
                allocator.free(allocation).ok();
            }
        }
        unsafe { self.ctx.device.destroy_buffer(self.handle, None) };
    }
}
