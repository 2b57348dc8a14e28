//! Deterministic in-memory stand-in for the parts of the Vulkan backend
//! whose logic (allocation bookkeeping, back-pressure, dirty-flag timing)
//! doesn't actually need a GPU to exercise. Counters replace real handles so
//! catalogue/upload-queue/deletion-queue/pager tests run without a device or
//! validation layer, `#[cfg(test)]`-only per the design notes.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockGraphicsDevice {
    pub buffers_created: u32,
    pub images_created: u32,
    pub descriptor_writes: u32,
    pub accel_structures_built: u32,
    next_handle: u64,
    buffer_contents: HashMap<u64, Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockBufferHandle(u64);

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_buffer(&mut self, size: usize) -> MockBufferHandle {
        self.buffers_created += 1;
        let handle = MockBufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffer_contents.insert(handle.0, vec![0u8; size]);
        handle
    }

    pub fn write_buffer(&mut self, handle: MockBufferHandle, offset: usize, data: &[u8]) {
        if let Some(contents) = self.buffer_contents.get_mut(&handle.0) {
            contents[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    pub fn read_buffer(&self, handle: MockBufferHandle) -> Option<&[u8]> {
        self.buffer_contents.get(&handle.0).map(|v| v.as_slice())
    }

    pub fn create_image(&mut self) {
        self.images_created += 1;
    }

    pub fn record_descriptor_write(&mut self) {
        self.descriptor_writes += 1;
    }

    pub fn record_accel_structure_build(&mut self) {
        self.accel_structures_built += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_through_the_mock_backing_store() {
        let mut device = MockGraphicsDevice::new();
        let handle = device.create_buffer(16);
        device.write_buffer(handle, 4, &[1, 2, 3, 4]);
        assert_eq!(device.read_buffer(handle).unwrap()[4..8], [1, 2, 3, 4]);
    }

    #[test]
    fn every_texture_upload_reserves_a_slot_and_writes_every_frame_set() {
        let mut device = MockGraphicsDevice::new();
        device.create_image();
        for _ in 0..3 {
            device.record_descriptor_write();
        }
        assert_eq!(device.images_created, 1);
        assert_eq!(device.descriptor_writes, 3);
    }
}
