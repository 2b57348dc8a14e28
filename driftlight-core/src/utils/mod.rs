//! Small index/range allocators shared by the catalogue and the GPU backend.

mod slot_allocator;
mod range_allocator;

pub use slot_allocator::SlotAllocator;
pub use range_allocator::{RangeAllocator, Allocation};
