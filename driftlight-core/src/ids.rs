//! Opaque identifiers for catalogue assets.
//!
//! `AssetId` is a 128-bit value with a nil state, generated from a
//! process-local counter plus a per-process random seed (no external UUID
//! dependency — the corpus favors small hand-rolled value types for this).
//! It is never parsed from or round-tripped through text, so the exact bit
//! layout is an implementation detail: callers only compare, hash, and
//! check `is_nil()`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque 128-bit asset identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct AssetId {
    hi: u64,
    lo: u64,
}

static COUNTER: AtomicU64 = AtomicU64::new(1);

fn process_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E3779B97F4A7C15)
}

impl AssetId {
    /// The nil id: never returned by [`AssetId::generate`].
    pub const NIL: AssetId = AssetId { hi: 0, lo: 0 };

    /// Generate a new, process-unique id.
    pub fn generate() -> Self {
        let lo = COUNTER.fetch_add(1, Ordering::Relaxed);
        AssetId { hi: process_seed(), lo }
    }

    pub fn is_nil(&self) -> bool {
        *self == AssetId::NIL
    }

    /// Reconstruct an id from its raw 128-bit value, e.g. when reading one
    /// back out of a scene file. Callers must only ever pass back a value
    /// obtained from [`AssetId::raw`].
    pub fn from_raw(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    pub fn raw(&self) -> (u64, u64) {
        (self.hi, self.lo)
    }
}

impl Default for AssetId {
    fn default() -> Self {
        AssetId::NIL
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// A 32-m world tile, indexed by integer `(x, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    pub x: i32,
    pub z: i32,
}

impl TileIndex {
    pub const TILE_SIZE: f32 = 32.0;

    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The tile containing world-space point `(x, z)`.
    pub fn from_world_xz(x: f32, z: f32) -> Self {
        Self {
            x: (x / Self::TILE_SIZE).floor() as i32,
            z: (z / Self::TILE_SIZE).floor() as i32,
        }
    }

    /// Chebyshev distance to another tile (the radius of the smallest
    /// square window containing both).
    pub fn chebyshev_distance(&self, other: &TileIndex) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_never_nil_and_are_unique() {
        let a = AssetId::generate();
        let b = AssetId::generate();
        assert!(!a.is_nil());
        assert!(!b.is_nil());
        assert_ne!(a, b);
    }

    #[test]
    fn default_is_nil() {
        assert_eq!(AssetId::default(), AssetId::NIL);
    }

    #[test]
    fn tile_index_from_world_xz_floors_toward_negative_infinity() {
        assert_eq!(TileIndex::from_world_xz(0.0, 0.0), TileIndex::new(0, 0));
        assert_eq!(TileIndex::from_world_xz(31.9, 0.0), TileIndex::new(0, 0));
        assert_eq!(TileIndex::from_world_xz(32.1, 0.0), TileIndex::new(1, 0));
        assert_eq!(TileIndex::from_world_xz(-0.1, 0.0), TileIndex::new(-1, 0));
    }

    #[test]
    fn chebyshev_distance_is_the_max_axis_delta() {
        let a = TileIndex::new(0, 0);
        let b = TileIndex::new(3, -5);
        assert_eq!(a.chebyshev_distance(&b), 5);
    }
}
