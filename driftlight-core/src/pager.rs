//! Selects which 32-m world tiles are paged in around the camera.
//!
//! The pager itself holds no scene-node references — the source engine's
//! `PageStatus` component lives on scene nodes the renderer doesn't own.
//! Instead [`Pager::step`] reports, as plain tile-index sets, which tiles
//! just entered or left the paged window; the caller (orchestrator) is
//! responsible for paging/unpaging the nodes in those tiles and folding
//! the result into an [`crate::catalogue::AssetUpdate`].

use std::collections::HashSet;
use crate::ids::TileIndex;

/// Result of one [`Pager::step`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingDiff {
    pub newly_paged_in: Vec<TileIndex>,
    pub newly_paged_out: Vec<TileIndex>,
}

impl PagingDiff {
    pub fn is_empty(&self) -> bool {
        self.newly_paged_in.is_empty() && self.newly_paged_out.is_empty()
    }
}

pub struct Pager {
    page_radius: i32,
    paged: HashSet<TileIndex>,
}

impl Pager {
    pub fn new(page_radius: i32) -> Self {
        Self { page_radius: page_radius.max(0), paged: HashSet::new() }
    }

    pub fn paged_tiles(&self) -> impl Iterator<Item = &TileIndex> {
        self.paged.iter()
    }

    pub fn is_paged(&self, tile: TileIndex) -> bool {
        self.paged.contains(&tile)
    }

    /// Recompute the `(2*page_radius+1)^2` window around `camera_world_xz`
    /// and return which tiles newly entered or left it.
    pub fn step(&mut self, camera_world_x: f32, camera_world_z: f32) -> PagingDiff {
        let center = TileIndex::from_world_xz(camera_world_x, camera_world_z);
        let mut window = HashSet::new();
        for dx in -self.page_radius..=self.page_radius {
            for dz in -self.page_radius..=self.page_radius {
                window.insert(TileIndex::new(center.x + dx, center.z + dz));
            }
        }

        let newly_paged_in: Vec<TileIndex> = window.difference(&self.paged).copied().collect();
        let newly_paged_out: Vec<TileIndex> = self.paged.difference(&window).copied().collect();

        self.paged = window;

        PagingDiff { newly_paged_in, newly_paged_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_pages_in_the_whole_window_and_pages_out_nothing() {
        let mut pager = Pager::new(1);
        let diff = pager.step(0.0, 0.0);
        assert_eq!(diff.newly_paged_in.len(), 9);
        assert!(diff.newly_paged_out.is_empty());
    }

    #[test]
    fn repeating_the_same_position_is_a_no_op() {
        let mut pager = Pager::new(1);
        pager.step(0.0, 0.0);
        let diff = pager.step(0.0, 0.0);
        assert!(diff.is_empty());
    }

    #[test]
    fn moving_one_tile_over_pages_out_the_trailing_edge() {
        let mut pager = Pager::new(1);
        pager.step(0.0, 0.0);
        // one full tile step in +x (tile size 32 m)
        let diff = pager.step(TileIndex::TILE_SIZE, 0.0);
        assert!(!diff.newly_paged_in.is_empty());
        assert!(!diff.newly_paged_out.is_empty());
        // trailing column x = -1 should have paged out
        assert!(diff.newly_paged_out.iter().any(|t| t.x == -1));
        // leading column x = 2 should have paged in
        assert!(diff.newly_paged_in.iter().any(|t| t.x == 2));
    }

    #[test]
    fn radius_zero_only_pages_the_camera_tile() {
        let mut pager = Pager::new(0);
        let diff = pager.step(5.0, 5.0);
        assert_eq!(diff.newly_paged_in, vec![TileIndex::new(0, 0)]);
    }
}
