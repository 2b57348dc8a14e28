use crate::ids::{AssetId, TileIndex};

/// GPU-facing record for one paged world tile: `{index, ddgi_atlas}`.
#[derive(Debug, Clone, Copy)]
pub struct TileInfo {
    pub index: TileIndex,
    pub ddgi_atlas: Option<AssetId>,
}

impl TileInfo {
    pub fn new(index: TileIndex) -> Self {
        Self { index, ddgi_atlas: None }
    }
}
