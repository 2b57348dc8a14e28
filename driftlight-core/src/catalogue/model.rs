use crate::ids::AssetId;

/// Named, ordered sequence of mesh ids. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: AssetId,
    pub name: String,
    pub mesh_ids: Vec<AssetId>,
}

impl Model {
    pub fn new(id: AssetId, name: impl Into<String>, mesh_ids: Vec<AssetId>) -> Self {
        Self { id, name: name.into(), mesh_ids }
    }
}
