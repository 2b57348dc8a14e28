use crate::ids::AssetId;

/// Described for completeness: the renderer does not sample animations
/// itself, it consumes pre-interpolated joint globals from the animation
/// updater and writes them into the skeleton buffer. The catalogue only
/// needs enough of the asset to track residency and forward add/remove to
/// that external updater.
#[derive(Debug, Clone)]
pub struct Animation {
    pub id: AssetId,
    pub name: String,
    pub duration_seconds: f32,
}

impl Animation {
    pub fn new(id: AssetId, name: impl Into<String>, duration_seconds: f32) -> Self {
        Self { id, name: name.into(), duration_seconds }
    }
}

/// Drives one renderable's current animation playback state. The catalogue
/// stores these only to forward updates to the external animation updater;
/// it never advances time itself.
#[derive(Debug, Clone)]
pub struct Animator {
    pub renderable: AssetId,
    pub animation: AssetId,
    pub time_seconds: f32,
    pub looping: bool,
}
