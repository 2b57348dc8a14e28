//! Error types shared by the whole Driftlight workspace.
//!
//! Mirrors the shape used throughout this codebase: a flat enum with a
//! `Display` impl, no `anyhow`/`eyre` indirection. The Vulkan backend wraps
//! this same enum rather than inventing its own.

use std::fmt;

/// Result type for Driftlight operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Driftlight errors.
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, DirectX, etc.)
    BackendError(String),

    /// Out of GPU memory, or a sub-allocator could not find a fit.
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, mesh, etc.)
    InvalidResource(String),

    /// Initialization failed (engine, renderer, subsystems).
    InitializationFailed(String),

    /// A lookup by id found nothing, or an id was already in use.
    UnknownId(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "backend error: {msg}"),
            Error::OutOfMemory => write!(f, "out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "invalid resource: {msg}"),
            Error::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Error::UnknownId(msg) => write!(f, "unknown id: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        assert_eq!(Error::OutOfMemory.to_string(), "out of GPU memory");
        assert_eq!(
            Error::UnknownId("mesh-42".into()).to_string(),
            "unknown id: mesh-42"
        );
    }
}
