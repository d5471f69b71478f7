use crate::types::FrameType;

/// Failure reported by a texture, shader, or model implementation.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("out of GPU memory: {0}")]
    OutOfMemory(String),
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("GPU validation failed: {0}")]
    Validation(String),
    #[error("frame buffer holds {actual} bytes, layout needs {expected}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("pitch {pitch} is smaller than a {width} pixel row")]
    InvalidPitch { width: u32, pitch: u32 },
    #[error("texture has not been set up")]
    NotConfigured,
}

/// Failures surfaced by [`crate::DesktopController`].
#[derive(Debug, thiserror::Error)]
pub enum DesktopError {
    #[error("out of memory while creating the {resource}")]
    Allocation {
        resource: &'static str,
        #[source]
        source: ResourceError,
    },
    #[error("failed to initialize the {resource}")]
    ResourceInit {
        resource: &'static str,
        #[source]
        source: ResourceError,
    },
    #[error("unsupported frame format {0}")]
    UnsupportedFormat(FrameType),
    #[error("no source format has been resolved yet")]
    NoSourceFormat,
    #[error("failed to set up the desktop texture")]
    TextureSetup(#[source] ResourceError),
    #[error("failed to update the desktop texture")]
    TextureUpload(#[source] ResourceError),
}

impl DesktopError {
    /// Classifies a creation failure; out-of-memory is kept apart from the rest.
    pub(crate) fn init(resource: &'static str, source: ResourceError) -> Self {
        match source {
            ResourceError::OutOfMemory(_) => DesktopError::Allocation { resource, source },
            source => DesktopError::ResourceInit { resource, source },
        }
    }

    /// True for the conditions the caller may retry on the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DesktopError::UnsupportedFormat(_)
                | DesktopError::NoSourceFormat
                | DesktopError::TextureSetup(_)
                | DesktopError::TextureUpload(_)
        )
    }
}
