//! Buffer creation descriptors.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    #[default]
    Generic,
}

/// How long a resource is expected to live.
///
/// Permanent resources live until their last handle drops. Transient
/// resources are bounded by the frame they are created in and are released
/// when the frame slot they belong to is recycled, two frames later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceLifetime {
    #[default]
    Permanent,
    Transient,
}

#[derive(Debug, Clone, Default)]
pub struct BufferData {
    pub usage: BufferUsage,
    pub lifetime: ResourceLifetime,
    pub data: Vec<u8>,
}

impl BufferData {
    pub fn new(usage: BufferUsage, lifetime: ResourceLifetime, data: impl Into<Vec<u8>>) -> Self {
        Self { usage, lifetime, data: data.into() }
    }
}
