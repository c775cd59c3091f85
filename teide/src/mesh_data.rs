//! Mesh payloads and vertex layouts.

use glam::Vec3;

use crate::buffer_data::ResourceLifetime;
use crate::format::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexClass {
    #[default]
    PerVertex,
    PerInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexBufferBinding {
    pub binding: u32,
    pub stride: u32,
    pub vertex_class: VertexClass,
}

/// One vertex attribute. The shader-side location is found by name in the
/// shader's vertex input list when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub format: Format,
    pub buffer_index: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexLayout {
    pub topology: PrimitiveTopology,
    pub buffer_bindings: Vec<VertexBufferBinding>,
    pub attributes: Vec<VertexAttribute>,
}

/// Axis-aligned bounding box of a mesh's vertices.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Host-side mesh contents. Index data, when present, is 16-bit.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub lifetime: ResourceLifetime,
    pub vertex_layout: VertexLayout,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub vertex_count: u32,
    pub aabb: Aabb,
}
