//! CPU-side mesh representation produced by the OBJ loader.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: position, normal, uv. 8 floats, 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub const FLOATS: usize = 8;

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A contiguous slice of the index buffer drawn with one texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialRange {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

impl MaterialRange {
    #[inline]
    pub fn indices(&self) -> Range<u32> {
        self.start..self.end
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Immutable triangle mesh. One vertex per face corner, so
/// `indices.len() == vertices.len()` for meshes built by the OBJ loader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// In declaration order; partitions `first.start..indices.len()`.
    pub materials: Vec<MaterialRange>,
}

impl Mesh {
    pub fn new(
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        materials: Vec<MaterialRange>,
    ) -> Self {
        Self {
            vertices,
            indices,
            materials,
        }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Indices declared before the first `usemtl`. They belong to no
    /// material and are never drawn with a texture.
    pub fn unassigned_range(&self) -> Range<u32> {
        let end = self
            .materials
            .first()
            .map_or(self.index_count(), |m| m.start);
        0..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_eight_tightly_packed_floats() {
        assert_eq!(
            std::mem::size_of::<MeshVertex>(),
            MeshVertex::FLOATS * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn unassigned_range_stops_at_first_material() {
        let mesh = Mesh::new(
            vec![MeshVertex::default(); 6],
            (0..6).collect(),
            vec![MaterialRange {
                name: "stone".into(),
                start: 3,
                end: 6,
            }],
        );
        assert!(mesh.is_valid());
        assert_eq!(mesh.unassigned_range(), 0..3);

        let bare = Mesh::new(vec![MeshVertex::default(); 3], vec![0, 1, 2], Vec::new());
        assert_eq!(bare.unassigned_range(), 0..3);
    }
}
