//! GPU-side mesh: interleaved vertex buffer, u32 index buffer, material ranges.

use std::ops::Range;

use asset::mesh::{MaterialRange, Mesh, MeshVertex};
use wgpu::{
    Buffer, BufferAddress, BufferUsages, Device, Queue, RenderPass, VertexBufferLayout,
    VertexStepMode, util::DeviceExt,
};

/// Locations 0/1/2 = position/normal/uv, stride 8 floats.
pub const MESH_VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: std::mem::size_of::<MeshVertex>() as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
};

/// How a replacement was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// Existing allocation rewritten; handles unchanged.
    InPlace,
    /// New allocation; old one released.
    Reallocated,
}

/// Rewrite in place when the new contents fit the existing allocation.
#[inline]
pub fn plan_replacement(capacity: BufferAddress, needed: BufferAddress) -> Replacement {
    if needed <= capacity {
        Replacement::InPlace
    } else {
        Replacement::Reallocated
    }
}

struct SizedBuffer {
    buffer: Buffer,
    capacity: BufferAddress,
}

impl SizedBuffer {
    fn new(device: &Device, label: &str, contents: &[u8], usage: BufferUsages) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: usage | BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            capacity: contents.len() as BufferAddress,
        }
    }

    fn replace(
        &mut self,
        device: &Device,
        queue: &Queue,
        label: &str,
        contents: &[u8],
        usage: BufferUsages,
    ) -> Replacement {
        let plan = plan_replacement(self.capacity, contents.len() as BufferAddress);
        match plan {
            Replacement::InPlace => queue.write_buffer(&self.buffer, 0, contents),
            Replacement::Reallocated => {
                self.buffer.destroy();
                *self = Self::new(device, label, contents, usage);
            }
        }
        plan
    }
}

pub struct GpuMesh {
    label: String,
    vertices: SizedBuffer,
    indices: SizedBuffer,
    index_count: u32,
    materials: Vec<MaterialRange>,
}

impl GpuMesh {
    pub fn upload(device: &Device, label: &str, mesh: &Mesh) -> Self {
        Self {
            label: label.to_owned(),
            vertices: SizedBuffer::new(
                device,
                &format!("{label} VB"),
                bytemuck::cast_slice(&mesh.vertices),
                BufferUsages::VERTEX,
            ),
            indices: SizedBuffer::new(
                device,
                &format!("{label} IB"),
                bytemuck::cast_slice(&mesh.indices),
                BufferUsages::INDEX,
            ),
            index_count: mesh.index_count(),
            materials: mesh.materials.clone(),
        }
    }

    /// Swap in new geometry. Must run on the render thread. Returns the
    /// vertex and index buffer outcomes.
    pub fn replace(
        &mut self,
        device: &Device,
        queue: &Queue,
        mesh: &Mesh,
    ) -> (Replacement, Replacement) {
        let vb = self.vertices.replace(
            device,
            queue,
            &format!("{} VB", self.label),
            bytemuck::cast_slice(&mesh.vertices),
            BufferUsages::VERTEX,
        );
        let ib = self.indices.replace(
            device,
            queue,
            &format!("{} IB", self.label),
            bytemuck::cast_slice(&mesh.indices),
            BufferUsages::INDEX,
        );
        self.index_count = mesh.index_count();
        self.materials = mesh.materials.clone();
        (vb, ib)
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn materials(&self) -> &[MaterialRange] {
        &self.materials
    }

    pub fn bind(&self, pass: &mut RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertices.buffer.slice(..));
        pass.set_index_buffer(self.indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    /// Draw `range` of the index buffer. The buffers must already be bound.
    pub fn draw_range(&self, pass: &mut RenderPass<'_>, range: Range<u32>) {
        debug_assert!(range.end <= self.index_count);
        pass.draw_indexed(range, 0, 0..1);
    }
}
