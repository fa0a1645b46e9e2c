//! # Renderer Seam — Where Decal Geometry Leaves the Engine
//!
//! The decal engine never talks to a GPU. It assembles finished vertex and
//! index batches and hands them to a [`MeshSink`], which the host renderer
//! implements over whatever dynamic-mesh path it has (a `wgpu` queue write,
//! an immediate-mode mesh builder, a command-buffer recorder). Tests use
//! [`RecordingSink`].
//!
//! ## Memory Layout
//!
//! ```text
//! DecalDrawVertex (88 bytes)
//! ┌────────────┬────────────┬──────────┬──────────┬──────────┐
//! │ position   │ normal     │ uv       │ morph_uv │ color    │
//! │ [f32; 3]   │ [f32; 3]   │ [f32; 2] │ [f32; 2] │ [f32; 4] │
//! │ offset 0   │ offset 12  │ off 24   │ off 32   │ off 40   │
//! ├────────────┴──────┬─────┴──────────┴─┬────────┴──────────┘
//! │ bone_weights      │ bone_indices     │
//! │ [f32; 4]          │ [u32; 4]         │
//! │ offset 56         │ offset 72        │
//! └───────────────────┴──────────────────┘
//! ```
//!
//! Every vertex carries the full attribute set even on paths that don't use
//! all of it: software-skinned decals leave `morph_uv` at zero and pin the
//! weights to bone 0, the hardware-morph path fills everything in. One
//! layout means one pipeline per material on the renderer side.

use bytemuck::{Pod, Zeroable};

/// Opaque handle to a material owned by the host's material system. The
/// engine only compares and forwards these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// One finished decal vertex, ready for a dynamic vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DecalDrawVertex {
    pub position: [f32; 3],     // 12 bytes
    pub normal: [f32; 3],       // 12 bytes
    pub uv: [f32; 2],           // 8 bytes
    pub morph_uv: [f32; 2],     // 8 bytes
    pub color: [f32; 4],        // 16 bytes
    pub bone_weights: [f32; 4], // 16 bytes
    pub bone_indices: [u32; 4], // 16 bytes → total 88
}

impl DecalDrawVertex {
    /// Untextured white, rigid to bone 0. Paths fill in what they need.
    pub const fn blank() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            uv: [0.0; 2],
            morph_uv: [0.0; 2],
            color: [1.0; 4],
            bone_weights: [1.0, 0.0, 0.0, 0.0],
            bone_indices: [0; 4],
        }
    }
}

/// Receiver for assembled decal batches.
///
/// Calls arrive in bind/draw order: `bind_material` once per batch, then
/// one `draw` with that batch's vertices and triangle-list indices. Indices
/// are local to the `vertices` slice.
pub trait MeshSink {
    fn bind_material(&mut self, material: MaterialId);
    fn draw(&mut self, vertices: &[DecalDrawVertex], indices: &[u16]);
}

/// One batch captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub material: MaterialId,
    pub vertices: Vec<DecalDrawVertex>,
    pub indices: Vec<u16>,
}

impl RecordedBatch {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A [`MeshSink`] that records batches instead of submitting them. Used by
/// tests and headless tools; also handy for capturing a frame's decal
/// geometry for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub batches: Vec<RecordedBatch>,
    current: Option<MaterialId>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.current = None;
    }

    pub fn total_vertices(&self) -> usize {
        self.batches.iter().map(|b| b.vertices.len()).sum()
    }

    pub fn total_triangles(&self) -> usize {
        self.batches.iter().map(|b| b.triangle_count()).sum()
    }
}

impl MeshSink for RecordingSink {
    fn bind_material(&mut self, material: MaterialId) {
        self.current = Some(material);
    }

    fn draw(&mut self, vertices: &[DecalDrawVertex], indices: &[u16]) {
        let material = self.current.unwrap_or(MaterialId(u32::MAX));
        self.batches.push(RecordedBatch {
            material,
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_vertex_is_88_bytes() {
        assert_eq!(std::mem::size_of::<DecalDrawVertex>(), 88);
    }

    #[test]
    fn draw_vertex_casts_to_bytes() {
        let verts = [DecalDrawVertex::blank(); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&verts);
        assert_eq!(bytes.len(), 3 * 88);
    }

    #[test]
    fn recording_sink_tags_batches_with_bound_material() {
        let mut sink = RecordingSink::new();
        sink.bind_material(MaterialId(7));
        sink.draw(&[DecalDrawVertex::blank()], &[0, 0, 0]);
        sink.bind_material(MaterialId(9));
        sink.draw(&[], &[]);
        assert_eq!(sink.batches.len(), 2);
        assert_eq!(sink.batches[0].material, MaterialId(7));
        assert_eq!(sink.batches[1].material, MaterialId(9));
    }
}
