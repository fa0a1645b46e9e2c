//! Per-frame skinning cache and the flex/morph lookup seams.
//!
//! Software-blending the same pooled vertex for every decal batch it shows
//! up in would redo identical work; shadow passes and multi-material
//! models draw the same model several times a frame. The cache keeps the
//! blended result keyed by (mesh, vertex) and stamped with the frame and
//! the owning decal list, so entries invalidate by stamp instead of by
//! clearing.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

/// Per-frame flexed (morph-target) vertex data, already evaluated by the
/// host's model renderer for the model being drawn.
pub trait FlexSource {
    /// Flexed pose-space (position, normal) for a mesh vertex, if this
    /// frame's flex state moved it.
    fn flexed(&self, mesh: u16, vertex: u16) -> Option<(Vec3, Vec3)>;
}

/// Hardware-morph accumulator lookups for the model being drawn.
pub trait MorphSource {
    /// Texcoord into the morph accumulator for a mesh vertex. `None` means
    /// the vertex has no accumulator slot and must be skinned in software.
    fn morph_uv(&self, mesh: u16, vertex: u16) -> Option<Vec2>;
}

#[derive(Debug, Clone, Copy)]
struct CacheSlot {
    frame: u64,
    owner: u32,
    position: Vec3,
    normal: Vec3,
}

/// Blended-vertex cache. Valid entries match both the current frame stamp
/// and the decal list being drawn; everything else is stale by definition.
#[derive(Debug, Default)]
pub(crate) struct VertexTransformCache {
    slots: HashMap<(u16, u16), CacheSlot>,
    frame: u64,
    owner: u32,
}

impl VertexTransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the frame stamp. All existing entries become stale.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Scope lookups to one decal list. Mesh ids are model-local, so two
    /// instances of the same model must not share entries.
    pub fn begin_model(&mut self, owner: u32) {
        self.owner = owner;
    }

    pub fn get(&self, mesh: u16, vertex: u16) -> Option<(Vec3, Vec3)> {
        let slot = self.slots.get(&(mesh, vertex))?;
        (slot.frame == self.frame && slot.owner == self.owner)
            .then_some((slot.position, slot.normal))
    }

    pub fn insert(&mut self, mesh: u16, vertex: u16, position: Vec3, normal: Vec3) {
        self.slots.insert(
            (mesh, vertex),
            CacheSlot {
                frame: self.frame,
                owner: self.owner,
                position,
                normal,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_same_frame_and_owner() {
        let mut cache = VertexTransformCache::new();
        cache.begin_frame(1);
        cache.begin_model(3);
        cache.insert(0, 5, Vec3::X, Vec3::Y);
        assert_eq!(cache.get(0, 5), Some((Vec3::X, Vec3::Y)));
    }

    #[test]
    fn new_frame_invalidates() {
        let mut cache = VertexTransformCache::new();
        cache.begin_frame(1);
        cache.begin_model(3);
        cache.insert(0, 5, Vec3::X, Vec3::Y);
        cache.begin_frame(2);
        assert_eq!(cache.get(0, 5), None, "stale frame entry must miss");
    }

    #[test]
    fn other_model_instance_misses() {
        let mut cache = VertexTransformCache::new();
        cache.begin_frame(1);
        cache.begin_model(3);
        cache.insert(0, 5, Vec3::X, Vec3::Y);
        cache.begin_model(4);
        assert_eq!(cache.get(0, 5), None, "mesh ids are model-local");
    }
}
