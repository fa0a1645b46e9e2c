//! # Decals — Projected Splats on Skinned Models
//!
//! A decal is a square of texture fired along a ray at a model instance:
//! a paint splat, a scorch mark, a footprint. This module owns the whole
//! lifecycle:
//!
//! ```text
//! add_decal(ray, radius, material)
//!   │ 1. projection basis {U,V,N} from the ray        (project)
//!   │ 2. skin + project each mesh's vertices to uv    (project)
//!   │ 3. clip each triangle to the decal square       (clip)
//!   │ 4. dedup vertices, accumulate runs per LOD      (build)
//!   ▼ 5. commit runs into per-material pools          (pool)
//! draw_decals(lod, sink)
//!   ▼ 6. re-skin pooled runs, re-base indices, emit   (draw)
//! ```
//!
//! Pools are bounded: a per-model decal cap, a global vertex budget, and a
//! per-material index ceiling all retire the oldest decals first. Between
//! frames the geometry persists in pose space, so a decal sticks to the
//! model through animation.
//!
//! ## Comparison
//!
//! | approach | where it clips | skinned models |
//! |----------|----------------|----------------|
//! | **Screen-space (deferred) decals** | never (projected in the pixel shader) | smear under motion, cheap |
//! | **World/brush decals** | against static world polygons once | n/a |
//! | **Ours (mesh decals)** | against mesh triangles at add time | re-skinned per frame, stick perfectly |
//!
//! Screen-space decals win on throughput for static geometry; mesh decals
//! are what you want when the splat has to ride a running character.

mod build;
mod cache;
mod clip;
mod draw;
mod pool;
mod project;

#[cfg(test)]
mod fixtures;

use std::collections::VecDeque;
use std::fmt;

use glam::Vec3;

use crate::config::DecalConfig;
use crate::math::Ray;
use crate::model::ModelGeometry;
use crate::render::MaterialId;

pub use cache::{FlexSource, MorphSource};
pub use draw::DrawRequest;

use cache::VertexTransformCache;
use pool::{DecalId, DecalModelList, LruEntry, RetiredGeometry, GLOBAL_LRU_SLACK};

pub(crate) use pool::RetireCause;

#[cfg(feature = "diagnostics")]
use crate::diag::DecalStats;

/// Handle to one model instance's decal state.
///
/// Generation-counted: destroying a list bumps its slot's generation, so a
/// stale handle held by game code goes inert instead of touching whatever
/// reused the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecalHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl DecalHandle {
    /// Returns the raw slot index. Useful for diagnostics, not for general use.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation. Useful for diagnostics.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for DecalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecalHandle({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for DecalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Everything one [`DecalStore::add_decal`] call needs.
#[derive(Clone, Copy)]
pub struct DecalRequest<'a> {
    /// Geometry of the model instance the handle was created for.
    pub model: &'a ModelGeometry,
    /// Pose-to-world transform per bone, in the model's bone order.
    pub bones: &'a [glam::Affine3A],
    /// Impact point and direction into the surface.
    pub ray: Ray,
    /// Up hint orienting the decal square around the ray.
    pub up: Vec3,
    /// Render material of the splat itself.
    pub material: MaterialId,
    /// Half-width of the decal square, world units.
    pub radius: f32,
    /// Body configuration; meshes outside it receive nothing.
    pub body: u32,
    /// Reject triangles entirely deeper than `radius` (stops the decal
    /// bleeding through onto geometry behind thin walls).
    pub no_poke_thru: bool,
    /// Coarsest LOD to build decals for. Pass `usize::MAX` for all.
    pub max_lod: usize,
}

/// Owns every model's decal state, the global LRU, and the budgets.
///
/// All methods take `&mut self`; wrap the store in a `Mutex` if multiple
/// threads add decals.
pub struct DecalStore {
    config: DecalConfig,
    lists: Vec<Option<DecalModelList>>,
    /// One generation per slot ever allocated. Index with `DecalHandle::index`.
    generations: Vec<u32>,
    /// Slots available for reuse.
    free: Vec<u32>,
    /// Oldest decal store-wide at the front.
    lru: VecDeque<LruEntry>,
    next_id: DecalId,
    /// Emit-pass stamp source for build-time vertex dedup.
    next_pass: u64,
    frame: u64,
    cache: VertexTransformCache,
    /// Pooled decal vertices across every list (budget gauge).
    pooled_vertices: usize,
    #[cfg(feature = "diagnostics")]
    stats: DecalStats,
}

impl DecalStore {
    pub fn new(config: DecalConfig) -> Self {
        Self {
            config,
            lists: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            lru: VecDeque::new(),
            next_id: 1,
            next_pass: 1,
            frame: 1,
            cache: VertexTransformCache::new(),
            pooled_vertices: 0,
            #[cfg(feature = "diagnostics")]
            stats: DecalStats::default(),
        }
    }

    pub fn config(&self) -> &DecalConfig {
        &self.config
    }

    /// Create decal state for a model instance. `None` if the model has no
    /// LODs to put decals on.
    pub fn create_decal_list(&mut self, model: &ModelGeometry) -> Option<DecalHandle> {
        if model.lods.is_empty() {
            return None;
        }
        let list = DecalModelList::new(model.lods.len(), model.root_lod);
        let handle = match self.free.pop() {
            Some(index) => DecalHandle {
                index,
                generation: self.generations[index as usize],
            },
            None => {
                let index = self.lists.len() as u32;
                self.lists.push(None);
                self.generations.push(0);
                DecalHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.lists[handle.index as usize] = Some(list);
        Some(handle)
    }

    /// Free a model's decal state. Stale handles are ignored.
    pub fn destroy_decal_list(&mut self, handle: DecalHandle) {
        let Some(slot) = self.slot_of(handle) else {
            return;
        };
        if let Some(list) = self.lists[slot].take() {
            self.pooled_vertices = self.pooled_vertices.saturating_sub(list.pooled_vertices());
        }
        self.lru.retain(|e| e.handle != handle);
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(handle.index);
    }

    /// Remove every decal from a model but keep its list alive.
    pub fn clear_decals(&mut self, handle: DecalHandle) {
        let Some(slot) = self.slot_of(handle) else {
            return;
        };
        if let Some(list) = self.lists[slot].as_mut() {
            let freed = list.clear();
            self.pooled_vertices = self.pooled_vertices.saturating_sub(freed);
        }
        self.lru.retain(|e| e.handle != handle);
    }

    /// Whether a handle still points at a live decal list.
    pub fn is_alive(&self, handle: DecalHandle) -> bool {
        self.slot_of(handle)
            .is_some_and(|slot| self.lists[slot].is_some())
    }

    /// Advance the frame stamp. Invalidates the per-frame skinning cache;
    /// call once per rendered frame.
    pub fn begin_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        self.cache.begin_frame(self.frame);
    }

    /// Live decal lists.
    pub fn list_count(&self) -> usize {
        self.lists.iter().filter(|l| l.is_some()).count()
    }

    /// Live decals across every model.
    pub fn decal_count(&self) -> usize {
        self.lru.len()
    }

    /// Pooled decal vertices across every model, in bytes.
    pub fn pooled_vertex_bytes(&self) -> usize {
        self.pooled_vertices * std::mem::size_of::<pool::DecalVertex>()
    }

    // ── Internals shared by build/draw ──────────────────────────────────

    /// Slot for a live, generation-matching handle.
    fn slot_of(&self, handle: DecalHandle) -> Option<usize> {
        let slot = handle.index as usize;
        (self
            .generations
            .get(slot)
            .is_some_and(|g| *g == handle.generation))
        .then_some(slot)
    }

    /// Detach a model's list for mutation without pinning `self`:
    /// extract, operate, reinsert. Budgets and the LRU stay reachable
    /// while the list is out.
    pub(crate) fn take_list(&mut self, handle: DecalHandle) -> Option<DecalModelList> {
        let slot = self.slot_of(handle)?;
        self.lists[slot].take()
    }

    pub(crate) fn put_list(&mut self, handle: DecalHandle, list: DecalModelList) {
        if let Some(slot) = self.slot_of(handle) {
            self.lists[slot] = Some(list);
        }
    }

    /// Book a retirement that already excised geometry from a list.
    pub(crate) fn note_retired(&mut self, id: DecalId, freed: RetiredGeometry, cause: RetireCause) {
        self.lru.retain(|e| e.id != id);
        self.pooled_vertices = self.pooled_vertices.saturating_sub(freed.vertices);
        #[cfg(feature = "diagnostics")]
        self.stats.count_retire(cause);
        #[cfg(not(feature = "diagnostics"))]
        let _ = cause;
    }

    /// Retire one decal wherever it lives.
    fn retire(&mut self, handle: DecalHandle, id: DecalId, cause: RetireCause) {
        let freed = match self.slot_of(handle).and_then(|s| self.lists[s].as_mut()) {
            Some(list) => pool::retire_decal(list, id),
            None => RetiredGeometry::default(),
        };
        self.note_retired(id, freed, cause);
    }

    /// The vertex budget expressed in pooled vertices.
    fn max_pooled_vertices(&self) -> usize {
        self.config.vertex_budget_bytes / std::mem::size_of::<pool::DecalVertex>()
    }

    /// Make room before committing a new decal: vertex budget first, then
    /// the global count slack, then this model's own cap.
    pub(crate) fn enforce_budgets(&mut self, handle: DecalHandle) {
        let max_vertices = self.max_pooled_vertices();
        while self.pooled_vertices > max_vertices {
            let Some(front) = self.lru.front().copied() else {
                break;
            };
            self.retire(front.handle, front.id, RetireCause::VertexBudget);
        }

        let slack = (self.config.max_decals_per_model as f32 * GLOBAL_LRU_SLACK) as usize;
        if self.lru.len() > slack {
            if let Some(front) = self.lru.front().copied() {
                self.retire(front.handle, front.id, RetireCause::GlobalCount);
            }
        }

        let model_oldest = self
            .slot_of(handle)
            .and_then(|s| self.lists[s].as_ref())
            .filter(|list| list.decal_count() >= self.config.max_decals_per_model)
            .and_then(|list| list.oldest());
        if let Some(id) = model_oldest {
            self.retire(handle, id, RetireCause::ModelCount);
        }
    }

    pub(crate) fn next_decal_id(&mut self) -> DecalId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn next_pass_stamp(&mut self) -> u64 {
        let pass = self.next_pass;
        self.next_pass += 1;
        pass
    }
}

impl Default for DecalStore {
    fn default() -> Self {
        Self::new(DecalConfig::default())
    }
}

#[cfg(feature = "diagnostics")]
impl DecalStore {
    /// Monotonic engine counters.
    pub fn stats(&self) -> &DecalStats {
        &self.stats
    }

    /// Point-in-time snapshot for export (see [`crate::diag`]).
    pub fn snapshot(&self) -> crate::diag::DecalSnapshot {
        crate::diag::DecalSnapshot {
            frame: self.frame,
            list_count: self.list_count(),
            decal_count: self.decal_count(),
            pooled_vertex_bytes: self.pooled_vertex_bytes(),
            vertex_budget_bytes: self.config.vertex_budget_bytes,
            max_decals_per_model: self.config.max_decals_per_model,
            stats: self.stats.clone(),
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut DecalStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ModelGeometry {
        fixtures::quad_model()
    }

    #[test]
    fn create_rejects_model_without_lods() {
        let mut store = DecalStore::default();
        let empty = ModelGeometry::new("empty", 1);
        assert!(store.create_decal_list(&empty).is_none());
    }

    #[test]
    fn create_allocates_sequential_slots() {
        let mut store = DecalStore::default();
        let model = quad();
        let a = store.create_decal_list(&model).unwrap();
        let b = store.create_decal_list(&model).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(store.list_count(), 2);
    }

    #[test]
    fn destroy_recycles_slot_with_bumped_generation() {
        let mut store = DecalStore::default();
        let model = quad();
        let a = store.create_decal_list(&model).unwrap();
        store.destroy_decal_list(a);
        assert!(!store.is_alive(a), "stale handle must die");
        let b = store.create_decal_list(&model).unwrap();
        assert_eq!(b.index(), 0); // same slot
        assert_eq!(b.generation(), 1); // bumped
        assert!(!store.is_alive(a), "old handle stays dead after reuse");
        assert!(store.is_alive(b));
    }

    #[test]
    fn stale_handle_ops_are_noops() {
        let mut store = DecalStore::default();
        let model = quad();
        let a = store.create_decal_list(&model).unwrap();
        store.destroy_decal_list(a);
        // None of these may panic or resurrect anything.
        store.destroy_decal_list(a);
        store.clear_decals(a);
        assert_eq!(store.list_count(), 0);
    }
}
