//! # Decal Pools — Bounded Geometry Storage per Model
//!
//! Every model instance with decals owns one [`DecalModelList`]: per LOD, a
//! set of material buckets plus a FIFO history of the decals committed
//! there. A bucket's vertex and index pools are flat vectors partitioned
//! into contiguous per-decal runs, oldest run first:
//!
//! ```text
//! DecalMaterial (one per render material per LOD)
//! vertices: [ run #12 ..... | run #17 ... | run #23 ....... ]
//! indices:  [ run #12 ... | run #17 .. | run #23 ..... ]   (run-local, u16)
//! decals:   [ {id:12, vc, ic} {id:17, vc, ic} {id:23, vc, ic} ]
//! ```
//!
//! Retirement only ever removes the *head* run. That is cheap (one `drain`
//! from the front) and stays correct because decals retire oldest-first
//! model-wide: an id picked for retirement sits at the head of every LOD
//! history it appears in, and the head of a LOD history is always the head
//! run of its bucket.

use std::collections::VecDeque;

use glam::{Vec2, Vec3};

use crate::render::MaterialId;

use super::DecalHandle;

/// Monotonic id shared by one decal's runs across all LODs it landed on.
pub(crate) type DecalId = u64;

/// Mesh-vertex sentinel for vertices the clipper generated on a boundary.
pub(crate) const NO_MESH_VERTEX: u16 = 0xFFFF;

/// Hard ceiling on a single material bucket's index count per LOD.
pub(crate) const MAX_MATERIAL_INDICES: usize = 2048;

/// The global decal count may exceed the per-model cap by this factor
/// before the oldest decal anywhere gets retired.
pub(crate) const GLOBAL_LRU_SLACK: f32 = 1.5;

/// Why a decal was retired. Feeds logging and the diagnostics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetireCause {
    VertexBudget,
    GlobalCount,
    ModelCount,
    IndexCeiling,
}

/// A pooled decal vertex in pose space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecalVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// Model-wide mesh id this vertex came from.
    pub mesh: u16,
    /// Mesh vertex index, or [`NO_MESH_VERTEX`] for clip-generated ones.
    pub mesh_vertex: u16,
}

/// One decal's slice of a bucket: how many of the pooled vertices and
/// indices belong to it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecalRun {
    pub id: DecalId,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// History entry: which bucket a decal's run went into, in commit order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecalHistory {
    pub id: DecalId,
    pub material: MaterialId,
}

/// Global LRU entry. Oldest decal store-wide sits at the front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LruEntry {
    pub id: DecalId,
    pub handle: DecalHandle,
}

/// Pooled geometry for one render material on one LOD.
#[derive(Debug)]
pub(crate) struct DecalMaterial {
    pub material: MaterialId,
    pub vertices: Vec<DecalVertex>,
    pub indices: Vec<u16>,
    pub decals: VecDeque<DecalRun>,
}

impl DecalMaterial {
    fn new(material: MaterialId) -> Self {
        Self {
            material,
            vertices: Vec::new(),
            indices: Vec::new(),
            decals: VecDeque::new(),
        }
    }

    /// Append one decal's run. Indices must be run-local (first vertex of
    /// this run = 0).
    pub fn push_run(&mut self, id: DecalId, vertices: &[DecalVertex], indices: &[u16]) {
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        self.decals.push_back(DecalRun {
            id,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        });
    }

    /// Remove the head run, returning (vertices, indices) freed.
    fn excise_head(&mut self) -> (usize, usize) {
        let Some(run) = self.decals.pop_front() else {
            return (0, 0);
        };
        let vc = (run.vertex_count as usize).min(self.vertices.len());
        let ic = (run.index_count as usize).min(self.indices.len());
        self.vertices.drain(..vc);
        self.indices.drain(..ic);
        (vc, ic)
    }

    /// Run bookkeeping matches the pools: the run counts sum exactly to
    /// the pool lengths.
    pub fn runs_aligned(&self) -> bool {
        let vc: usize = self.decals.iter().map(|r| r.vertex_count as usize).sum();
        let ic: usize = self.decals.iter().map(|r| r.index_count as usize).sum();
        vc == self.vertices.len() && ic == self.indices.len()
    }
}

/// Decal state for one LOD of one model instance.
#[derive(Debug, Default)]
pub(crate) struct DecalLod {
    pub materials: Vec<DecalMaterial>,
    pub history: VecDeque<DecalHistory>,
}

impl DecalLod {
    fn new() -> Self {
        Self::default()
    }

    /// Index of the bucket for `material`, creating it on first use.
    /// Buckets persist once created; they just run empty after retirement.
    pub fn material_position(&mut self, material: MaterialId) -> usize {
        match self.materials.iter().position(|m| m.material == material) {
            Some(pos) => pos,
            None => {
                self.materials.push(DecalMaterial::new(material));
                self.materials.len() - 1
            }
        }
    }

    fn material_mut(&mut self, material: MaterialId) -> Option<&mut DecalMaterial> {
        self.materials.iter_mut().find(|m| m.material == material)
    }
}

/// All decal state for one model instance.
#[derive(Debug)]
pub(crate) struct DecalModelList {
    pub lods: Vec<DecalLod>,
    pub root_lod: usize,
}

impl DecalModelList {
    pub fn new(lod_count: usize, root_lod: usize) -> Self {
        Self {
            lods: (0..lod_count).map(|_| DecalLod::new()).collect(),
            root_lod: root_lod.min(lod_count.saturating_sub(1)),
        }
    }

    /// Live decal count. Every decal lands on the root LOD, so its history
    /// length is the model's decal count.
    pub fn decal_count(&self) -> usize {
        self.lods.get(self.root_lod).map_or(0, |l| l.history.len())
    }

    /// Oldest decal on this model, if any.
    pub fn oldest(&self) -> Option<DecalId> {
        self.lods
            .get(self.root_lod)
            .and_then(|l| l.history.front())
            .map(|h| h.id)
    }

    /// Total pooled vertices across all LODs and buckets.
    pub fn pooled_vertices(&self) -> usize {
        self.lods
            .iter()
            .flat_map(|l| l.materials.iter())
            .map(|m| m.vertices.len())
            .sum()
    }

    /// Drop every decal but keep the list (and its buckets) alive.
    /// Returns the number of pooled vertices freed.
    pub fn clear(&mut self) -> usize {
        let freed = self.pooled_vertices();
        for lod in &mut self.lods {
            lod.history.clear();
            for bucket in &mut lod.materials {
                bucket.vertices.clear();
                bucket.indices.clear();
                bucket.decals.clear();
            }
        }
        freed
    }
}

/// Geometry freed by one retirement.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RetiredGeometry {
    pub vertices: usize,
    pub indices: usize,
}

/// Retire `id` from every LOD where it sits at the history head, excising
/// the head run of the bucket it committed to. LODs where the id is absent
/// (it never reached them) or buried mid-history (a ceiling retirement on
/// another LOD got ahead of it) are left alone; a buried id finishes
/// retiring once it ages to the head.
pub(crate) fn retire_decal(list: &mut DecalModelList, id: DecalId) -> RetiredGeometry {
    let mut freed = RetiredGeometry::default();
    for lod in &mut list.lods {
        if !lod.history.front().is_some_and(|h| h.id == id) {
            continue;
        }
        let Some(entry) = lod.history.pop_front() else {
            continue;
        };
        if let Some(bucket) = lod.material_mut(entry.material) {
            let (vc, ic) = bucket.excise_head();
            freed.vertices += vc;
            freed.indices += ic;
        }
    }
    freed
}
