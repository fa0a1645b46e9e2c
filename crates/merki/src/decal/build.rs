//! # Build — One `add_decal` Call, Start to Finish
//!
//! ```text
//! add_decal
//! ├── 1. validate handle + mesh count
//! ├── 2. projection basis from the ray (abort silently if degenerate)
//! ├── 3. make room (budget / global / per-model retirement)
//! ├── 4. scratch allocation: one region per participating mesh
//! └── 5. per LOD, root → max:
//!     ├── project each mesh once (shared scratch across LODs)
//!     ├── walk triangles: cull, trivially accept, or clip
//!     ├── dedup vertices into the pending run
//!     └── commit: ceiling retirement, append run + history entry
//! ```
//!
//! Vertex dedup works on stamps, not clears: every (LOD, mesh) walk takes
//! a fresh pass number, and a scratch entry's `pass`/`slot` pair only
//! counts when the stamp matches. The scratch itself is sized by summing
//! participating meshes' vertex counts and lives for one call.

use glam::Affine3A;

use crate::model::{MeshVertexData, ModelGeometry};

use super::clip::{clip_flags, clip_triangle, ClipVertex, MAX_CLIP_VERTS};
use super::pool::{
    self, DecalHistory, DecalVertex, LruEntry, RetireCause, MAX_MATERIAL_INDICES, NO_MESH_VERTEX,
};
use super::project::{
    project_mesh, BuildVertexInfo, DecalBasis, VERTEX_FRONT_FACING, VERTEX_IN_VALID_AREA,
};
use super::{DecalHandle, DecalRequest, DecalStore};

/// Models with this many meshes or more take no decals; scratch mesh
/// bookkeeping assumes mesh ids fit a byte-sized table.
pub(crate) const MAX_DECAL_MESHES: usize = 255;

/// Clip-generated vertices closer than this (position and normal, per
/// component) collapse into one pooled vertex.
pub(crate) const CLIP_MATCH_EPSILON: f32 = 1e-3;

/// Scratch slot assignment for one model-wide mesh id.
#[derive(Debug, Clone, Copy)]
enum MeshSlot {
    Unseen,
    Excluded,
    Base(u32),
}

/// Assign each participating mesh a base offset into the shared scratch,
/// walking LODs from the last down to the root so every mesh is decided
/// exactly once. Excluded meshes (suppressing materials, translucent
/// materials on two-pass models, absent vertex data) get no slot and never
/// receive decals.
fn compute_vertex_allocation(model: &ModelGeometry) -> (Vec<MeshSlot>, usize) {
    let mut slots = vec![MeshSlot::Unseen; model.meshes.len()];
    let mut total = 0usize;
    let root = model.root_lod.min(model.lods.len().saturating_sub(1));
    for lod in model.lods[root..].iter().rev() {
        for lod_mesh in &lod.meshes {
            let mid = lod_mesh.mesh as usize;
            let Some(slot) = slots.get(mid) else {
                continue;
            };
            if !matches!(slot, MeshSlot::Unseen) {
                continue;
            }
            let material = model.material(lod_mesh);
            let data = &model.meshes[mid];
            let excluded = material.no_decal
                || material.suppress_decals
                || (model.two_pass_translucent && material.translucent)
                || data.is_absent()
                || data.is_empty();
            slots[mid] = if excluded {
                MeshSlot::Excluded
            } else {
                let base = total as u32;
                total += data.len();
                MeshSlot::Base(base)
            };
        }
    }
    (slots, total)
}

/// Working state for one `add_decal` call.
struct DecalBuild<'a> {
    model: &'a ModelGeometry,
    bones: &'a [Affine3A],
    basis: DecalBasis,
    no_poke_thru: bool,
    slots: Vec<MeshSlot>,
    scratch: Vec<BuildVertexInfo>,
    projected: Vec<bool>,
    // Current (LOD, mesh) walk.
    mesh: u16,
    mesh_base: usize,
    mesh_len: usize,
    /// Multi-bone or flexed: clipping is only a cull test and surviving
    /// triangles are added whole (a clipped vertex would have no valid
    /// bone-weight interpolation).
    cull_only: bool,
    pass: u64,
    // Pending run for the current LOD.
    vertices: Vec<DecalVertex>,
    indices: Vec<u16>,
    clip_slots: Vec<u16>,
    tris_tested: u64,
    tris_clipped: u64,
    tris_emitted: u64,
}

impl<'a> DecalBuild<'a> {
    fn new(req: &DecalRequest<'a>, basis: DecalBasis) -> Self {
        let (slots, total) = compute_vertex_allocation(req.model);
        Self {
            model: req.model,
            bones: req.bones,
            basis,
            no_poke_thru: req.no_poke_thru,
            slots,
            scratch: vec![BuildVertexInfo::default(); total],
            projected: vec![false; req.model.meshes.len()],
            mesh: 0,
            mesh_base: 0,
            mesh_len: 0,
            cull_only: false,
            pass: 0,
            vertices: Vec::new(),
            indices: Vec::new(),
            clip_slots: Vec::new(),
            tris_tested: 0,
            tris_clipped: 0,
            tris_emitted: 0,
        }
    }

    fn scratch_base(&self, mesh: u16) -> Option<usize> {
        match self.slots.get(mesh as usize) {
            Some(MeshSlot::Base(base)) => Some(*base as usize),
            _ => None,
        }
    }

    fn begin_lod(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.clip_slots.clear();
    }

    /// Enter a (LOD, mesh) walk: project the mesh if this call hasn't yet,
    /// and start a fresh emit pass.
    fn begin_mesh(&mut self, mesh: u16, base: usize, pass: u64) {
        let model = self.model;
        let Some(data) = model.meshes.get(mesh as usize) else {
            self.mesh_len = 0;
            return;
        };
        self.mesh = mesh;
        self.mesh_base = base;
        self.mesh_len = data.len();
        self.pass = pass;
        if !self.projected[mesh as usize] {
            let region = &mut self.scratch[base..base + data.len()];
            project_mesh(region, data, self.bones, &self.basis);
            self.projected[mesh as usize] = true;
        }
    }

    fn set_group(&mut self, flexed: bool) {
        self.cull_only = self.model.bone_count > 1 || flexed;
    }

    fn add_triangle(&mut self, tri: [u16; 3]) {
        self.tris_tested += 1;
        if tri.iter().any(|&mv| (mv as usize) >= self.mesh_len) {
            return;
        }
        let infos = tri.map(|mv| self.scratch[self.mesh_base + mv as usize]);

        if infos.iter().any(|i| i.flags & VERTEX_FRONT_FACING == 0) {
            return;
        }
        if self.no_poke_thru && infos.iter().all(|i| i.flags & VERTEX_IN_VALID_AREA == 0) {
            return;
        }

        let cf = infos.map(|i| clip_flags(i.uv));
        if cf[0] & cf[1] & cf[2] != 0 {
            return;
        }
        let union = cf[0] | cf[1] | cf[2];
        if union == 0 {
            self.add_unclipped(tri);
            return;
        }
        // Partially outside. Per-vertex clipping only works when vertices
        // need no bone-weight data; a single inside vertex is also enough
        // to wave the whole triangle through (the sampler clamps).
        if !self.cull_only && cf.contains(&0) {
            self.add_unclipped(tri);
            return;
        }

        let model = self.model;
        let Some(data) = model.meshes.get(self.mesh as usize) else {
            return;
        };
        let cv = |k: usize| ClipVertex {
            position: data.position(tri[k] as usize),
            normal: data.normal(tri[k] as usize),
            uv: infos[k].uv,
            mesh_vertex: tri[k],
        };
        let poly = clip_triangle([cv(0), cv(1), cv(2)], union);
        self.tris_clipped += 1;
        if poly.is_culled() {
            return;
        }
        if self.cull_only {
            self.add_unclipped(tri);
            return;
        }

        let kept = poly.vertices();
        let mut slots = [0u16; MAX_CLIP_VERTS];
        for (i, v) in kept.iter().enumerate() {
            let slot = if v.mesh_vertex == NO_MESH_VERTEX {
                self.add_clip_vertex(v)
            } else {
                self.add_mesh_vertex(v.mesh_vertex)
            };
            let Some(slot) = slot else {
                return;
            };
            slots[i] = slot;
        }
        for i in 1..kept.len() - 1 {
            self.indices.extend_from_slice(&[slots[0], slots[i], slots[i + 1]]);
            self.tris_emitted += 1;
        }
    }

    fn add_unclipped(&mut self, tri: [u16; 3]) {
        let Some(s0) = self.add_mesh_vertex(tri[0]) else {
            return;
        };
        let Some(s1) = self.add_mesh_vertex(tri[1]) else {
            return;
        };
        let Some(s2) = self.add_mesh_vertex(tri[2]) else {
            return;
        };
        self.indices.extend_from_slice(&[s0, s1, s2]);
        self.tris_emitted += 1;
    }

    /// Emit a mesh-backed vertex, or reuse its slot if the current pass
    /// already emitted it.
    fn add_mesh_vertex(&mut self, mv: u16) -> Option<u16> {
        let at = self.mesh_base + mv as usize;
        if self.scratch[at].pass == self.pass {
            return Some(self.scratch[at].slot);
        }
        if self.vertices.len() >= NO_MESH_VERTEX as usize {
            return None;
        }
        let model = self.model;
        let data = model.meshes.get(self.mesh as usize)?;
        let slot = self.vertices.len() as u16;
        self.vertices.push(DecalVertex {
            position: data.position(mv as usize),
            normal: data.normal(mv as usize),
            uv: self.scratch[at].uv,
            mesh: self.mesh,
            mesh_vertex: mv,
        });
        self.scratch[at].pass = self.pass;
        self.scratch[at].slot = slot;
        Some(slot)
    }

    /// Emit a clip-generated vertex, deduplicating against the ones this
    /// decal already has. Only clip vertices are scanned; mesh-backed ones
    /// always match by index instead.
    fn add_clip_vertex(&mut self, v: &ClipVertex) -> Option<u16> {
        for &slot in &self.clip_slots {
            let have = &self.vertices[slot as usize];
            if have.position.abs_diff_eq(v.position, CLIP_MATCH_EPSILON)
                && have.normal.abs_diff_eq(v.normal, CLIP_MATCH_EPSILON)
            {
                return Some(slot);
            }
        }
        if self.vertices.len() >= NO_MESH_VERTEX as usize {
            return None;
        }
        let slot = self.vertices.len() as u16;
        self.vertices.push(DecalVertex {
            position: v.position,
            normal: v.normal,
            uv: v.uv,
            mesh: self.mesh,
            mesh_vertex: NO_MESH_VERTEX,
        });
        self.clip_slots.push(slot);
        Some(slot)
    }
}

impl DecalStore {
    /// Project a decal onto a model instance. Degenerate input, stale
    /// handles, and every budget overflow degrade silently; the only
    /// surfaced failure is a model with too many meshes.
    pub fn add_decal(&mut self, handle: DecalHandle, req: &DecalRequest) {
        // ── 1. Validate ─────────────────────────────────────────────────
        if !self.is_alive(handle) {
            return;
        }
        if req.model.meshes.len() >= MAX_DECAL_MESHES {
            log::warn!(
                "not decalling '{}': {} meshes (limit {})",
                req.model.name,
                req.model.meshes.len(),
                MAX_DECAL_MESHES
            );
            return;
        }

        // ── 2. Projection basis ─────────────────────────────────────────
        let Some(basis) = DecalBasis::from_ray(&req.ray, req.up, req.radius) else {
            return;
        };

        let last_lod = req.model.lods.len().saturating_sub(1);
        let root = req.model.root_lod.min(last_lod);
        let end = req.max_lod.min(last_lod);
        if req.model.lods.is_empty() || end < root {
            return;
        }

        // ── 3. Make room ────────────────────────────────────────────────
        self.enforce_budgets(handle);

        // ── 4. Scratch ──────────────────────────────────────────────────
        let mut build = DecalBuild::new(req, basis);

        // ── 5. Build + commit per LOD ───────────────────────────────────
        let Some(mut list) = self.take_list(handle) else {
            return;
        };
        let id = self.next_decal_id();
        let end = end.min(list.lods.len().saturating_sub(1));

        for lod_idx in root..=end {
            build.begin_lod();
            for lod_mesh in &req.model.lods[lod_idx].meshes {
                if !req.model.body_active(lod_mesh, req.body) {
                    continue;
                }
                let Some(base) = build.scratch_base(lod_mesh.mesh) else {
                    continue;
                };
                let pass = self.next_pass_stamp();
                build.begin_mesh(lod_mesh.mesh, base, pass);
                for group in &lod_mesh.groups {
                    build.set_group(group.flexed);
                    for tri in group.triangles() {
                        build.add_triangle(tri);
                    }
                }
            }

            // Commit, retiring this LOD's oldest decals while the target
            // bucket would blow its index ceiling.
            let pos = list.lods[lod_idx].material_position(req.material);
            while list.lods[lod_idx].materials[pos].indices.len() + build.indices.len()
                > MAX_MATERIAL_INDICES
            {
                let Some(oldest) = list.lods[lod_idx].history.front().map(|h| h.id) else {
                    break;
                };
                let freed = pool::retire_decal(&mut list, oldest);
                self.note_retired(oldest, freed, RetireCause::IndexCeiling);
            }
            list.lods[lod_idx].materials[pos].push_run(id, &build.vertices, &build.indices);
            list.lods[lod_idx].history.push_back(DecalHistory {
                id,
                material: req.material,
            });
            self.pooled_vertices += build.vertices.len();
        }

        // ── 6. Global bookkeeping ───────────────────────────────────────
        self.lru.push_back(LruEntry { id, handle });
        #[cfg(feature = "diagnostics")]
        {
            let stats = self.stats_mut();
            stats.decals_added += 1;
            stats.triangles_tested += build.tris_tested;
            stats.triangles_clipped += build.tris_clipped;
            stats.triangles_emitted += build.tris_emitted;
        }
        self.put_list(handle, list);
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::super::fixtures::{
        multi_lod_quad_model, quad_model, two_bone_quad_model, QUAD_CORNERS,
    };
    use super::super::pool::{DecalMaterial, NO_MESH_VERTEX};
    use super::super::{DecalHandle, DecalRequest, DecalStore};
    use super::*;
    use crate::config::DecalConfig;
    use crate::math::Ray;
    use crate::model::{BodyPart, LodGeometry, LodMesh, MaterialDesc, StripGroup};
    use crate::render::MaterialId;

    const SPLAT: MaterialId = MaterialId(42);

    /// Fire a decal at `center` (XY, world units) with the given radius,
    /// straight into the quad fixture's +Z face.
    fn request<'a>(model: &'a ModelGeometry, bones: &'a [Affine3A], center: Vec2, radius: f32) -> DecalRequest<'a> {
        DecalRequest {
            model,
            bones,
            ray: Ray::new(Vec3::new(center.x, center.y, 0.0), Vec3::NEG_Z),
            up: Vec3::Y,
            material: SPLAT,
            radius,
            body: 0,
            no_poke_thru: false,
            max_lod: usize::MAX,
        }
    }

    fn bucket(store: &DecalStore, handle: DecalHandle, lod: usize) -> &DecalMaterial {
        &store.lists[handle.index() as usize]
            .as_ref()
            .expect("list must be alive")
            .lods[lod]
            .materials[0]
    }

    #[test]
    fn full_cover_quad_dedups_to_four_vertices() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));

        let bucket = bucket(&store, handle, 0);
        assert_eq!(bucket.vertices.len(), 4, "shared edge must dedup");
        assert_eq!(bucket.indices.len(), 6);
        assert!(bucket.runs_aligned());
        // Corners land exactly on the square's corners.
        for (v, &[x, y]) in bucket.vertices.iter().zip(&QUAD_CORNERS) {
            let want = Vec2::new(x, y) / 2.0 + 0.5;
            assert!(
                (v.uv - want).length() < 1e-5,
                "corner ({x},{y}) mapped to {} not {want}",
                v.uv
            );
        }
        assert_eq!(store.decal_count(), 1);
        assert_eq!(store.pooled_vertex_bytes(), 4 * 36);
    }

    #[test]
    fn partial_overlap_single_bone_passes_whole_triangles() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // Centered on a quad corner: every triangle keeps a zero-flag
        // vertex, so nothing is actually clipped.
        store.add_decal(handle, &request(&model, &bones, Vec2::new(1.0, 1.0), 1.0));

        let bucket = bucket(&store, handle, 0);
        assert_eq!(bucket.vertices.len(), 4, "unclipped quad verts");
        assert_eq!(bucket.indices.len(), 6);
        assert!(
            bucket.vertices.iter().any(|v| v.uv.x < 0.0 || v.uv.y < 0.0),
            "pass-through vertices keep their out-of-square uvs"
        );
        assert!(
            bucket.vertices.iter().all(|v| v.mesh_vertex != NO_MESH_VERTEX),
            "no boundary vertices were generated"
        );
    }

    #[test]
    fn edge_decal_clips_when_no_vertex_is_inside() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // Small decal on the middle of the right edge: each triangle has
        // vertices outside on different planes, none inside.
        store.add_decal(handle, &request(&model, &bones, Vec2::new(1.0, 0.0), 0.4));

        let bucket = bucket(&store, handle, 0);
        assert!(!bucket.vertices.is_empty(), "decal must land");
        assert!(
            bucket.vertices.iter().any(|v| v.mesh_vertex == NO_MESH_VERTEX),
            "clipping must generate boundary vertices"
        );
        for v in &bucket.vertices {
            assert!(
                v.uv.x >= -1e-4 && v.uv.x <= 1.0 + 1e-4 && v.uv.y >= -1e-4 && v.uv.y <= 1.0 + 1e-4,
                "clipped geometry stays in the square, got {}",
                v.uv
            );
        }
        assert!(bucket.runs_aligned());
    }

    #[test]
    fn multi_bone_mesh_adds_original_triangles_only() {
        let mut store = DecalStore::default();
        let model = two_bone_quad_model();
        let bones = [Affine3A::IDENTITY, Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // Straddling decal: on a single-bone mesh this would clip.
        store.add_decal(handle, &request(&model, &bones, Vec2::new(1.0, 0.0), 0.4));

        let bucket = bucket(&store, handle, 0);
        assert!(!bucket.vertices.is_empty());
        assert!(
            bucket.vertices.iter().all(|v| v.mesh_vertex != NO_MESH_VERTEX),
            "multi-bone decals may not contain clip-generated vertices"
        );
        assert_eq!(bucket.indices.len() % 3, 0);
    }

    #[test]
    fn multi_bone_mesh_still_culls_misses() {
        let mut store = DecalStore::default();
        let model = two_bone_quad_model();
        let bones = [Affine3A::IDENTITY, Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        store.add_decal(handle, &request(&model, &bones, Vec2::new(10.0, 10.0), 0.5));

        assert_eq!(bucket(&store, handle, 0).vertices.len(), 0);
    }

    #[test]
    fn back_facing_triangles_never_emit() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // Shot from behind: the projection normal opposes every vertex
        // normal.
        let mut req = request(&model, &bones, Vec2::ZERO, 1.0);
        req.ray = Ray::new(Vec3::ZERO, Vec3::Z);
        store.add_decal(handle, &req);

        assert_eq!(bucket(&store, handle, 0).vertices.len(), 0);
    }

    #[test]
    fn poke_thru_suppression_rejects_deep_triangles() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // Impact point 5 units in front of the quad, radius 1: the quad is
        // far behind the valid slab.
        let mut req = request(&model, &bones, Vec2::ZERO, 1.0);
        req.ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        req.no_poke_thru = true;
        store.add_decal(handle, &req);
        assert_eq!(bucket(&store, handle, 0).vertices.len(), 0, "suppressed");

        req.no_poke_thru = false;
        store.add_decal(handle, &req);
        assert_eq!(
            bucket(&store, handle, 0).vertices.len(),
            4,
            "without suppression the decal projects through"
        );
    }

    #[test]
    fn degenerate_rays_change_nothing() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        let mut req = request(&model, &bones, Vec2::ZERO, 1.0);
        req.ray = Ray::new(Vec3::ZERO, Vec3::ZERO);
        store.add_decal(handle, &req);
        req.ray = Ray::new(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 0.0));
        store.add_decal(handle, &req);

        assert_eq!(store.decal_count(), 0);
        assert_eq!(store.pooled_vertex_bytes(), 0);
        let list = store.lists[handle.index() as usize].as_ref().unwrap();
        assert!(list.lods[0].materials.is_empty(), "no bucket was created");
    }

    #[test]
    fn too_many_meshes_is_a_noop() {
        let mut store = DecalStore::default();
        let mut model = quad_model();
        while model.meshes.len() < MAX_DECAL_MESHES {
            model.meshes.push(MeshVertexData::Absent);
        }
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        assert_eq!(store.decal_count(), 0);
    }

    #[test]
    fn suppressing_material_receives_no_geometry() {
        let mut store = DecalStore::default();
        let mut model = quad_model();
        model.materials[0].suppress_decals = true;
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        assert_eq!(store.pooled_vertex_bytes(), 0);
        assert_eq!(bucket(&store, handle, 0).vertices.len(), 0);
    }

    #[test]
    fn two_pass_translucency_excludes_translucent_meshes() {
        let bones = [Affine3A::IDENTITY];
        for (two_pass, expect_verts) in [(true, 0), (false, 4)] {
            let mut store = DecalStore::default();
            let mut model = quad_model();
            model.materials[0].translucent = true;
            model.two_pass_translucent = two_pass;
            let handle = store.create_decal_list(&model).unwrap();
            store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
            assert_eq!(
                bucket(&store, handle, 0).vertices.len(),
                expect_verts,
                "two_pass={two_pass}"
            );
        }
    }

    #[test]
    fn body_groups_select_the_projected_meshes() {
        let mut model = ModelGeometry::new("bodygroups", 1);
        model.materials.push(MaterialDesc::default());
        model.body_parts.push(BodyPart {
            base: 1,
            sub_model_count: 2,
        });
        // Two alternative meshes for the same body part, offset in X so a
        // centered decal hits whichever is active.
        for _ in 0..2 {
            model.meshes.push(quad_model().meshes[0].clone());
        }
        let mut lod = LodGeometry::default();
        for sub in 0..2u16 {
            let mut mesh = LodMesh::new(sub, 0, vec![StripGroup::triangle_list(
                vec![0, 1, 2, 3],
                vec![0, 1, 2, 0, 2, 3],
            )]);
            mesh.sub_model = sub;
            lod.meshes.push(mesh);
        }
        model.lods.push(lod);

        let bones = [Affine3A::IDENTITY];
        let mut store = DecalStore::default();
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));

        let bucket = bucket(&store, handle, 0);
        assert_eq!(bucket.vertices.len(), 4, "only the active sub-model");
        assert!(bucket.vertices.iter().all(|v| v.mesh == 0), "body 0 = mesh 0");
    }

    #[test]
    fn overflow_retires_oldest_first() {
        let mut store = DecalStore::new(DecalConfig {
            max_decals_per_model: 5,
            ..DecalConfig::default()
        });
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        // 1.6x the cap.
        for _ in 0..8 {
            store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        }

        assert_eq!(store.decal_count(), 5, "cap holds");
        let bucket = bucket(&store, handle, 0);
        assert!(bucket.runs_aligned(), "pools stay aligned through retirement");
        assert_eq!(bucket.decals.len(), 5);
        let ids: Vec<_> = bucket.decals.iter().map(|r| r.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "runs stay FIFO: {ids:?}");
        assert_eq!(ids[0], 4, "adds 1-3 were retired, 4 survives");
        assert_eq!(*ids.last().unwrap(), 8, "newest survives");
    }

    #[test]
    fn vertex_budget_evicts_globally_oldest() {
        // Room for six 36-byte vertices: two full quads, the third add
        // evicts the first.
        let mut store = DecalStore::new(DecalConfig {
            max_decals_per_model: 50,
            vertex_budget_bytes: 6 * 36,
        });
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let a = store.create_decal_list(&model).unwrap();
        let b = store.create_decal_list(&model).unwrap();

        store.add_decal(a, &request(&model, &bones, Vec2::ZERO, 1.0));
        store.add_decal(b, &request(&model, &bones, Vec2::ZERO, 1.0));
        store.add_decal(b, &request(&model, &bones, Vec2::ZERO, 1.0));

        assert_eq!(store.decal_count(), 2, "oldest decal was evicted");
        assert_eq!(bucket(&store, a, 0).vertices.len(), 0, "model A paid");
        assert_eq!(bucket(&store, b, 0).vertices.len(), 8, "model B kept both");
    }

    #[test]
    fn index_ceiling_holds_per_material() {
        let mut store = DecalStore::new(DecalConfig {
            max_decals_per_model: 1000,
            vertex_budget_bytes: 64 * 1024 * 1024,
        });
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        for _ in 0..400 {
            store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        }

        let bucket = bucket(&store, handle, 0);
        assert!(
            bucket.indices.len() <= MAX_MATERIAL_INDICES,
            "ceiling breached: {} indices",
            bucket.indices.len()
        );
        assert!(bucket.runs_aligned());
        // 6 indices per decal, so the bucket holds exactly 341 decals.
        assert_eq!(store.decal_count(), MAX_MATERIAL_INDICES / 6);
    }

    #[test]
    fn lods_each_get_their_own_run() {
        let mut store = DecalStore::default();
        let model = multi_lod_quad_model(3);
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));

        for lod in 0..3 {
            assert_eq!(bucket(&store, handle, lod).vertices.len(), 4, "lod {lod}");
        }
        assert_eq!(store.decal_count(), 1, "one logical decal across LODs");
        assert_eq!(store.pooled_vertex_bytes(), 3 * 4 * 36);
    }

    #[test]
    fn max_lod_limits_how_deep_decals_go() {
        let mut store = DecalStore::default();
        let model = multi_lod_quad_model(3);
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        let mut req = request(&model, &bones, Vec2::ZERO, 1.0);
        req.max_lod = 1;
        store.add_decal(handle, &req);

        let list = store.lists[handle.index() as usize].as_ref().unwrap();
        assert_eq!(list.lods[0].history.len(), 1);
        assert_eq!(list.lods[1].history.len(), 1);
        assert_eq!(list.lods[2].history.len(), 0, "lod 2 is past max_lod");
    }

    #[test]
    #[cfg(feature = "diagnostics")]
    fn stats_track_adds_and_retirements() {
        let mut store = DecalStore::new(DecalConfig {
            max_decals_per_model: 2,
            ..DecalConfig::default()
        });
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        for _ in 0..3 {
            store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        }

        let stats = store.stats();
        assert_eq!(stats.decals_added, 3);
        assert_eq!(stats.retired_model_count, 1);
        assert_eq!(stats.triangles_tested, 6, "two triangles per add");
        assert_eq!(stats.triangles_emitted, 6);
        assert_eq!(stats.triangles_clipped, 0, "full covers never clip");
    }

    #[test]
    fn stale_handle_add_is_a_noop() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.destroy_decal_list(handle);

        store.add_decal(handle, &request(&model, &bones, Vec2::ZERO, 1.0));
        assert_eq!(store.decal_count(), 0);
    }
}
