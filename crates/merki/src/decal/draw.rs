//! # Draw — Re-skinning Pooled Decals into Batches
//!
//! Pooled decal geometry is pose-space; every frame it has to catch up
//! with the animated model. The skinning path is picked once per draw
//! call:
//!
//! ```text
//! morph source supplied ───────────────► HardwareMorph
//! else, bone_count ≤ 1 ┬─ no flex ─────► Identity
//!                      └─ flex ────────► IdentityFlexed
//! else (multi-bone)    ┬─ no flex ─────► SoftwareBlend
//!                      └─ flex ────────► SoftwareBlendFlexed
//! ```
//!
//! Every path except `HardwareMorph` leaves the engine in world space with
//! the weights pinned to bone 0; hosts draw those batches with an identity
//! palette. A `HardwareMorph` batch is uniformly pose-space with real
//! per-vertex weights and indices, so one batch never mixes spaces.
//!
//! Bucket indices are run-local (each decal's indices count from its own
//! first vertex). Emitting walks the runs head-first and re-bases by the
//! vertices already emitted, which stays correct across head retirements.

use glam::{Affine3A, Vec2, Vec3};

use crate::model::{BoneWeights, ModelGeometry, MAX_VERTEX_BONES};
use crate::render::{DecalDrawVertex, MaterialId, MeshSink};

use super::cache::{FlexSource, MorphSource, VertexTransformCache};
use super::pool::{DecalVertex, NO_MESH_VERTEX};
use super::project::skin_vertex;
use super::{DecalHandle, DecalStore};

/// World-unit offset along the skinned normal applied by the software
/// blend paths, lifting the decal off the hardware-skinned base mesh it
/// only approximates.
pub(crate) const SKIN_NUDGE: f32 = 0.1;

/// How pooled vertices get from pose space to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkinPath {
    Identity,
    IdentityFlexed,
    SoftwareBlend,
    SoftwareBlendFlexed,
    HardwareMorph,
}

impl SkinPath {
    fn choose(model: &ModelGeometry, flexed: bool, morphed: bool) -> Self {
        if morphed {
            Self::HardwareMorph
        } else if model.bone_count <= 1 {
            if flexed {
                Self::IdentityFlexed
            } else {
                Self::Identity
            }
        } else if flexed {
            Self::SoftwareBlendFlexed
        } else {
            Self::SoftwareBlend
        }
    }
}

/// Everything one [`DecalStore::draw_decals`] call needs.
#[derive(Clone, Copy)]
pub struct DrawRequest<'a> {
    /// Geometry of the model instance being drawn.
    pub model: &'a ModelGeometry,
    /// Pose-to-world transform per bone, as used to draw the base mesh.
    pub bones: &'a [Affine3A],
    /// LOD being rendered this frame.
    pub lod: usize,
    /// This frame's flex results, when the model renderer evaluated any.
    pub flex: Option<&'a dyn FlexSource>,
    /// Morph accumulator lookups, when hardware morphing is on for this
    /// LOD.
    pub morph: Option<&'a dyn MorphSource>,
    /// Bind this instead of each bucket's material (debug wireframe).
    pub material_override: Option<MaterialId>,
}

impl DecalStore {
    /// Assemble and emit this model's decals for one LOD, one batch per
    /// non-empty material bucket. Stale handles and out-of-range LODs are
    /// no-ops.
    pub fn draw_decals(&mut self, handle: DecalHandle, req: &DrawRequest, sink: &mut dyn MeshSink) {
        let Some(slot) = self.slot_of(handle) else {
            return;
        };
        let Some(list) = self.lists[slot].as_ref() else {
            return;
        };
        let Some(lod) = list.lods.get(req.lod) else {
            return;
        };

        let path = SkinPath::choose(req.model, req.flex.is_some(), req.morph.is_some());
        self.cache.begin_model(handle.index);

        let mut vertices: Vec<DecalDrawVertex> = Vec::new();
        let mut indices: Vec<u16> = Vec::new();
        for bucket in &lod.materials {
            if bucket.indices.is_empty() {
                continue;
            }
            vertices.clear();
            indices.clear();
            vertices.reserve(bucket.vertices.len());
            indices.reserve(bucket.indices.len());

            for v in &bucket.vertices {
                vertices.push(emit_vertex(&mut self.cache, req, path, v));
            }
            let mut base = 0u32;
            let mut cursor = 0usize;
            for run in &bucket.decals {
                let end = (cursor + run.index_count as usize).min(bucket.indices.len());
                for &i in &bucket.indices[cursor..end] {
                    indices.push((u32::from(i) + base) as u16);
                }
                cursor = end;
                base += run.vertex_count;
            }

            sink.bind_material(req.material_override.unwrap_or(bucket.material));
            sink.draw(&vertices, &indices);
            #[cfg(feature = "diagnostics")]
            {
                self.stats.draw_calls += 1;
                self.stats.draw_vertices += vertices.len() as u64;
            }
        }
    }

    /// Decals on a static prop: one transform, no skinning, no flexes.
    pub fn draw_static_prop_decals(
        &mut self,
        handle: DecalHandle,
        model: &ModelGeometry,
        to_world: Affine3A,
        lod: usize,
        sink: &mut dyn MeshSink,
    ) {
        let bones = [to_world];
        self.draw_decals(
            handle,
            &DrawRequest {
                model,
                bones: &bones,
                lod,
                flex: None,
                morph: None,
                material_override: None,
            },
            sink,
        );
    }
}

fn emit_vertex(
    cache: &mut VertexTransformCache,
    req: &DrawRequest,
    path: SkinPath,
    v: &DecalVertex,
) -> DecalDrawVertex {
    match path {
        SkinPath::Identity => {
            let bone = root_bone(req.bones);
            prelit(
                bone.transform_point3(v.position),
                bone.transform_vector3(v.normal),
                v.uv,
            )
        }
        SkinPath::IdentityFlexed => {
            let (mut position, mut normal) = (v.position, v.normal);
            if v.mesh_vertex != NO_MESH_VERTEX {
                if let Some((fp, fnorm)) = req.flex.and_then(|f| f.flexed(v.mesh, v.mesh_vertex)) {
                    position = fp;
                    normal = fnorm;
                }
            }
            let bone = root_bone(req.bones);
            prelit(
                bone.transform_point3(position),
                bone.transform_vector3(normal),
                v.uv,
            )
        }
        SkinPath::SoftwareBlend | SkinPath::SoftwareBlendFlexed => {
            let (position, normal) = software_skin(cache, req.model, req.bones, req.flex, v);
            prelit(position + normal * SKIN_NUDGE, normal, v.uv)
        }
        SkinPath::HardwareMorph => {
            let morph_uv = if v.mesh_vertex == NO_MESH_VERTEX {
                Vec2::ZERO
            } else {
                req.morph
                    .and_then(|m| m.morph_uv(v.mesh, v.mesh_vertex))
                    .unwrap_or(Vec2::ZERO)
            };
            skinned(v, &mesh_weights(req.model, v), morph_uv)
        }
    }
}

/// Blend a pooled vertex across its bone weights, consulting the per-frame
/// cache first. Flex data substitutes the pose-space inputs before the
/// blend.
fn software_skin(
    cache: &mut VertexTransformCache,
    model: &ModelGeometry,
    bones: &[Affine3A],
    flex: Option<&dyn FlexSource>,
    v: &DecalVertex,
) -> (Vec3, Vec3) {
    if v.mesh_vertex == NO_MESH_VERTEX {
        // Clip-generated vertices only exist on single-bone meshes; one
        // showing up here means the model data was swapped under us.
        let bone = root_bone(bones);
        return (
            bone.transform_point3(v.position),
            bone.transform_vector3(v.normal),
        );
    }
    if let Some(hit) = cache.get(v.mesh, v.mesh_vertex) {
        return hit;
    }
    let (mut position, mut normal) = (v.position, v.normal);
    if let Some((fp, fnorm)) = flex.and_then(|f| f.flexed(v.mesh, v.mesh_vertex)) {
        position = fp;
        normal = fnorm;
    }
    let weights = mesh_weights(model, v);
    let (position, normal) = skin_vertex(bones, &weights, position, normal);
    cache.insert(v.mesh, v.mesh_vertex, position, normal);
    (position, normal)
}

/// Bone influences of the mesh vertex backing a pooled vertex. Rigid to
/// bone 0 when the lookup goes stale.
fn mesh_weights(model: &ModelGeometry, v: &DecalVertex) -> BoneWeights {
    model
        .meshes
        .get(v.mesh as usize)
        .filter(|data| (v.mesh_vertex as usize) < data.len())
        .map(|data| data.weights(v.mesh_vertex as usize))
        .unwrap_or_default()
}

fn root_bone(bones: &[Affine3A]) -> Affine3A {
    bones.first().copied().unwrap_or(Affine3A::IDENTITY)
}

/// A finished world-space vertex: skinning already applied, weights pinned
/// to bone 0.
fn prelit(position: Vec3, normal: Vec3, uv: Vec2) -> DecalDrawVertex {
    DecalDrawVertex {
        position: position.to_array(),
        normal: normal.to_array(),
        uv: uv.to_array(),
        ..DecalDrawVertex::blank()
    }
}

/// A pose-space vertex carrying its real bone data for hardware skinning.
fn skinned(v: &DecalVertex, weights: &BoneWeights, morph_uv: Vec2) -> DecalDrawVertex {
    let mut out = DecalDrawVertex::blank();
    out.position = v.position.to_array();
    out.normal = v.normal.to_array();
    out.uv = v.uv.to_array();
    out.morph_uv = morph_uv.to_array();
    out.bone_weights = [0.0; 4];
    for i in 0..(weights.count as usize).min(MAX_VERTEX_BONES) {
        out.bone_weights[i] = weights.weights[i];
        out.bone_indices[i] = u32::from(weights.bones[i]);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use glam::{Affine3A, Vec2, Vec3};

    use super::super::fixtures::{quad_model, two_bone_quad_model};
    use super::super::{DecalRequest, DecalStore};
    use super::*;
    use crate::config::DecalConfig;
    use crate::math::Ray;
    use crate::render::RecordingSink;

    const SPLAT: MaterialId = MaterialId(42);

    fn centered_splat<'a>(model: &'a ModelGeometry, bones: &'a [Affine3A]) -> DecalRequest<'a> {
        DecalRequest {
            model,
            bones,
            ray: Ray::new(Vec3::ZERO, Vec3::NEG_Z),
            up: Vec3::Y,
            material: SPLAT,
            radius: 1.0,
            body: 0,
            no_poke_thru: false,
            max_lod: usize::MAX,
        }
    }

    fn draw<'a>(model: &'a ModelGeometry, bones: &'a [Affine3A]) -> DrawRequest<'a> {
        DrawRequest {
            model,
            bones,
            lod: 0,
            flex: None,
            morph: None,
            material_override: None,
        }
    }

    struct FlexOneVertex;

    impl FlexSource for FlexOneVertex {
        fn flexed(&self, mesh: u16, vertex: u16) -> Option<(Vec3, Vec3)> {
            (mesh == 0 && vertex == 2).then_some((Vec3::new(0.0, 0.0, 3.0), Vec3::X))
        }
    }

    #[derive(Default)]
    struct CountingFlex {
        lookups: Cell<usize>,
    }

    impl FlexSource for CountingFlex {
        fn flexed(&self, _mesh: u16, _vertex: u16) -> Option<(Vec3, Vec3)> {
            self.lookups.set(self.lookups.get() + 1);
            None
        }
    }

    struct ConstMorph(Vec2);

    impl MorphSource for ConstMorph {
        fn morph_uv(&self, _mesh: u16, _vertex: u16) -> Option<Vec2> {
            Some(self.0)
        }
    }

    #[test]
    fn identity_path_transforms_through_bone_zero() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let rest = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &rest));

        // Animate: the whole model shifts +10 in X.
        let posed = [Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0))];
        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &draw(&model, &posed), &mut sink);

        assert_eq!(sink.batches.len(), 1);
        let batch = &sink.batches[0];
        assert_eq!(batch.material, SPLAT);
        assert_eq!(batch.vertices.len(), 4);
        assert_eq!(batch.indices, vec![0, 1, 2, 0, 2, 3]);
        for v in &batch.vertices {
            assert!(v.position[0] >= 9.0, "decal must ride the bone: {v:?}");
            assert_eq!(v.bone_weights, [1.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn flexed_identity_substitutes_flex_results() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let flex = FlexOneVertex;
        let mut req = draw(&model, &bones);
        req.flex = Some(&flex);
        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &req, &mut sink);

        let verts = &sink.batches[0].vertices;
        assert_eq!(verts[2].position, [0.0, 0.0, 3.0], "vertex 2 is flexed");
        assert_eq!(verts[2].normal, [1.0, 0.0, 0.0]);
        assert_eq!(verts[0].position[2], 0.0, "vertex 0 is untouched");
    }

    #[test]
    fn software_blend_nudges_along_the_normal() {
        let mut store = DecalStore::default();
        let model = two_bone_quad_model();
        let bones = [Affine3A::IDENTITY, Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &draw(&model, &bones), &mut sink);

        for v in &sink.batches[0].vertices {
            assert!(
                (v.position[2] - SKIN_NUDGE).abs() < 1e-6,
                "expected z-nudge of {SKIN_NUDGE}, got {}",
                v.position[2]
            );
            assert_eq!(v.bone_weights, [1.0, 0.0, 0.0, 0.0], "world-space batch");
        }
    }

    #[test]
    fn transform_cache_skips_repeat_blends_within_a_frame() {
        let mut store = DecalStore::default();
        let model = two_bone_quad_model();
        let bones = [Affine3A::IDENTITY, Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let flex = CountingFlex::default();
        let mut req = draw(&model, &bones);
        req.flex = Some(&flex);

        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &req, &mut sink);
        assert_eq!(flex.lookups.get(), 4, "first pass blends all four");
        store.draw_decals(handle, &req, &mut sink);
        assert_eq!(flex.lookups.get(), 4, "second pass is all cache hits");

        store.begin_frame();
        store.draw_decals(handle, &req, &mut sink);
        assert_eq!(flex.lookups.get(), 8, "new frame invalidates the cache");
    }

    #[test]
    fn hardware_morph_emits_bone_data_and_accumulator_uv() {
        let mut store = DecalStore::default();
        let model = two_bone_quad_model();
        let bones = [Affine3A::IDENTITY, Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let morph = ConstMorph(Vec2::new(0.25, 0.75));
        let mut req = draw(&model, &bones);
        req.morph = Some(&morph);
        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &req, &mut sink);

        for v in &sink.batches[0].vertices {
            assert_eq!(v.morph_uv, [0.25, 0.75]);
            assert_eq!(v.bone_weights, [0.5, 0.5, 0.0, 0.0]);
            assert_eq!(v.bone_indices, [0, 1, 0, 0]);
            assert_eq!(v.position[2], 0.0, "pose space, no nudge");
        }
    }

    #[test]
    fn retired_runs_rebase_surviving_indices() {
        let mut store = DecalStore::new(DecalConfig {
            max_decals_per_model: 2,
            ..DecalConfig::default()
        });
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        for _ in 0..3 {
            store.add_decal(handle, &centered_splat(&model, &bones));
        }

        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &draw(&model, &bones), &mut sink);

        let batch = &sink.batches[0];
        assert_eq!(batch.vertices.len(), 8, "two surviving quads");
        assert_eq!(
            batch.indices,
            vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7],
            "second run re-based past the first"
        );
        assert!(batch.indices.iter().all(|&i| (i as usize) < batch.vertices.len()));
    }

    #[test]
    fn material_override_binds_instead_of_bucket_material() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let mut req = draw(&model, &bones);
        req.material_override = Some(MaterialId(99));
        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &req, &mut sink);

        assert_eq!(sink.batches[0].material, MaterialId(99));
    }

    #[test]
    fn static_prop_wrapper_draws_with_one_transform() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();
        store.add_decal(handle, &centered_splat(&model, &bones));

        let mut sink = RecordingSink::new();
        let to_world = Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0));
        store.draw_static_prop_decals(handle, &model, to_world, 0, &mut sink);

        for v in &sink.batches[0].vertices {
            assert!((v.position[1] - 5.0).abs() <= 1.0, "prop transform applied");
        }
    }

    #[test]
    fn empty_and_stale_draws_emit_nothing() {
        let mut store = DecalStore::default();
        let model = quad_model();
        let bones = [Affine3A::IDENTITY];
        let handle = store.create_decal_list(&model).unwrap();

        let mut sink = RecordingSink::new();
        store.draw_decals(handle, &draw(&model, &bones), &mut sink);
        assert!(sink.batches.is_empty(), "no decals yet");

        store.add_decal(handle, &centered_splat(&model, &bones));
        let mut req = draw(&model, &bones);
        req.lod = 7;
        store.draw_decals(handle, &req, &mut sink);
        assert!(sink.batches.is_empty(), "out-of-range lod");

        store.clear_decals(handle);
        store.draw_decals(handle, &draw(&model, &bones), &mut sink);
        assert!(sink.batches.is_empty(), "cleared");

        store.destroy_decal_list(handle);
        store.draw_decals(handle, &draw(&model, &bones), &mut sink);
        assert!(sink.batches.is_empty(), "stale handle");
    }
}
