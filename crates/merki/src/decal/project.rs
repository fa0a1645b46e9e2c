//! # Projection — From a Ray to Decal UV Space
//!
//! A decal is a square of texture projected along a ray. The projection
//! frame is an orthonormal basis {U, V, N}: N points back along the ray
//! (out of the surface), U and V span the projection plane. A world
//! position maps to decal space by taking its offset from the impact point
//! and dotting with each axis:
//!
//! ```text
//!              V
//!              ↑   (0,0)┌─────────┐(1,0)
//!     N ←──────│────────│  decal  │        uv = d·{U,V} / (2r) + ½
//!              │        │ square  │        depth = d·N
//!              │   (0,1)└─────────┘(1,1)
//!              └──────→ U
//! ```
//!
//! Projection happens on *skinned* positions: each vertex is transformed
//! per bone and weight-summed first (transforming the blended position
//! would disagree with what the model renderer draws). The results land in
//! a per-call scratch table, written once per mesh no matter how many LODs
//! share that mesh's vertices.

use glam::{Affine3A, Vec2, Vec3};

use crate::math::Ray;
use crate::model::{BoneWeights, MeshVertexData};

/// Minimum dot between a vertex normal and the projection normal for the
/// vertex to count as facing the decal.
pub(crate) const FRONT_FACE_MIN_DOT: f32 = 0.1;

/// Scratch flag: vertex faces the decal.
pub(crate) const VERTEX_FRONT_FACING: u8 = 0x1;
/// Scratch flag: vertex depth is within the decal radius (pokethru guard).
pub(crate) const VERTEX_IN_VALID_AREA: u8 = 0x2;

/// Orthonormal decal projection frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecalBasis {
    pub u: Vec3,
    pub v: Vec3,
    pub n: Vec3,
    pub origin: Vec3,
    pub radius: f32,
}

impl DecalBasis {
    /// Build the frame from a placement ray and an up hint. Returns `None`
    /// for degenerate input: zero or non-finite ray direction, or an up
    /// vector parallel to the ray that stays parallel after the permuted
    /// retry.
    pub fn from_ray(ray: &Ray, up: Vec3, radius: f32) -> Option<Self> {
        let len_sq = ray.dir.length_squared();
        if !len_sq.is_finite() || len_sq <= 1e-12 || !(radius > 0.0) {
            return None;
        }
        let n = -ray.dir / len_sq.sqrt();

        let mut u = up.cross(n);
        let mut u_len_sq = u.length_squared();
        if !u_len_sq.is_finite() || u_len_sq < 1e-6 {
            // Up is (nearly) parallel to the ray. Retry with its
            // components permuted, which cannot also be parallel unless
            // the input is garbage.
            u = Vec3::new(up.z, up.x, up.y).cross(n);
            u_len_sq = u.length_squared();
            if !u_len_sq.is_finite() || u_len_sq < 1e-6 {
                return None;
            }
        }
        let u = u / u_len_sq.sqrt();
        let v = n.cross(u);

        Some(Self {
            u,
            v,
            n,
            origin: ray.start,
            radius,
        })
    }

    /// Decal-space uv and depth of a world position. The square's corners
    /// are uv (0,0)..(1,1); depth is signed distance off the projection
    /// plane.
    pub fn project(&self, world: Vec3) -> (Vec2, f32) {
        let d = world - self.origin;
        let uv = Vec2::new(d.dot(self.u), d.dot(self.v)) / (2.0 * self.radius) + 0.5;
        (uv, d.dot(self.n))
    }
}

/// Skin a pose-space position and normal: transform per bone, then
/// weight-sum. Out-of-range bone indices fall back to identity.
pub(crate) fn skin_vertex(
    bones: &[Affine3A],
    weights: &BoneWeights,
    position: Vec3,
    normal: Vec3,
) -> (Vec3, Vec3) {
    let mut p = Vec3::ZERO;
    let mut n = Vec3::ZERO;
    for i in 0..(weights.count as usize).min(weights.bones.len()) {
        let bone = bones
            .get(weights.bones[i] as usize)
            .copied()
            .unwrap_or(Affine3A::IDENTITY);
        p += bone.transform_point3(position) * weights.weights[i];
        n += bone.transform_vector3(normal) * weights.weights[i];
    }
    (p, n)
}

/// Per-mesh-vertex projection scratch, one entry per vertex of every mesh
/// participating in the current add. `pass`/`slot` implement the emit
/// dedup: a vertex already pushed during the current (LOD, mesh) walk is
/// reused by slot instead of being pushed again.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BuildVertexInfo {
    pub uv: Vec2,
    pub flags: u8,
    /// Emit-pass stamp. Zero = not emitted; pass counters start at one.
    pub pass: u64,
    /// Decal-local vertex slot, valid when `pass` matches the current one.
    pub slot: u16,
}

/// Project every vertex of a mesh into decal space, filling the mesh's
/// scratch region with uv and facing/valid flags.
pub(crate) fn project_mesh(
    scratch: &mut [BuildVertexInfo],
    vertices: &MeshVertexData,
    bones: &[Affine3A],
    basis: &DecalBasis,
) {
    for i in 0..vertices.len().min(scratch.len()) {
        let weights = vertices.weights(i);
        let (world_pos, world_normal) =
            skin_vertex(bones, &weights, vertices.position(i), vertices.normal(i));
        let (uv, depth) = basis.project(world_pos);

        let mut flags = 0;
        if world_normal.dot(basis.n) >= FRONT_FACE_MIN_DOT {
            flags |= VERTEX_FRONT_FACING;
        }
        if depth.abs() <= basis.radius {
            flags |= VERTEX_IN_VALID_AREA;
        }
        scratch[i] = BuildVertexInfo {
            uv,
            flags,
            pass: 0,
            slot: 0,
        };
    }
}
