//! # Clipping — Triangles Against the Decal Square
//!
//! Projected triangles rarely sit neatly inside the decal square, so each
//! one is clipped against the four half-planes u ≥ 0, u ≤ 1, v ≥ 0, v ≤ 1
//! (Sutherland–Hodgman). A triangle enters with 3 vertices; each plane can
//! add at most one, so the result has at most 7.
//!
//! Two cheap rejections happen before any clipping: per-vertex *clip
//! flags* record which planes a vertex violates, and
//!
//! - all three vertices sharing a violated plane ⇒ the triangle is
//!   entirely outside, reject;
//! - no vertex violating anything ⇒ entirely inside, keep as-is.
//!
//! Planes no vertex violates are skipped inside the clipper too: the
//! polygon stays inside them by convexity.
//!
//! Boundary vertices are generated by lerping position, normal, and uv at
//! the crossing parameter. They carry no mesh vertex id (nothing in the
//! model corresponds to them), which is what the dedup and skinning paths
//! key off later.

use glam::{Vec2, Vec3};

use super::pool::NO_MESH_VERTEX;

/// Clip flag: u < 0.
pub(crate) const CLIP_MIN_U: u8 = 0x1;
/// Clip flag: u > 1.
pub(crate) const CLIP_MAX_U: u8 = 0x2;
/// Clip flag: v < 0.
pub(crate) const CLIP_MIN_V: u8 = 0x4;
/// Clip flag: v > 1.
pub(crate) const CLIP_MAX_V: u8 = 0x8;

/// Which decal-square planes this uv violates.
pub(crate) fn clip_flags(uv: Vec2) -> u8 {
    let mut flags = 0;
    if uv.x < 0.0 {
        flags |= CLIP_MIN_U;
    }
    if uv.x > 1.0 {
        flags |= CLIP_MAX_U;
    }
    if uv.y < 0.0 {
        flags |= CLIP_MIN_V;
    }
    if uv.y > 1.0 {
        flags |= CLIP_MAX_V;
    }
    flags
}

/// A vertex moving through the clipper: pose-space data plus its decal uv.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClipVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// Originating mesh vertex, or [`NO_MESH_VERTEX`] once generated on a
    /// boundary.
    pub mesh_vertex: u16,
}

/// 3 vertices in, 4 planes, at most one vertex gained per plane.
pub(crate) const MAX_CLIP_VERTS: usize = 7;

/// Clipper output. Fewer than 3 vertices means the triangle was clipped
/// away entirely.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClippedPoly {
    verts: [ClipVertex; MAX_CLIP_VERTS],
    len: usize,
}

impl ClippedPoly {
    pub fn vertices(&self) -> &[ClipVertex] {
        &self.verts[..self.len]
    }

    pub fn is_culled(&self) -> bool {
        self.len < 3
    }
}

struct ClipPlane {
    flag: u8,
    axis: usize,
    bound: f32,
    keep_greater: bool,
}

const PLANES: [ClipPlane; 4] = [
    ClipPlane { flag: CLIP_MIN_U, axis: 0, bound: 0.0, keep_greater: true },
    ClipPlane { flag: CLIP_MAX_U, axis: 0, bound: 1.0, keep_greater: false },
    ClipPlane { flag: CLIP_MIN_V, axis: 1, bound: 0.0, keep_greater: true },
    ClipPlane { flag: CLIP_MAX_V, axis: 1, bound: 1.0, keep_greater: false },
];

impl ClipPlane {
    fn inside(&self, v: &ClipVertex) -> bool {
        if self.keep_greater {
            v.uv[self.axis] >= self.bound
        } else {
            v.uv[self.axis] <= self.bound
        }
    }

    /// Vertex where edge a→b crosses this plane. Only called when the edge
    /// straddles it, so the denominator cannot be zero.
    fn intersect(&self, a: &ClipVertex, b: &ClipVertex) -> ClipVertex {
        let t = (self.bound - a.uv[self.axis]) / (b.uv[self.axis] - a.uv[self.axis]);
        ClipVertex {
            position: a.position.lerp(b.position, t),
            normal: a.normal.lerp(b.normal, t),
            uv: a.uv.lerp(b.uv, t),
            mesh_vertex: NO_MESH_VERTEX,
        }
    }
}

/// Clip a projected triangle against the decal square. `flag_union` is the
/// OR of the three vertices' clip flags; planes absent from it are skipped.
pub(crate) fn clip_triangle(tri: [ClipVertex; 3], flag_union: u8) -> ClippedPoly {
    let blank = tri[0];
    let mut bufs = [[blank; MAX_CLIP_VERTS]; 2];
    bufs[0][..3].copy_from_slice(&tri);
    let mut src = 0;
    let mut len = 3;

    for plane in &PLANES {
        if flag_union & plane.flag == 0 {
            continue;
        }
        let mut out = 0;
        for i in 0..len {
            let a = bufs[src][i];
            let b = bufs[src][(i + 1) % len];
            let a_in = plane.inside(&a);
            if a_in {
                bufs[1 - src][out] = a;
                out += 1;
            }
            if a_in != plane.inside(&b) {
                bufs[1 - src][out] = plane.intersect(&a, &b);
                out += 1;
            }
        }
        src = 1 - src;
        len = out;
        if len < 3 {
            break;
        }
    }

    ClippedPoly {
        verts: bufs[src],
        len,
    }
}
