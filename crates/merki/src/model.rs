//! # Model Geometry — What the decal engine reads
//!
//! A skinned model arrives here already processed for rendering: vertex
//! data shared model-wide, and per-LOD index geometry organized into strip
//! groups. The decal engine never owns this data; it borrows it during
//! [`add_decal`](crate::decal::DecalStore::add_decal) and during draws.
//!
//! ```text
//! ModelGeometry
//! ├── meshes[]         model-wide vertex pools (fat / thin / absent)
//! ├── materials[]      per-mesh material flags (decal suppression etc.)
//! ├── body_parts[]     selectable sub-model groups
//! └── lods[]
//!     └── meshes[]     LodMesh: mesh id + material + body slot
//!         └── groups[] StripGroup: group verts → mesh verts, strips
//!             └── strips[]  triangle list / triangle strip runs
//! ```
//!
//! The split between a model-wide mesh table and per-LOD references exists
//! because LODs routinely share vertex buffers: a coarser LOD indexes a
//! subset of the same vertices. Work keyed by mesh id (projection, scratch
//! allocation) then happens once per call, not once per LOD.

use glam::Vec3;

/// Most bones that can influence a single vertex.
pub const MAX_VERTEX_BONES: usize = 3;

/// Bone influences for one vertex. Unused slots hold bone 0 / weight 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneWeights {
    pub count: u8,
    pub bones: [u16; MAX_VERTEX_BONES],
    pub weights: [f32; MAX_VERTEX_BONES],
}

impl BoneWeights {
    /// A vertex rigidly bound to a single bone.
    pub fn rigid(bone: u16) -> Self {
        Self {
            count: 1,
            bones: [bone, 0, 0],
            weights: [1.0, 0.0, 0.0],
        }
    }

    /// A vertex blended across two bones.
    pub fn pair(bone_a: u16, bone_b: u16, weight_a: f32) -> Self {
        Self {
            count: 2,
            bones: [bone_a, bone_b, 0],
            weights: [weight_a, 1.0 - weight_a, 0.0],
        }
    }
}

impl Default for BoneWeights {
    fn default() -> Self {
        Self::rigid(0)
    }
}

/// A full-precision model vertex in pose space.
#[derive(Debug, Clone, Copy)]
pub struct FatVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub weights: BoneWeights,
}

impl FatVertex {
    /// A rigid vertex bound to bone 0.
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal,
            weights: BoneWeights::rigid(0),
        }
    }
}

/// Compressed vertex data: full-precision positions, normals quantized to
/// 8 bits per axis, and a single rigid bone per vertex. Used where memory
/// matters more than normal fidelity (crowd models, distant props).
#[derive(Debug, Clone, Default)]
pub struct ThinVertexData {
    positions: Vec<Vec3>,
    normals: Vec<u32>,
    bones: Vec<u16>,
}

impl ThinVertexData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, position: Vec3, normal: Vec3, bone: u16) {
        self.positions.push(position);
        self.normals.push(pack_normal(normal));
        self.bones.push(bone);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, i: usize) -> Vec3 {
        self.positions[i]
    }

    pub fn normal(&self, i: usize) -> Vec3 {
        unpack_normal(self.normals[i])
    }

    pub fn bone(&self, i: usize) -> u16 {
        self.bones[i]
    }
}

/// Pack a unit normal into 8 bits per axis (snorm).
fn pack_normal(n: Vec3) -> u32 {
    let q = |f: f32| (f.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8 as u32;
    q(n.x) | q(n.y) << 8 | q(n.z) << 16
}

/// Unpack an 8-bit snorm normal. Inverse of [`pack_normal`] up to
/// quantization error (~1/127 per axis).
fn unpack_normal(p: u32) -> Vec3 {
    let u = |shift: u32| (p >> shift) as u8 as i8 as f32 / 127.0;
    Vec3::new(u(0), u(8), u(16))
}

/// Vertex data for one mesh. `Absent` covers models whose vertex data was
/// stripped (server-side copies); such meshes never receive decals.
#[derive(Debug, Clone)]
pub enum MeshVertexData {
    Fat(Vec<FatVertex>),
    Thin(ThinVertexData),
    Absent,
}

impl MeshVertexData {
    pub fn len(&self) -> usize {
        match self {
            Self::Fat(v) => v.len(),
            Self::Thin(v) => v.len(),
            Self::Absent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Pose-space position of vertex `i`. Zero when absent.
    pub fn position(&self, i: usize) -> Vec3 {
        match self {
            Self::Fat(v) => v[i].position,
            Self::Thin(v) => v.position(i),
            Self::Absent => Vec3::ZERO,
        }
    }

    /// Pose-space normal of vertex `i`. Zero when absent.
    pub fn normal(&self, i: usize) -> Vec3 {
        match self {
            Self::Fat(v) => v[i].normal,
            Self::Thin(v) => v.normal(i),
            Self::Absent => Vec3::ZERO,
        }
    }

    /// Bone influences of vertex `i`. Thin vertices are rigid by
    /// construction.
    pub fn weights(&self, i: usize) -> BoneWeights {
        match self {
            Self::Fat(v) => v[i].weights,
            Self::Thin(v) => BoneWeights::rigid(v.bone(i)),
            Self::Absent => BoneWeights::rigid(0),
        }
    }
}

/// Material flags the decal engine consults. The material itself (textures,
/// shaders) lives in the caller's material system.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialDesc {
    /// Material opted out of decals entirely.
    pub no_decal: bool,
    /// Decals suppressed at render time (mirrors, overlays).
    pub suppress_decals: bool,
    /// Translucent pass material. Excluded from decals only when the model
    /// renders two-pass translucent.
    pub translucent: bool,
}

/// One selectable body group: `sub_model_count` alternatives, of which the
/// body index picks exactly one via `(body / base) % sub_model_count`.
#[derive(Debug, Clone, Copy)]
pub struct BodyPart {
    pub base: u32,
    pub sub_model_count: u32,
}

impl BodyPart {
    /// Which sub-model the given body index selects in this part.
    pub fn selected(&self, body: u32) -> u32 {
        (body / self.base.max(1)) % self.sub_model_count.max(1)
    }
}

/// How a strip's indices decode into triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripKind {
    TriangleList,
    TriangleStrip,
}

/// A contiguous run of indices within a strip group.
#[derive(Debug, Clone, Copy)]
pub struct Strip {
    pub kind: StripKind,
    pub first_index: u32,
    pub index_count: u32,
}

/// A batch of triangles sharing skinning state. `vertices` maps group-local
/// vertex ids to mesh vertex ids; `indices` are group-local.
#[derive(Debug, Clone, Default)]
pub struct StripGroup {
    pub vertices: Vec<u16>,
    pub indices: Vec<u16>,
    pub strips: Vec<Strip>,
    /// Group carries morph-target (flex) deltas. Flexed geometry cannot be
    /// clipped per-vertex, so decals fall back to cull-test clipping.
    pub flexed: bool,
}

impl StripGroup {
    /// A group holding one triangle list over the given mesh vertices.
    pub fn triangle_list(vertices: Vec<u16>, indices: Vec<u16>) -> Self {
        let count = indices.len() as u32;
        Self {
            vertices,
            indices,
            strips: vec![Strip {
                kind: StripKind::TriangleList,
                first_index: 0,
                index_count: count,
            }],
            flexed: false,
        }
    }

    /// Iterate the group's triangles as mesh vertex ids, decoding strips
    /// and skipping degenerate strip triangles.
    pub fn triangles(&self) -> impl Iterator<Item = [u16; 3]> + '_ {
        self.strips.iter().flat_map(move |strip| {
            let start = strip.first_index as usize;
            let end = (start + strip.index_count as usize).min(self.indices.len());
            StripTriangles {
                kind: strip.kind,
                indices: &self.indices[start.min(end)..end],
                cursor: 0,
            }
            .filter_map(move |tri| {
                let mv = |g: u16| self.vertices.get(g as usize).copied();
                Some([mv(tri[0])?, mv(tri[1])?, mv(tri[2])?])
            })
        })
    }
}

/// Triangle decoder over one strip's group-local indices.
struct StripTriangles<'a> {
    kind: StripKind,
    indices: &'a [u16],
    cursor: usize,
}

impl Iterator for StripTriangles<'_> {
    type Item = [u16; 3];

    fn next(&mut self) -> Option<[u16; 3]> {
        loop {
            match self.kind {
                StripKind::TriangleList => {
                    let i = self.cursor;
                    if i + 3 > self.indices.len() {
                        return None;
                    }
                    self.cursor += 3;
                    return Some([self.indices[i], self.indices[i + 1], self.indices[i + 2]]);
                }
                StripKind::TriangleStrip => {
                    let i = self.cursor;
                    if i + 3 > self.indices.len() {
                        return None;
                    }
                    self.cursor += 1;
                    // Odd triangles flip winding; repeated indices are
                    // strip restarts, not geometry.
                    let (a, b, c) = if i % 2 == 0 {
                        (self.indices[i], self.indices[i + 1], self.indices[i + 2])
                    } else {
                        (self.indices[i], self.indices[i + 2], self.indices[i + 1])
                    };
                    if a == b || b == c || a == c {
                        continue;
                    }
                    return Some([a, b, c]);
                }
            }
        }
    }
}

/// One mesh reference within a LOD.
#[derive(Debug, Clone)]
pub struct LodMesh {
    /// Index into [`ModelGeometry::meshes`].
    pub mesh: u16,
    /// Index into [`ModelGeometry::materials`].
    pub material: u16,
    /// Body part this mesh belongs to.
    pub body_part: u16,
    /// Sub-model within that body part.
    pub sub_model: u16,
    pub groups: Vec<StripGroup>,
}

impl LodMesh {
    /// A mesh visible in every body configuration.
    pub fn new(mesh: u16, material: u16, groups: Vec<StripGroup>) -> Self {
        Self {
            mesh,
            material,
            body_part: 0,
            sub_model: 0,
            groups,
        }
    }

    pub fn is_flexed(&self) -> bool {
        self.groups.iter().any(|g| g.flexed)
    }
}

/// One level of detail: a set of mesh references.
#[derive(Debug, Clone, Default)]
pub struct LodGeometry {
    pub meshes: Vec<LodMesh>,
}

/// Everything the decal engine needs to know about one model.
#[derive(Debug, Clone)]
pub struct ModelGeometry {
    /// Shows up in log messages, nothing else.
    pub name: String,
    pub bone_count: usize,
    /// Model renders in two passes (opaque + translucent); translucent
    /// materials then refuse decals.
    pub two_pass_translucent: bool,
    pub materials: Vec<MaterialDesc>,
    pub body_parts: Vec<BodyPart>,
    pub meshes: Vec<MeshVertexData>,
    pub lods: Vec<LodGeometry>,
    /// Lowest LOD index actually rendered for this model. Decals are built
    /// from here up.
    pub root_lod: usize,
}

impl ModelGeometry {
    pub fn new(name: impl Into<String>, bone_count: usize) -> Self {
        Self {
            name: name.into(),
            bone_count,
            two_pass_translucent: false,
            materials: Vec::new(),
            body_parts: Vec::new(),
            meshes: Vec::new(),
            lods: Vec::new(),
            root_lod: 0,
        }
    }

    /// Whether this LOD mesh is part of the given body configuration.
    /// Meshes referencing unknown body parts are always visible.
    pub fn body_active(&self, mesh: &LodMesh, body: u32) -> bool {
        match self.body_parts.get(mesh.body_part as usize) {
            Some(part) => part.selected(body) == mesh.sub_model as u32,
            None => true,
        }
    }

    /// Material flags for a LOD mesh, defaulting to no restrictions when
    /// the material index is stale.
    pub fn material(&self, mesh: &LodMesh) -> MaterialDesc {
        self.materials
            .get(mesh.material as usize)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_decodes_like_list() {
        // Strip 0,1,2,3 is the quad (0,1,2) + (1,3,2).
        let group = StripGroup {
            vertices: vec![10, 11, 12, 13],
            indices: vec![0, 1, 2, 3],
            strips: vec![Strip {
                kind: StripKind::TriangleStrip,
                first_index: 0,
                index_count: 4,
            }],
            flexed: false,
        };
        let tris: Vec<_> = group.triangles().collect();
        assert_eq!(tris, vec![[10, 11, 12], [11, 13, 12]]);
    }

    #[test]
    fn strip_skips_degenerate_restarts() {
        let group = StripGroup {
            vertices: vec![0, 1, 2, 3],
            indices: vec![0, 1, 2, 2, 3, 3], // two real tris worth of data, rest restarts
            strips: vec![Strip {
                kind: StripKind::TriangleStrip,
                first_index: 0,
                index_count: 6,
            }],
            flexed: false,
        };
        for tri in group.triangles() {
            assert!(
                tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2],
                "degenerate triangle {tri:?} leaked through"
            );
        }
    }

    #[test]
    fn list_decodes_in_triples() {
        let group = StripGroup::triangle_list(vec![5, 6, 7, 8], vec![0, 1, 2, 0, 2, 3]);
        let tris: Vec<_> = group.triangles().collect();
        assert_eq!(tris, vec![[5, 6, 7], [5, 7, 8]]);
    }

    #[test]
    fn body_selection_picks_sub_model() {
        let part = BodyPart {
            base: 3,
            sub_model_count: 2,
        };
        assert_eq!(part.selected(0), 0);
        assert_eq!(part.selected(3), 1);
        assert_eq!(part.selected(6), 0); // wraps
    }

    #[test]
    fn thin_normals_survive_quantization() {
        let mut thin = ThinVertexData::new();
        let n = Vec3::new(0.267, -0.534, 0.802).normalize();
        thin.push(Vec3::ZERO, n, 0);
        let out = thin.normal(0);
        assert!(
            (out - n).length() < 0.02,
            "quantized normal {out} drifted from {n}"
        );
    }

    #[test]
    fn absent_vertex_data_reports_empty() {
        let data = MeshVertexData::Absent;
        assert_eq!(data.len(), 0);
        assert!(data.is_absent());
    }
}
