//! Shared test models: small, hand-checkable geometry.

use glam::Vec3;

use crate::model::{
    BoneWeights, FatVertex, LodGeometry, LodMesh, MaterialDesc, MeshVertexData, ModelGeometry,
    StripGroup,
};

/// Unit quad corner positions, counter-clockwise from (-1,-1).
pub(crate) const QUAD_CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

fn quad_vertices() -> Vec<FatVertex> {
    QUAD_CORNERS
        .iter()
        .map(|&[x, y]| FatVertex::new(Vec3::new(x, y, 0.0), Vec3::Z))
        .collect()
}

fn quad_group() -> StripGroup {
    StripGroup::triangle_list(vec![0, 1, 2, 3], vec![0, 1, 2, 0, 2, 3])
}

/// Single-bone, single-LOD model: a 2x2 quad in the XY plane facing +Z,
/// built from two triangles sharing the (-1,-1)→(1,1) diagonal.
pub(crate) fn quad_model() -> ModelGeometry {
    let mut model = ModelGeometry::new("quad", 1);
    model.materials.push(MaterialDesc::default());
    model.meshes.push(MeshVertexData::Fat(quad_vertices()));
    model.lods.push(LodGeometry {
        meshes: vec![LodMesh::new(0, 0, vec![quad_group()])],
    });
    model
}

/// The quad again, skinned half-and-half across two bones.
pub(crate) fn two_bone_quad_model() -> ModelGeometry {
    let mut verts = quad_vertices();
    for v in &mut verts {
        v.weights = BoneWeights::pair(0, 1, 0.5);
    }
    let mut model = ModelGeometry::new("two-bone quad", 2);
    model.materials.push(MaterialDesc::default());
    model.meshes.push(MeshVertexData::Fat(verts));
    model.lods.push(LodGeometry {
        meshes: vec![LodMesh::new(0, 0, vec![quad_group()])],
    });
    model
}

/// The quad mirrored across `lod_count` LODs, every LOD referencing the
/// same mesh vertex data (the common shared-vertex-buffer layout).
pub(crate) fn multi_lod_quad_model(lod_count: usize) -> ModelGeometry {
    let mut model = quad_model();
    for _ in 1..lod_count {
        model.lods.push(LodGeometry {
            meshes: vec![LodMesh::new(0, 0, vec![quad_group()])],
        });
    }
    model
}
