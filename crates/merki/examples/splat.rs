//! Splat — fire a few decals at a target board and inspect the batches.
//!
//! Demonstrates DecalStore setup, add_decal, and draw_decals into a
//! RecordingSink (stand-in for a real renderer).

use merki::prelude::*;

const PAINT: MaterialId = MaterialId(1);

fn main() {
    env_logger::init();

    let mut store = DecalStore::new(DecalConfig::default());
    let model = target_board();
    let bones = [Affine3A::IDENTITY];

    let Some(handle) = store.create_decal_list(&model) else {
        eprintln!("model has no LODs to decal");
        return;
    };

    // Dead center, big enough to spill over the inner grid cells.
    store.add_decal(handle, &splat(&model, &bones, Vec2::ZERO, 1.5));
    // On the top-right corner: most of the square hangs off the board.
    store.add_decal(handle, &splat(&model, &bones, Vec2::new(2.0, 2.0), 0.8));
    // A clean miss.
    store.add_decal(handle, &splat(&model, &bones, Vec2::new(10.0, 10.0), 1.0));

    store.begin_frame();
    let mut sink = RecordingSink::new();
    store.draw_decals(
        handle,
        &DrawRequest {
            model: &model,
            bones: &bones,
            lod: 0,
            flex: None,
            morph: None,
            material_override: None,
        },
        &mut sink,
    );

    println!(
        "{} decals live, {} bytes pooled",
        store.decal_count(),
        store.pooled_vertex_bytes()
    );
    for (i, batch) in sink.batches.iter().enumerate() {
        println!(
            "batch {i}: {:?}, {} vertices, {} triangles",
            batch.material,
            batch.vertices.len(),
            batch.triangle_count()
        );
    }
}

fn splat<'a>(
    model: &'a ModelGeometry,
    bones: &'a [Affine3A],
    center: Vec2,
    radius: f32,
) -> DecalRequest<'a> {
    DecalRequest {
        model,
        bones,
        ray: Ray::new(Vec3::new(center.x, center.y, 1.0), Vec3::NEG_Z),
        up: Vec3::Y,
        material: PAINT,
        radius,
        body: 0,
        no_poke_thru: false,
        max_lod: usize::MAX,
    }
}

/// A 4x4 target board facing +Z: 3x3 vertex grid, eight triangles, one
/// bone. Big enough that a centered decal still has edges to clip against.
fn target_board() -> ModelGeometry {
    let mut verts = Vec::new();
    for y in 0..3 {
        for x in 0..3 {
            let p = Vec3::new(x as f32 * 2.0 - 2.0, y as f32 * 2.0 - 2.0, 0.0);
            verts.push(FatVertex::new(p, Vec3::Z));
        }
    }
    let mut indices = Vec::new();
    for y in 0..2u16 {
        for x in 0..2u16 {
            let a = y * 3 + x;
            let (b, c, d) = (a + 1, a + 3, a + 4);
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }

    let mut model = ModelGeometry::new("target-board", 1);
    model.materials.push(MaterialDesc::default());
    model.meshes.push(MeshVertexData::Fat(verts));
    model.lods.push(LodGeometry {
        meshes: vec![LodMesh::new(
            0,
            0,
            vec![StripGroup::triangle_list((0..9).collect(), indices)],
        )],
    });
    model
}
