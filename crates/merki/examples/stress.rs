//! Stress — hammer the decal budgets and stream telemetry.
//!
//! Fires random splats at a wall of model instances until every budget
//! trips, shipping a snapshot to `merki-telemetry` each frame. Run the
//! telemetry TUI in another terminal to watch retirement live.

use std::time::Duration;

use merki::prelude::*;

const SPLAT: MaterialId = MaterialId(7);
const INSTANCES: usize = 8;
const FRAMES: u64 = 600;

fn main() {
    env_logger::init();

    // Budgets low enough that a few hundred splats trip all of them.
    let mut store = DecalStore::new(DecalConfig {
        max_decals_per_model: 24,
        vertex_budget_bytes: 32 * 1024,
    });

    let model = panel();
    let bones = [Affine3A::IDENTITY];
    let handles: Vec<DecalHandle> = (0..INSTANCES)
        .filter_map(|_| store.create_decal_list(&model))
        .collect();

    let mut sender = DiagSender::new();
    if sender.is_none() {
        log::warn!("telemetry socket unavailable, running blind");
    }

    let mut rng = Rng(0x2545_f491_4f6c_dd1d);
    for frame in 0..FRAMES {
        store.begin_frame();

        for _ in 0..4 {
            let handle = handles[rng.next_index(handles.len())];
            let center = Vec2::new(rng.next_signed() * 2.0, rng.next_signed() * 2.0);
            store.add_decal(
                handle,
                &DecalRequest {
                    model: &model,
                    bones: &bones,
                    ray: Ray::new(center.extend(1.0), Vec3::NEG_Z),
                    up: Vec3::Y,
                    material: SPLAT,
                    radius: 0.2 + rng.next_unit() * 0.6,
                    body: 0,
                    no_poke_thru: false,
                    max_lod: usize::MAX,
                },
            );
        }

        // Draw every instance the way a render pass would.
        let mut sink = RecordingSink::new();
        for &handle in &handles {
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
        }

        if let Some(sender) = sender.as_mut() {
            sender.send(&store.snapshot());
        }
        if frame % 100 == 0 {
            log::info!(
                "frame {frame}: {} decals live, {} bytes pooled",
                store.decal_count(),
                store.pooled_vertex_bytes()
            );
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    let stats = store.stats();
    println!("added:             {}", stats.decals_added);
    println!("retired (model):   {}", stats.retired_model_count);
    println!("retired (vertex):  {}", stats.retired_vertex_budget);
    println!("retired (global):  {}", stats.retired_global_count);
    println!("retired (ceiling): {}", stats.retired_index_ceiling);
    println!("triangles emitted: {}", stats.triangles_emitted);
}

/// One-bone 6x6 quad facing +Z. Big enough that most splats land fully
/// inside and pool the cheap four-vertex path.
fn panel() -> ModelGeometry {
    let verts = vec![
        FatVertex::new(Vec3::new(-3.0, -3.0, 0.0), Vec3::Z),
        FatVertex::new(Vec3::new(3.0, -3.0, 0.0), Vec3::Z),
        FatVertex::new(Vec3::new(3.0, 3.0, 0.0), Vec3::Z),
        FatVertex::new(Vec3::new(-3.0, 3.0, 0.0), Vec3::Z),
    ];
    let group = StripGroup::triangle_list(vec![0, 1, 2, 3], vec![0, 1, 2, 0, 2, 3]);

    let mut model = ModelGeometry::new("panel", 1);
    model.materials.push(MaterialDesc::default());
    model.meshes.push(MeshVertexData::Fat(verts));
    model.lods.push(LodGeometry {
        meshes: vec![LodMesh::new(0, 0, vec![group])],
    });
    model
}

/// xorshift64.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Uniform in [0, 1).
    fn next_unit(&mut self) -> f32 {
        (self.next() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in [-1, 1).
    fn next_signed(&mut self) -> f32 {
        self.next_unit() * 2.0 - 1.0
    }

    fn next_index(&mut self, len: usize) -> usize {
        (self.next() % len.max(1) as u64) as usize
    }
}
