//! # Merki — Model Decal Engine
//!
//! Projects decal squares (paint splats, scorch marks, footprints) onto
//! skinned multi-LOD models, clips them against the real mesh triangles,
//! pools the results within strict budgets, and re-skins them into draw
//! batches each frame so they stick through animation.
//!
//! Start with `use merki::prelude::*`, make a
//! [`DecalStore`](decal::DecalStore), register model instances with
//! [`create_decal_list`](decal::DecalStore::create_decal_list), and fire
//! decals at them with [`add_decal`](decal::DecalStore::add_decal).

pub mod config;
pub mod decal;
pub mod math;
pub mod model;
pub mod prelude;
pub mod render;

#[cfg(feature = "diagnostics")]
pub mod diag;
