//! Convenience re-exports: `use merki::prelude::*` for the common items.
//!
//! Types only; all functionality is discoverable through methods on types,
//! not free functions.

// Core
pub use crate::config::{ConfigError, DecalConfig};
pub use crate::decal::{
    DecalHandle, DecalRequest, DecalStore, DrawRequest, FlexSource, MorphSource,
};
pub use crate::math::{Affine3A, Quat, Ray, Vec2, Vec3};
pub use crate::model::{
    BodyPart, BoneWeights, FatVertex, LodGeometry, LodMesh, MaterialDesc, MeshVertexData,
    ModelGeometry, Strip, StripGroup, StripKind, ThinVertexData,
};
pub use crate::render::{DecalDrawVertex, MaterialId, MeshSink, RecordedBatch, RecordingSink};

// Diagnostics (feature-gated)
#[cfg(feature = "diagnostics")]
pub use crate::diag::{DecalSnapshot, DecalStats, DiagSender};
