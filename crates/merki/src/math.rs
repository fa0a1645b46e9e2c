//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. Bone pose-to-world transforms are plain
//! [`Affine3A`] values (3x4 affine matrices), which is what skinned model
//! renderers hand around anyway.

pub use glam::{Affine3A, Quat, Vec2, Vec3};

/// A projection ray for decal placement.
///
/// `start` is the impact point (the decal's center lands here) and `dir`
/// points *into* the surface. `dir` does not need to be normalized.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub start: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Create a ray from an impact point and a direction into the surface.
    pub fn new(start: Vec3, dir: Vec3) -> Self {
        Self { start, dir }
    }

    /// Create a ray starting at `from` and pointing at `target`.
    pub fn toward(from: Vec3, target: Vec3) -> Self {
        Self {
            start: from,
            dir: target - from,
        }
    }
}
