//! Asset loading (meshes, textures) and live reload.
//! Everything here is CPU-only; GPU upload lives in the renderer.

pub mod mesh;
pub mod obj;
pub mod texture;
pub mod watch;
