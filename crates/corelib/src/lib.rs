//! Core types: math re-exports, fly camera, point lights, input state.

pub use glam::{Mat3, Mat4, Quat, Vec3};

pub mod camera;
pub mod input;
pub mod light;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resolution {width}x{height}: both sides must be non-zero")]
    InvalidResolution { width: u32, height: u32 },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Pixel dimensions of a render target or window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> CoreResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_resolution_is_rejected() {
        assert!(matches!(
            Resolution::new(0, 64),
            Err(CoreError::InvalidResolution { width: 0, height: 64 })
        ));
        assert!(Resolution::new(64, 0).is_err());
    }

    #[test]
    fn square_resolution_has_unit_aspect() {
        let res = Resolution::new(64, 64).unwrap();
        assert_eq!(res.aspect(), 1.0);
    }

    #[test]
    fn camera_pv_is_finite() {
        let cam = camera::FlyCamera::jam_default(Resolution::new(64, 64).unwrap());
        let pv = cam.projection * cam.view();
        assert!(pv.to_cols_array().iter().all(|f| f.is_finite()));
    }
}
