use std::f32::consts::FRAC_PI_2;

use crate::input::FlyInput;
use crate::{Mat3, Mat4, Quat, Resolution, Vec3};

/// Units per second along the facing/strafe axes.
pub const MOVE_SPEED: f32 = 3.0;
/// Radians per second.
pub const PITCH_SPEED: f32 = 1.0;
/// Radians per second.
pub const YAW_SPEED: f32 = 2.0;
/// Pitch never reaches straight up/down, so the look-at basis stays defined.
pub const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// First-person fly camera (right-handed, yaw around +Y, pitch around the
/// yaw-rotated right axis).
#[derive(Clone, Copy, Debug)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub projection: Mat4,
}

impl FlyCamera {
    pub fn new(position: Vec3, fov_y_rad: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            projection: Mat4::perspective_rh(fov_y_rad, aspect.max(1e-6), z_near, z_far),
        }
    }

    /// 60 degree frustum matching `target`'s aspect, looking down -Z from
    /// the origin.
    pub fn jam_default(target: Resolution) -> Self {
        Self::new(Vec3::ZERO, 60f32.to_radians(), target.aspect(), 0.1, 100.0)
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        Mat3::from_rotation_y(self.yaw) * Vec3::X
    }

    #[inline]
    pub fn front(&self) -> Vec3 {
        let flat = Mat3::from_rotation_y(self.yaw) * Vec3::NEG_Z;
        Quat::from_axis_angle(self.right(), self.pitch) * flat
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front(), Vec3::Y)
    }

    /// Apply one frame of held-key input. Rotation is applied before
    /// movement so the step follows the new facing.
    pub fn update(&mut self, input: &FlyInput, dt: f32) {
        self.yaw += YAW_SPEED * input.yaw_axis() * dt;
        self.pitch =
            (self.pitch + PITCH_SPEED * input.pitch_axis() * dt).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let step = self.right() * (MOVE_SPEED * input.strafe_axis() * dt)
            + self.front() * (MOVE_SPEED * input.ahead_axis() * dt);
        self.position += step;
    }
}
