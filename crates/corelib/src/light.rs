use crate::Vec3;

/// Upper bound on lights the static shader consumes; extra lights are ignored.
pub const MAX_POINT_LIGHTS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub colour: Vec3,
    pub radius: f32,
}

impl PointLight {
    pub fn new(position: Vec3, colour: Vec3, radius: f32) -> Self {
        Self {
            position,
            colour,
            radius,
        }
    }
}

/// The prefix of `lights` the shader will actually see.
#[inline]
pub fn active_lights(lights: &[PointLight]) -> &[PointLight] {
    &lights[..lights.len().min(MAX_POINT_LIGHTS)]
}
