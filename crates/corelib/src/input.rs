//! Platform-agnostic held-key state for the fly camera.

/// Logical camera controls. The platform layer maps physical keys onto these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Forward,
    Back,
    StrafeLeft,
    StrafeRight,
    TurnLeft,
    TurnRight,
    LookUp,
    LookDown,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FlyInput {
    forward: bool,
    back: bool,
    strafe_left: bool,
    strafe_right: bool,
    turn_left: bool,
    turn_right: bool,
    look_up: bool,
    look_down: bool,
}

impl FlyInput {
    pub fn set(&mut self, key: Key, pressed: bool) {
        let slot = match key {
            Key::Forward => &mut self.forward,
            Key::Back => &mut self.back,
            Key::StrafeLeft => &mut self.strafe_left,
            Key::StrafeRight => &mut self.strafe_right,
            Key::TurnLeft => &mut self.turn_left,
            Key::TurnRight => &mut self.turn_right,
            Key::LookUp => &mut self.look_up,
            Key::LookDown => &mut self.look_down,
        };
        *slot = pressed;
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn ahead_axis(&self) -> f32 {
        axis(self.forward, self.back)
    }

    #[inline]
    pub fn strafe_axis(&self) -> f32 {
        axis(self.strafe_right, self.strafe_left)
    }

    #[inline]
    pub fn yaw_axis(&self) -> f32 {
        axis(self.turn_left, self.turn_right)
    }

    /// Down raises pitch (flight-stick convention).
    #[inline]
    pub fn pitch_axis(&self) -> f32 {
        axis(self.look_down, self.look_up)
    }
}

#[inline]
fn axis(positive: bool, negative: bool) -> f32 {
    f32::from(u8::from(positive)) - f32::from(u8::from(negative))
}
