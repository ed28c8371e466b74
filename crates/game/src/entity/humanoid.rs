use glam::Vec3;

use super::input::InputState;

/// A walking, shooting body. Velocity and attack cooldown are
/// authoritative-side working state and are not replicated; clients
/// re-derive velocity from the movement rule during replay.
#[derive(Debug, Clone, Default)]
pub struct Humanoid {
    pub position: Vec3,
    pub velocity: Vec3,
    pub input: InputState,
    pub attack_cooldown: f32,
}

impl Humanoid {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}
