use glam::Vec3;

use super::EntityId;

/// The creator reference is weak and only used to keep a projectile from
/// hitting the humanoid that fired it.
#[derive(Debug, Clone, Default)]
pub struct Projectile {
    pub position: Vec3,
    pub velocity: Vec3,
    pub creator: Option<EntityId>,
}

impl Projectile {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            creator: None,
        }
    }
}
