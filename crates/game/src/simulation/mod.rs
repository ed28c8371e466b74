mod movement;
mod tick;

pub use movement::{
    aabb_overlap, look_direction, simulate_humanoid_movement, simulate_projectile_movement,
    ATTACK_COOLDOWN, GRAVITY, GROUND_Y, HUMANOID_HALF_EXTENTS, MOVE_SPEED, MUZZLE_HEIGHT,
    PROJECTILE_HALF_EXTENTS, PROJECTILE_LAUNCH_SPEED, PROJECTILE_LIFT_SPEED,
};
pub use tick::{advance, FixedTimestep};
