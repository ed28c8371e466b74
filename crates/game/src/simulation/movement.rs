use glam::Vec3;

use crate::entity::{InputFlags, InputState};

pub const MOVE_SPEED: f32 = 5.0;
pub const GRAVITY: f32 = 9.8;
pub const ATTACK_COOLDOWN: f32 = 0.5;
pub const PROJECTILE_LAUNCH_SPEED: f32 = 30.0;
pub const PROJECTILE_LIFT_SPEED: f32 = 2.0;
pub const MUZZLE_HEIGHT: f32 = 1.5;
pub const GROUND_Y: f32 = 0.0;

pub const HUMANOID_HALF_EXTENTS: Vec3 = Vec3::new(0.5, 1.0, 0.5);
pub const PROJECTILE_HALF_EXTENTS: Vec3 = Vec3::new(0.1, 0.1, 0.1);

/// Pure humanoid movement rule: the held movement flags become a
/// normalized horizontal vector in the yaw basis, scaled by MOVE_SPEED.
/// Runs identically on server and client, which is what makes replay
/// converge bit-for-bit.
pub fn simulate_humanoid_movement(position: Vec3, input: &InputState, dt: f32) -> Vec3 {
    let mut local = Vec3::ZERO;
    if input.flags.contains(InputFlags::MOVE_FORWARD) {
        local.z += 1.0;
    }
    if input.flags.contains(InputFlags::MOVE_BACKWARD) {
        local.z -= 1.0;
    }
    if input.flags.contains(InputFlags::MOVE_RIGHT) {
        local.x += 1.0;
    }
    if input.flags.contains(InputFlags::MOVE_LEFT) {
        local.x -= 1.0;
    }

    if local.length_squared() < 1e-6 {
        return position;
    }
    let normalized = local.normalize();

    let (sin_yaw, cos_yaw) = input.aim_yaw.sin_cos();
    let world_move = Vec3::new(
        normalized.x * cos_yaw + normalized.z * sin_yaw,
        0.0,
        -normalized.x * sin_yaw + normalized.z * cos_yaw,
    );

    position + world_move * MOVE_SPEED * dt
}

/// Pure projectile rule: gravity shaves the velocity first, then the
/// position integrates by the post-gravity velocity.
pub fn simulate_projectile_movement(position: Vec3, velocity: Vec3, dt: f32) -> (Vec3, Vec3) {
    let velocity = velocity - Vec3::Y * GRAVITY * dt;
    (position + velocity * dt, velocity)
}

/// Unit aim vector through the yaw/pitch basis.
pub fn look_direction(yaw: f32, pitch: f32) -> Vec3 {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let (sin_pitch, cos_pitch) = pitch.sin_cos();
    Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch)
}

pub fn aabb_overlap(a_center: Vec3, a_half: Vec3, b_center: Vec3, b_half: Vec3) -> bool {
    (a_center.x - b_center.x).abs() <= a_half.x + b_half.x
        && (a_center.y - b_center.y).abs() <= a_half.y + b_half.y
        && (a_center.z - b_center.z).abs() <= a_half.z + b_half.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_input_does_not_move() {
        let start = Vec3::new(3.0, 0.0, -2.0);
        let end = simulate_humanoid_movement(start, &InputState::default(), 1.0 / 30.0);
        assert_eq!(end, start);
    }

    #[test]
    fn forward_moves_along_yaw_zero_z() {
        let input = InputState {
            flags: InputFlags::MOVE_FORWARD,
            aim_yaw: 0.0,
            aim_pitch: 0.0,
        };
        let end = simulate_humanoid_movement(Vec3::ZERO, &input, 1.0);
        assert!((end.z - MOVE_SPEED).abs() < 1e-5);
        assert!(end.x.abs() < 1e-5);
        assert_eq!(end.y, 0.0);
    }

    #[test]
    fn diagonal_speed_is_normalized() {
        let input = InputState {
            flags: InputFlags::MOVE_FORWARD | InputFlags::MOVE_RIGHT,
            aim_yaw: 0.0,
            aim_pitch: 0.0,
        };
        let end = simulate_humanoid_movement(Vec3::ZERO, &input, 1.0);
        assert!((end.length() - MOVE_SPEED).abs() < 1e-4);
    }

    #[test]
    fn movement_is_deterministic() {
        let input = InputState {
            flags: InputFlags::MOVE_FORWARD | InputFlags::MOVE_LEFT,
            aim_yaw: 0.83,
            aim_pitch: 0.1,
        };
        let a = simulate_humanoid_movement(Vec3::new(1.0, 0.0, 2.0), &input, 1.0 / 30.0);
        let b = simulate_humanoid_movement(Vec3::new(1.0, 0.0, 2.0), &input, 1.0 / 30.0);
        assert_eq!(a.to_array().map(f32::to_bits), b.to_array().map(f32::to_bits));
    }

    #[test]
    fn projectile_integrates_post_gravity_velocity() {
        let (pos, vel) = simulate_projectile_movement(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0), 1.0);
        assert_eq!(vel, Vec3::new(0.0, -GRAVITY, 10.0));
        assert_eq!(pos, Vec3::new(0.0, -GRAVITY, 10.0));
    }

    #[test]
    fn look_direction_is_unit_length() {
        for (yaw, pitch) in [(0.0, 0.0), (1.2, -0.4), (-2.8, 0.9)] {
            assert!((look_direction(yaw, pitch).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn aabb_overlap_edges() {
        let half = Vec3::splat(0.5);
        assert!(aabb_overlap(Vec3::ZERO, half, Vec3::new(1.0, 0.0, 0.0), half));
        assert!(!aabb_overlap(Vec3::ZERO, half, Vec3::new(1.1, 0.0, 0.0), half));
    }
}
