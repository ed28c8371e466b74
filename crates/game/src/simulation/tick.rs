use glam::Vec3;

use crate::entity::{EntityId, EntityKind, InputState};
use crate::snapshot::World;

use super::movement::{
    aabb_overlap, look_direction, simulate_humanoid_movement, simulate_projectile_movement,
    ATTACK_COOLDOWN, GROUND_Y, HUMANOID_HALF_EXTENTS, MUZZLE_HEIGHT, PROJECTILE_HALF_EXTENTS,
    PROJECTILE_LAUNCH_SPEED, PROJECTILE_LIFT_SPEED,
};

/// Fixed-rate accumulator. `consume_tick` subtracts one tick duration
/// instead of resetting, so slow frames never accumulate drift.
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        // Cap runaway frames so a stall doesn't trigger a tick storm.
        self.accumulator += delta.min(0.25);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// One deterministic simulation step, shared verbatim by the
/// authoritative server and client-side replay: input copy, attack
/// cooldown and projectile fire, movement integration, projectile
/// flight, collision, ground sweep, tick counter.
pub fn advance(world: &mut World, dt: f32) {
    copy_player_inputs(world);
    step_humanoids(world, dt);
    step_projectiles(world, dt);
    resolve_collisions(world);
    world.advance_tick();
}

fn copy_player_inputs(world: &mut World) {
    let bindings: Vec<(EntityId, InputState)> = world
        .players()
        .filter_map(|(_, player)| player.humanoid.map(|h| (h, player.input)))
        .collect();
    for (humanoid_id, input) in bindings {
        if let Some(humanoid) = world.humanoid_mut(humanoid_id) {
            humanoid.input = input;
        }
    }
}

fn step_humanoids(world: &mut World, dt: f32) {
    for id in world.ids_of_kind(EntityKind::Humanoid) {
        let shot = {
            let Some(humanoid) = world.humanoid_mut(id) else {
                continue;
            };
            humanoid.attack_cooldown = (humanoid.attack_cooldown - dt).max(0.0);

            if humanoid.input.use_primary() && humanoid.attack_cooldown == 0.0 {
                humanoid.attack_cooldown = ATTACK_COOLDOWN;
                let aim = look_direction(humanoid.input.aim_yaw, humanoid.input.aim_pitch);
                Some((
                    humanoid.position + Vec3::Y * MUZZLE_HEIGHT,
                    humanoid.velocity
                        + aim * PROJECTILE_LAUNCH_SPEED
                        + Vec3::Y * PROJECTILE_LIFT_SPEED,
                ))
            } else {
                None
            }
        };
        if let Some((position, velocity)) = shot {
            world.spawn_projectile(position, velocity, Some(id));
        }

        if let Some(humanoid) = world.humanoid_mut(id) {
            let start = humanoid.position;
            humanoid.position = simulate_humanoid_movement(start, &humanoid.input, dt);
            humanoid.velocity = (humanoid.position - start) / dt;
        }
    }
}

fn step_projectiles(world: &mut World, dt: f32) {
    for id in world.ids_of_kind(EntityKind::Projectile) {
        if let Some(projectile) = world.projectile_mut(id) {
            let (position, velocity) =
                simulate_projectile_movement(projectile.position, projectile.velocity, dt);
            projectile.position = position;
            projectile.velocity = velocity;
        }
    }
}

fn resolve_collisions(world: &mut World) {
    let humanoids: Vec<(EntityId, Vec3)> = world
        .ids_of_kind(EntityKind::Humanoid)
        .into_iter()
        .filter_map(|id| world.humanoid(id).map(|h| (id, h.position)))
        .collect();
    let projectiles: Vec<(EntityId, Vec3, Option<EntityId>)> = world
        .ids_of_kind(EntityKind::Projectile)
        .into_iter()
        .filter_map(|id| world.projectile(id).map(|p| (id, p.position, p.creator)))
        .collect();

    let mut hit: Vec<EntityId> = Vec::new();
    for (humanoid_id, humanoid_pos) in &humanoids {
        for (_, projectile_pos, creator) in &projectiles {
            if *creator == Some(*humanoid_id) {
                continue;
            }
            if aabb_overlap(
                *humanoid_pos,
                HUMANOID_HALF_EXTENTS,
                *projectile_pos,
                PROJECTILE_HALF_EXTENTS,
            ) {
                hit.push(*humanoid_id);
                break;
            }
        }
    }
    for id in hit {
        world.remove(id);
    }

    for (id, position, _) in projectiles {
        if position.y < GROUND_Y {
            world.remove(id);
        }
    }
}
