use std::collections::VecDeque;

use glam::Vec3;

use skirmish::{advance, sequence_after, EntityId, InputState, World};

/// Replay landing within a millimeter of the pre-snapshot prediction
/// counts as agreement; anything larger is worth a log line.
const DIVERGENCE_THRESHOLD: f32 = 1e-3;

/// Client-side predict-and-reconcile state: a monotonic input sequence
/// counter plus the inputs sent but not yet acknowledged by the server.
pub struct PredictionEngine {
    next_sequence: u16,
    in_flight: VecDeque<(u16, InputState)>,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionEngine {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            in_flight: VecDeque::new(),
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Stamp `input` with the next sequence number, buffer it for
    /// replay and set it on the local player. Returns the sequence the
    /// caller should send, or None while the player has no live
    /// humanoid (pre-spawn: nothing is sent or buffered).
    pub fn predict(
        &mut self,
        world: &mut World,
        player_id: EntityId,
        input: InputState,
    ) -> Option<u16> {
        let humanoid_id = world.player(player_id)?.humanoid?;
        world.humanoid(humanoid_id)?;

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.in_flight.push_back((sequence, input));

        if let Some(player) = world.player_mut(player_id) {
            player.input = input;
            player.input_sequence = Some(sequence);
        }
        Some(sequence)
    }

    /// Rebuild the predicted state on top of a freshly loaded
    /// authoritative snapshot: drop every in-flight input the server
    /// has acknowledged, then replay the remainder in order with the
    /// shared tick function. `predicted_before` is the humanoid
    /// position recorded just before the load, compared against the
    /// post-replay position as a diagnostic only.
    pub fn reconcile(
        &mut self,
        world: &mut World,
        player_id: EntityId,
        predicted_before: Option<Vec3>,
        dt: f32,
    ) {
        let Some(player) = world.player(player_id) else {
            self.in_flight.clear();
            return;
        };

        if let Some(ack) = player.input_sequence {
            while let Some(&(sequence, _)) = self.in_flight.front() {
                if sequence_after(ack, sequence) {
                    break;
                }
                self.in_flight.pop_front();
            }
        }

        let Some(humanoid_id) = world.player(player_id).and_then(|p| p.humanoid) else {
            return;
        };

        let replay: Vec<(u16, InputState)> = self.in_flight.iter().copied().collect();
        for (sequence, input) in replay {
            if let Some(player) = world.player_mut(player_id) {
                player.input = input;
                player.input_sequence = Some(sequence);
            }
            advance(world, dt);
        }

        if let Some(before) = predicted_before {
            if let Some(humanoid) = world.humanoid(humanoid_id) {
                let divergence = (humanoid.position - before).length();
                if divergence > DIVERGENCE_THRESHOLD {
                    log::debug!("prediction diverged by {divergence:.4} after replay");
                }
            }
        }
    }
}
