use super::input::InputState;
use super::EntityId;

/// Network-facing identity of one connected participant. The humanoid
/// reference is weak: it is cleared by a removal listener when the
/// humanoid dies, and the server binds a fresh one on the next tick.
#[derive(Debug, Clone, Default)]
pub struct Player {
    pub humanoid: Option<EntityId>,
    pub input: InputState,
    /// Sequence number of the last input the server applied. Absent
    /// until the first input arrives.
    pub input_sequence: Option<u16>,
}
