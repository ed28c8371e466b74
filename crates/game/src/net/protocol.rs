use crate::entity::{EntityId, InputState};

use super::wire::{WireError, WireReader, WireWriter};

pub const DEFAULT_PORT: u16 = 28960;
pub const DEFAULT_TICK_RATE: u32 = 30;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("unknown message tag {0}")]
    UnknownMessageTag(u8),
}

/// True when `b` is after `a` under 16-bit wraparound: the signed
/// difference is positive. Plain `<` breaks once the counter wraps.
#[inline]
pub fn sequence_after(a: u16, b: u16) -> bool {
    (b.wrapping_sub(a) as i16) > 0
}

const TAG_PLAYER_JOIN_REQUEST: u8 = 0;
const TAG_PLAYER_JOIN_RESPONSE: u8 = 1;
const TAG_PLAYER_LEAVE_REQUEST: u8 = 2;
const TAG_PLAYER_INPUT_STATE: u8 = 3;
const TAG_GRID_SNAPSHOT: u8 = 4;
const TAG_ENTITY_SNAPSHOT: u8 = 5;

/// Application messages. Every wire message is a one-byte tag followed
/// by the variant's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    PlayerJoinRequest,
    PlayerJoinResponse { player_id: EntityId },
    PlayerLeaveRequest,
    PlayerInputState { sequence: u16, input: InputState },
    /// Opaque world-grid payload, forwarded untouched by this core.
    GridSnapshot { data: Vec<u8> },
    /// Public entity sections followed by the receiving peer's player
    /// section, as produced by `World::dump`.
    EntitySnapshot { tick: u32, payload: Vec<u8> },
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(16);
        match self {
            Message::PlayerJoinRequest => w.put_u8(TAG_PLAYER_JOIN_REQUEST),
            Message::PlayerJoinResponse { player_id } => {
                w.put_u8(TAG_PLAYER_JOIN_RESPONSE);
                w.put_u32(*player_id);
            }
            Message::PlayerLeaveRequest => w.put_u8(TAG_PLAYER_LEAVE_REQUEST),
            Message::PlayerInputState { sequence, input } => {
                w.put_u8(TAG_PLAYER_INPUT_STATE);
                w.put_u16(*sequence);
                input.encode(&mut w);
            }
            Message::GridSnapshot { data } => {
                w.put_u8(TAG_GRID_SNAPSHOT);
                w.put_u32(data.len() as u32);
                w.put_bytes(data);
            }
            Message::EntitySnapshot { tick, payload } => {
                w.put_u8(TAG_ENTITY_SNAPSHOT);
                w.put_u32(*tick);
                w.put_bytes(payload);
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(bytes);
        let message = match r.get_u8()? {
            TAG_PLAYER_JOIN_REQUEST => Message::PlayerJoinRequest,
            TAG_PLAYER_JOIN_RESPONSE => Message::PlayerJoinResponse {
                player_id: r.get_u32()?,
            },
            TAG_PLAYER_LEAVE_REQUEST => Message::PlayerLeaveRequest,
            TAG_PLAYER_INPUT_STATE => Message::PlayerInputState {
                sequence: r.get_u16()?,
                input: InputState::decode(&mut r)?,
            },
            TAG_GRID_SNAPSHOT => {
                let len = r.get_u32()? as usize;
                Message::GridSnapshot {
                    data: r.get_bytes(len)?.to_vec(),
                }
            }
            TAG_ENTITY_SNAPSHOT => Message::EntitySnapshot {
                tick: r.get_u32()?,
                payload: r.rest().to_vec(),
            },
            other => return Err(ProtocolError::UnknownMessageTag(other)),
        };
        Ok(message)
    }
}
