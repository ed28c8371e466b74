use bitflags::bitflags;

use crate::net::wire::{WireError, WireReader, WireWriter};

bitflags! {
    /// Button state carried with every input message and replicated in
    /// humanoid snapshots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputFlags: u8 {
        const MOVE_FORWARD = 1 << 0;
        const MOVE_BACKWARD = 1 << 1;
        const MOVE_LEFT = 1 << 2;
        const MOVE_RIGHT = 1 << 3;
        const USE_PRIMARY = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub flags: InputFlags,
    pub aim_yaw: f32,
    pub aim_pitch: f32,
}

impl InputState {
    pub fn use_primary(&self) -> bool {
        self.flags.contains(InputFlags::USE_PRIMARY)
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.put_u8(self.flags.bits());
        w.put_f32(self.aim_yaw);
        w.put_f32(self.aim_pitch);
    }

    pub fn decode(r: &mut WireReader) -> Result<Self, WireError> {
        let bits = r.get_u8()?;
        let flags = InputFlags::from_bits(bits).ok_or(WireError::InvalidEnum {
            name: "input flags",
            value: bits,
        })?;
        Ok(Self {
            flags,
            aim_yaw: r.get_f32()?,
            aim_pitch: r.get_f32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let input = InputState {
            flags: InputFlags::MOVE_FORWARD | InputFlags::USE_PRIMARY,
            aim_yaw: 1.25,
            aim_pitch: -0.5,
        };

        let mut w = WireWriter::new();
        input.encode(&mut w);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        assert_eq!(InputState::decode(&mut r).unwrap(), input);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn unknown_flag_bits_rejected() {
        let mut w = WireWriter::new();
        w.put_u8(0x80);
        w.put_f32(0.0);
        w.put_f32(0.0);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        assert_eq!(
            InputState::decode(&mut r),
            Err(WireError::InvalidEnum {
                name: "input flags",
                value: 0x80
            })
        );
    }
}
