use crate::entity::{Entity, EntityData, EntityId, EntityKind, Humanoid, InputState, Player, Projectile};
use crate::net::wire::{WireError, WireReader, WireWriter};

use super::world::World;

/// Snapshot encode/decode failures. Always fatal for the in-progress
/// operation; the caller treats the originating peer as unusable.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SnapshotError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("no loader registered for entity tag {0}")]
    UnknownEntityTag(u8),
    #[error("entity {id} is not a {expected:?}")]
    KindMismatch { id: EntityId, expected: EntityKind },
    #[error("player {player} references missing humanoid {humanoid}")]
    MissingHumanoid { player: EntityId, humanoid: EntityId },
    #[error("{kind:?} count {count} exceeds the wire limit {max}")]
    CountOverflow {
        kind: EntityKind,
        count: usize,
        max: usize,
    },
    #[error("{0} trailing bytes after the last snapshot section")]
    TrailingBytes(usize),
}

/// Width of a per-section entity count. Sized per kind to what the game
/// can actually field, which bounds the snapshot packet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    U8,
    U16,
}

impl CountWidth {
    pub fn max(self) -> usize {
        match self {
            CountWidth::U8 => u8::MAX as usize,
            CountWidth::U16 => u16::MAX as usize,
        }
    }

    pub fn write(self, w: &mut WireWriter, count: usize) {
        match self {
            CountWidth::U8 => w.put_u8(count as u8),
            CountWidth::U16 => w.put_u16(count as u16),
        }
    }

    pub fn read(self, r: &mut WireReader) -> Result<usize, WireError> {
        match self {
            CountWidth::U8 => Ok(r.get_u8()? as usize),
            CountWidth::U16 => Ok(r.get_u16()? as usize),
        }
    }
}

/// Serializes the type-specific state of one entity.
pub trait EntityDumper {
    fn dump(&self, entity: &Entity, w: &mut WireWriter);
}

/// Builds and updates entities of one kind from snapshot records.
pub trait EntityLoader {
    /// Construct a blank entity for a previously-unseen id.
    fn create(&self, id: EntityId) -> EntityData;
    /// Read the type-specific fields and apply them to the entity.
    fn apply(&self, world: &mut World, id: EntityId, r: &mut WireReader)
    -> Result<(), SnapshotError>;
}

struct CodecEntry {
    kind: EntityKind,
    count_width: CountWidth,
    dumper: Box<dyn EntityDumper>,
    loader: Box<dyn EntityLoader>,
}

/// Ordered per-kind strategy table. Dump walks the entries in
/// registration order writing one section each; load walks the same
/// order, so both sides must register the same table. Kinds without an
/// entry are silently omitted on dump and fatal on load.
#[derive(Default)]
pub struct SnapshotCodec {
    entries: Vec<CodecEntry>,
}

impl SnapshotCodec {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        kind: EntityKind,
        count_width: CountWidth,
        dumper: Box<dyn EntityDumper>,
        loader: Box<dyn EntityLoader>,
    ) {
        self.entries.push(CodecEntry {
            kind,
            count_width,
            dumper,
            loader,
        });
    }

    /// All humanoids and projectiles: the state every peer sees.
    pub fn public() -> Self {
        let mut codec = Self::new();
        codec.register(
            EntityKind::Humanoid,
            CountWidth::U8,
            Box::new(HumanoidStrategy),
            Box::new(HumanoidStrategy),
        );
        codec.register(
            EntityKind::Projectile,
            CountWidth::U16,
            Box::new(ProjectileStrategy),
            Box::new(ProjectileStrategy),
        );
        codec
    }

    /// The per-peer player section appended after the public sections.
    pub fn player_section() -> Self {
        let mut codec = Self::new();
        codec.register(
            EntityKind::Player,
            CountWidth::U8,
            Box::new(PlayerStrategy),
            Box::new(PlayerStrategy),
        );
        codec
    }

    /// Client-side table matching `public` + `player_section` back to back.
    pub fn full() -> Self {
        let mut codec = Self::public();
        codec.register(
            EntityKind::Player,
            CountWidth::U8,
            Box::new(PlayerStrategy),
            Box::new(PlayerStrategy),
        );
        codec
    }

    pub(crate) fn sections(&self) -> impl Iterator<Item = (EntityKind, CountWidth, &dyn EntityDumper)> {
        self.entries
            .iter()
            .map(|e| (e.kind, e.count_width, e.dumper.as_ref()))
    }

    pub(crate) fn section_widths(&self) -> impl Iterator<Item = CountWidth> + '_ {
        self.entries.iter().map(|e| e.count_width)
    }

    pub(crate) fn loader_for(&self, tag: u8) -> Option<&dyn EntityLoader> {
        self.entries
            .iter()
            .find(|e| e.kind.tag() == tag)
            .map(|e| e.loader.as_ref())
    }
}

/// Humanoid record: position + input state.
pub struct HumanoidStrategy;

impl EntityDumper for HumanoidStrategy {
    fn dump(&self, entity: &Entity, w: &mut WireWriter) {
        let Some(humanoid) = entity.humanoid() else {
            return;
        };
        w.put_vec3(humanoid.position);
        humanoid.input.encode(w);
    }
}

impl EntityLoader for HumanoidStrategy {
    fn create(&self, _id: EntityId) -> EntityData {
        EntityData::Humanoid(Humanoid::default())
    }

    fn apply(
        &self,
        world: &mut World,
        id: EntityId,
        r: &mut WireReader,
    ) -> Result<(), SnapshotError> {
        let position = r.get_vec3()?;
        let input = InputState::decode(r)?;

        let humanoid = world.humanoid_mut(id).ok_or(SnapshotError::KindMismatch {
            id,
            expected: EntityKind::Humanoid,
        })?;
        humanoid.position = position;
        humanoid.input = input;
        Ok(())
    }
}

/// Projectile record: position + velocity. The creator reference is
/// server-side knowledge and never crosses the wire.
pub struct ProjectileStrategy;

impl EntityDumper for ProjectileStrategy {
    fn dump(&self, entity: &Entity, w: &mut WireWriter) {
        let Some(projectile) = entity.projectile() else {
            return;
        };
        w.put_vec3(projectile.position);
        w.put_vec3(projectile.velocity);
    }
}

impl EntityLoader for ProjectileStrategy {
    fn create(&self, _id: EntityId) -> EntityData {
        EntityData::Projectile(Projectile::default())
    }

    fn apply(
        &self,
        world: &mut World,
        id: EntityId,
        r: &mut WireReader,
    ) -> Result<(), SnapshotError> {
        let position = r.get_vec3()?;
        let velocity = r.get_vec3()?;

        let projectile = world
            .projectile_mut(id)
            .ok_or(SnapshotError::KindMismatch {
                id,
                expected: EntityKind::Projectile,
            })?;
        projectile.position = position;
        projectile.velocity = velocity;
        Ok(())
    }
}

/// Player record: optional bound humanoid id, input state, optional
/// acknowledged input sequence. A humanoid id the snapshot does not
/// carry is a referential inconsistency and fails the load.
pub struct PlayerStrategy;

impl EntityDumper for PlayerStrategy {
    fn dump(&self, entity: &Entity, w: &mut WireWriter) {
        let Some(player) = entity.player() else {
            return;
        };
        w.put_opt_u32(player.humanoid);
        player.input.encode(w);
        w.put_opt_u16(player.input_sequence);
    }
}

impl EntityLoader for PlayerStrategy {
    fn create(&self, _id: EntityId) -> EntityData {
        EntityData::Player(Player::default())
    }

    fn apply(
        &self,
        world: &mut World,
        id: EntityId,
        r: &mut WireReader,
    ) -> Result<(), SnapshotError> {
        let humanoid = r.get_opt_u32()?;
        let input = InputState::decode(r)?;
        let sequence = r.get_opt_u16()?;

        if let Some(humanoid_id) = humanoid {
            // The referenced humanoid must be carried by this same
            // snapshot: one that exists locally but is still marked
            // from the mark pass is about to be swept.
            if world.humanoid(humanoid_id).is_none() || world.marked_for_removal(humanoid_id) {
                return Err(SnapshotError::MissingHumanoid {
                    player: id,
                    humanoid: humanoid_id,
                });
            }
        }

        {
            let player = world.player_mut(id).ok_or(SnapshotError::KindMismatch {
                id,
                expected: EntityKind::Player,
            })?;
            player.input = input;
            player.input_sequence = sequence;
        }
        world.bind_player_humanoid(id, humanoid);
        Ok(())
    }
}
