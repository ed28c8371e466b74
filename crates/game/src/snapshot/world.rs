use std::collections::BTreeMap;

use glam::Vec3;

use crate::entity::{
    Entity, EntityData, EntityId, EntityKind, Humanoid, Player, Projectile, RemovalListener,
};
use crate::net::wire::{WireReader, WireWriter};

use super::codec::{SnapshotCodec, SnapshotError};

/// Owns the complete live entity set for one side of the connection.
/// Ids come from a monotonic allocator and are never reused; the map is
/// ordered so snapshot dumps are byte-stable for a given state.
#[derive(Debug, Default)]
pub struct World {
    tick: u32,
    entities: BTreeMap<EntityId, Entity>,
    next_entity_id: EntityId,
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            entities: BTreeMap::new(),
            next_entity_id: 1,
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: u32) {
        self.tick = tick;
    }

    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn spawn_humanoid(&mut self, position: Vec3) -> EntityId {
        let id = self.allocate_id();
        self.entities
            .insert(id, Entity::new(id, EntityData::Humanoid(Humanoid::at(position))));
        id
    }

    pub fn spawn_player(&mut self) -> EntityId {
        let id = self.allocate_id();
        self.entities
            .insert(id, Entity::new(id, EntityData::Player(Player::default())));
        id
    }

    pub fn spawn_projectile(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        creator: Option<EntityId>,
    ) -> EntityId {
        let id = self.allocate_id();
        let mut projectile = Projectile::new(position, velocity);

        // Only keep the back-reference if the creator is still alive.
        let creator = creator.filter(|c| self.humanoid(*c).is_some());
        projectile.creator = creator;

        self.entities
            .insert(id, Entity::new(id, EntityData::Projectile(projectile)));

        if let Some(creator_id) = creator {
            if let Some(entity) = self.entities.get_mut(&creator_id) {
                entity.add_removal_listener(RemovalListener::ClearProjectileCreator(id));
            }
        }
        id
    }

    /// Remove an entity, firing every registered removal listener before
    /// the entity is dropped. Returns false if the id was not live.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(mut entity) = self.entities.remove(&id) else {
            return false;
        };

        for listener in entity.take_listeners() {
            match listener {
                RemovalListener::ClearPlayerHumanoid(player_id) => {
                    if let Some(player) = self.player_mut(player_id) {
                        player.humanoid = None;
                    }
                }
                RemovalListener::ClearProjectileCreator(projectile_id) => {
                    if let Some(projectile) = self.projectile_mut(projectile_id) {
                        projectile.creator = None;
                    }
                }
            }
        }

        // Drop the subscriptions this entity held on others.
        match &entity.data {
            EntityData::Player(player) => {
                if let Some(humanoid_id) = player.humanoid {
                    if let Some(humanoid) = self.entities.get_mut(&humanoid_id) {
                        humanoid
                            .remove_removal_listener(RemovalListener::ClearPlayerHumanoid(id));
                    }
                }
            }
            EntityData::Projectile(projectile) => {
                if let Some(creator_id) = projectile.creator {
                    if let Some(creator) = self.entities.get_mut(&creator_id) {
                        creator
                            .remove_removal_listener(RemovalListener::ClearProjectileCreator(id));
                    }
                }
            }
            EntityData::Humanoid(_) => {}
        }

        true
    }

    /// Point a player's weak humanoid reference at `humanoid` (or clear
    /// it), keeping the removal listener on the humanoid in step.
    /// Returns false if the player or the target humanoid is not live.
    pub fn bind_player_humanoid(
        &mut self,
        player_id: EntityId,
        humanoid: Option<EntityId>,
    ) -> bool {
        let old = match self.player(player_id) {
            Some(player) => player.humanoid,
            None => return false,
        };
        if old == humanoid {
            return true;
        }

        if let Some(new_id) = humanoid {
            if self.humanoid(new_id).is_none() {
                return false;
            }
        }

        if let Some(old_id) = old {
            if let Some(entity) = self.entities.get_mut(&old_id) {
                entity.remove_removal_listener(RemovalListener::ClearPlayerHumanoid(player_id));
            }
        }
        if let Some(new_id) = humanoid {
            if let Some(entity) = self.entities.get_mut(&new_id) {
                entity.add_removal_listener(RemovalListener::ClearPlayerHumanoid(player_id));
            }
        }
        if let Some(player) = self.player_mut(player_id) {
            player.humanoid = humanoid;
        }
        true
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    // True only mid-load, between the mark pass and the sweep.
    pub(crate) fn marked_for_removal(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(|e| e.remove_flag)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn humanoid(&self, id: EntityId) -> Option<&Humanoid> {
        self.get(id).and_then(Entity::humanoid)
    }

    pub fn humanoid_mut(&mut self, id: EntityId) -> Option<&mut Humanoid> {
        self.get_mut(id).and_then(Entity::humanoid_mut)
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.get(id).and_then(Entity::player)
    }

    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.get_mut(id).and_then(Entity::player_mut)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.get(id).and_then(Entity::projectile)
    }

    pub fn projectile_mut(&mut self, id: EntityId) -> Option<&mut Projectile> {
        self.get_mut(id).and_then(Entity::projectile_mut)
    }

    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.kind() == kind)
            .map(Entity::id)
            .collect()
    }

    pub fn players(&self) -> impl Iterator<Item = (EntityId, &Player)> {
        self.entities
            .values()
            .filter_map(|e| e.player().map(|p| (e.id(), p)))
    }

    /// Serialize every entity matched by the codec's registered kinds.
    pub fn dump(&self, codec: &SnapshotCodec) -> Result<Vec<u8>, SnapshotError> {
        self.dump_filtered(codec, |_| true)
    }

    /// Serialize the subset of entities accepted by `filter`, one
    /// section per registered kind: count, then per entity the type tag,
    /// id and type-specific fields.
    pub fn dump_filtered(
        &self,
        codec: &SnapshotCodec,
        filter: impl Fn(&Entity) -> bool,
    ) -> Result<Vec<u8>, SnapshotError> {
        let mut w = WireWriter::with_capacity(128);

        for (kind, count_width, dumper) in codec.sections() {
            let matching: Vec<&Entity> = self
                .entities
                .values()
                .filter(|e| e.kind() == kind && filter(e))
                .collect();

            if matching.len() > count_width.max() {
                return Err(SnapshotError::CountOverflow {
                    kind,
                    count: matching.len(),
                    max: count_width.max(),
                });
            }
            count_width.write(&mut w, matching.len());

            for entity in matching {
                w.put_u8(entity.kind().tag());
                w.put_u32(entity.id());
                dumper.dump(entity, &mut w);
            }
        }

        Ok(w.into_bytes())
    }

    /// Apply an incoming snapshot with mark-and-sweep semantics: every
    /// entity missing from the buffer is removed (listeners fire),
    /// unknown ids are created, known ids are updated in place. Applying
    /// the same buffer twice is a no-op. On error nothing is swept and
    /// the caller must treat the peer as unusable.
    pub fn load(&mut self, codec: &SnapshotCodec, bytes: &[u8]) -> Result<(), SnapshotError> {
        for entity in self.entities.values_mut() {
            entity.remove_flag = true;
        }

        let mut r = WireReader::new(bytes);
        if let Err(e) = self.load_records(codec, &mut r) {
            // The flag must not outlive the load pass.
            for entity in self.entities.values_mut() {
                entity.remove_flag = false;
            }
            return Err(e);
        }

        let stale: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.remove_flag)
            .map(Entity::id)
            .collect();
        for id in stale {
            self.remove(id);
        }
        Ok(())
    }

    fn load_records(
        &mut self,
        codec: &SnapshotCodec,
        r: &mut WireReader,
    ) -> Result<(), SnapshotError> {
        for count_width in codec.section_widths() {
            let count = count_width.read(r)?;
            for _ in 0..count {
                let tag = r.get_u8()?;
                let loader = codec
                    .loader_for(tag)
                    .ok_or(SnapshotError::UnknownEntityTag(tag))?;
                let id = r.get_u32()?;

                match self.entities.get_mut(&id) {
                    Some(existing) if existing.kind().tag() == tag => {
                        existing.remove_flag = false;
                    }
                    Some(_) => {
                        // A locally predicted entity squatting on this
                        // id. The authoritative record wins: evict it
                        // (listeners fire) and rebuild under the
                        // server's kind.
                        self.remove(id);
                        self.entities.insert(id, Entity::new(id, loader.create(id)));
                    }
                    None => {
                        self.entities.insert(id, Entity::new(id, loader.create(id)));
                        if id >= self.next_entity_id {
                            self.next_entity_id = id + 1;
                        }
                    }
                }

                loader.apply(self, id, r)?;
            }
        }

        if r.remaining() > 0 {
            return Err(SnapshotError::TrailingBytes(r.remaining()));
        }
        Ok(())
    }
}
