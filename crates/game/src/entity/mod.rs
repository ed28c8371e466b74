mod humanoid;
mod input;
mod player;
mod projectile;

pub use humanoid::Humanoid;
pub use input::{InputFlags, InputState};
pub use player::Player;
pub use projectile::Projectile;

/// Server-assigned entity id. Monotonic per world, starting at 1, never
/// reused within a session, so a stale id always resolves to "absent"
/// rather than to some other entity.
pub type EntityId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    Humanoid = 0,
    Player = 1,
    Projectile = 2,
}

impl EntityKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Humanoid),
            1 => Some(Self::Player),
            2 => Some(Self::Projectile),
            _ => None,
        }
    }
}

/// Cleanup action another entity has subscribed on this one. Fires
/// synchronously when the entity is removed from its world and nulls out
/// the weak back-pointer held by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalListener {
    /// Clear `Player::humanoid` on the named player.
    ClearPlayerHumanoid(EntityId),
    /// Clear `Projectile::creator` on the named projectile.
    ClearProjectileCreator(EntityId),
}

#[derive(Debug, Clone)]
pub enum EntityData {
    Humanoid(Humanoid),
    Player(Player),
    Projectile(Projectile),
}

impl EntityData {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Humanoid(_) => EntityKind::Humanoid,
            EntityData::Player(_) => EntityKind::Player,
            EntityData::Projectile(_) => EntityKind::Projectile,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    pub data: EntityData,
    // Only meaningful inside one snapshot load pass.
    pub(crate) remove_flag: bool,
    listeners: Vec<RemovalListener>,
}

impl Entity {
    pub fn new(id: EntityId, data: EntityData) -> Self {
        Self {
            id,
            data,
            remove_flag: false,
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    /// Subscribe a cleanup action. Returns false if it was already
    /// registered; duplicates are never stored.
    pub fn add_removal_listener(&mut self, listener: RemovalListener) -> bool {
        if self.listeners.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Unsubscribe a cleanup action. Returns false if it was not present.
    pub fn remove_removal_listener(&mut self, listener: RemovalListener) -> bool {
        match self.listeners.iter().position(|l| *l == listener) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_listeners(&mut self) -> Vec<RemovalListener> {
        std::mem::take(&mut self.listeners)
    }

    pub fn humanoid(&self) -> Option<&Humanoid> {
        match &self.data {
            EntityData::Humanoid(h) => Some(h),
            _ => None,
        }
    }

    pub fn humanoid_mut(&mut self) -> Option<&mut Humanoid> {
        match &mut self.data {
            EntityData::Humanoid(h) => Some(h),
            _ => None,
        }
    }

    pub fn player(&self) -> Option<&Player> {
        match &self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        match &mut self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn projectile(&self) -> Option<&Projectile> {
        match &self.data {
            EntityData::Projectile(p) => Some(p),
            _ => None,
        }
    }

    pub fn projectile_mut(&mut self) -> Option<&mut Projectile> {
        match &mut self.data {
            EntityData::Projectile(p) => Some(p),
            _ => None,
        }
    }
}
