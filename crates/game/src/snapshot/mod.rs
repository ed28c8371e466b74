mod codec;
mod world;

pub use codec::{
    CountWidth, EntityDumper, EntityLoader, HumanoidStrategy, PlayerStrategy, ProjectileStrategy,
    SnapshotCodec, SnapshotError,
};
pub use world::World;
