pub mod entity;
pub mod net;
pub mod simulation;
pub mod snapshot;

pub use entity::{
    Entity, EntityData, EntityId, EntityKind, Humanoid, InputFlags, InputState, Player, Projectile,
    RemovalListener,
};
pub use net::{
    sequence_after, Channel, MemoryTransport, Message, PeerId, ProtocolError, Transport,
    TransportError, TransportEvent, UdpTransport, WireError, WireReader, WireWriter, DEFAULT_PORT,
    DEFAULT_TICK_RATE, MAX_DATAGRAM,
};
pub use simulation::{advance, FixedTimestep};
pub use snapshot::{CountWidth, SnapshotCodec, SnapshotError, World};
