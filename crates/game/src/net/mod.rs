pub mod protocol;
pub mod transport;
pub mod wire;

pub use protocol::{sequence_after, Message, ProtocolError, DEFAULT_PORT, DEFAULT_TICK_RATE};
pub use transport::{
    Channel, MemoryTransport, PeerId, Transport, TransportError, TransportEvent, UdpTransport,
    MAX_DATAGRAM,
};
pub use wire::{WireError, WireReader, WireWriter};
