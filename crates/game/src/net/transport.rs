use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

pub type PeerId = u64;

pub const MAX_DATAGRAM: usize = 1400;

const CHANNEL_RELIABLE: u8 = 0;
const CHANNEL_UNRELIABLE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Reliable,
    Unreliable,
}

impl Channel {
    fn tag(self) -> u8 {
        match self {
            Channel::Reliable => CHANNEL_RELIABLE,
            Channel::Unreliable => CHANNEL_UNRELIABLE,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            CHANNEL_RELIABLE => Some(Channel::Reliable),
            CHANNEL_UNRELIABLE => Some(Channel::Unreliable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Message {
        peer: PeerId,
        channel: Channel,
        payload: Vec<u8>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The narrow contract the replication core needs from a transport:
/// polled events, per-peer tagged-channel sends, disconnect, and peer
/// enumeration. Both loops poll synchronously; nothing here blocks.
pub trait Transport {
    fn poll_event(&mut self) -> Option<TransportEvent>;
    fn send(&mut self, peer: PeerId, channel: Channel, payload: &[u8])
    -> Result<(), TransportError>;
    fn disconnect(&mut self, peer: PeerId);
    fn peer_ids(&self) -> Vec<PeerId>;
}

struct MemoryLink {
    tx: Sender<(Channel, Vec<u8>)>,
    rx: Receiver<(Channel, Vec<u8>)>,
}

/// In-process transport for tests and local simulation. Links are wired
/// in pairs; delivery is FIFO per link and fully deterministic.
#[derive(Default)]
pub struct MemoryTransport {
    next_peer_id: PeerId,
    links: HashMap<PeerId, MemoryLink>,
    pending: VecDeque<TransportEvent>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            next_peer_id: 1,
            links: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Wire two endpoints together. Returns `(peer id of b as seen by
    /// a, peer id of a as seen by b)`; both sides observe a
    /// `PeerConnected` on their next poll.
    pub fn connect(a: &mut MemoryTransport, b: &mut MemoryTransport) -> (PeerId, PeerId) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        let a_peer = a.add_link(MemoryLink { tx: a_tx, rx: a_rx });
        let b_peer = b.add_link(MemoryLink { tx: b_tx, rx: b_rx });
        (a_peer, b_peer)
    }

    fn add_link(&mut self, link: MemoryLink) -> PeerId {
        let peer = self.next_peer_id;
        self.next_peer_id += 1;
        self.links.insert(peer, link);
        self.pending.push_back(TransportEvent::PeerConnected(peer));
        peer
    }
}

impl Transport for MemoryTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let peers: Vec<PeerId> = self.links.keys().copied().collect();
        for peer in peers {
            let Some(link) = self.links.get(&peer) else {
                continue;
            };
            match link.rx.try_recv() {
                Ok((channel, payload)) => {
                    return Some(TransportEvent::Message {
                        peer,
                        channel,
                        payload,
                    });
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.links.remove(&peer);
                    return Some(TransportEvent::PeerDisconnected(peer));
                }
            }
        }
        None
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let link = self
            .links
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        if link.tx.send((channel, payload.to_vec())).is_err() {
            // Remote endpoint dropped; surface it as a disconnect.
            self.links.remove(&peer);
            self.pending
                .push_back(TransportEvent::PeerDisconnected(peer));
            return Err(TransportError::UnknownPeer(peer));
        }
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) {
        if self.links.remove(&peer).is_some() {
            self.pending
                .push_back(TransportEvent::PeerDisconnected(peer));
        }
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        self.links.keys().copied().collect()
    }
}

/// Nonblocking UDP endpoint. Peers are keyed by source address: the
/// first datagram from a new address raises `PeerConnected`, silence
/// past the timeout raises `PeerDisconnected`. Both channels share the
/// socket, so delivery is best-effort either way; this is a demo-grade
/// stand-in for a real reliable/unreliable transport.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peers: HashMap<PeerId, SocketAddr>,
    peers_by_addr: HashMap<SocketAddr, PeerId>,
    last_receive: HashMap<PeerId, Instant>,
    next_peer_id: PeerId,
    pending: VecDeque<TransportEvent>,
    recv_buf: Box<[u8; MAX_DATAGRAM]>,
    timeout: Duration,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            peers: HashMap::new(),
            peers_by_addr: HashMap::new(),
            last_receive: HashMap::new(),
            next_peer_id: 1,
            pending: VecDeque::new(),
            recv_buf: Box::new([0u8; MAX_DATAGRAM]),
            timeout: Duration::from_secs(10),
        })
    }

    /// Client-side constructor: bind an ephemeral port and register the
    /// server as the single known peer.
    pub fn connect<A: ToSocketAddrs>(server_addr: A) -> io::Result<Self> {
        let mut transport = Self::bind("0.0.0.0:0")?;
        let addr = server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no server address"))?;
        transport.register_peer(addr);
        Ok(transport)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn register_peer(&mut self, addr: SocketAddr) -> PeerId {
        if let Some(&peer) = self.peers_by_addr.get(&addr) {
            return peer;
        }
        let peer = self.next_peer_id;
        self.next_peer_id += 1;
        self.peers.insert(peer, addr);
        self.peers_by_addr.insert(addr, peer);
        self.last_receive.insert(peer, Instant::now());
        self.pending.push_back(TransportEvent::PeerConnected(peer));
        peer
    }

    fn drop_peer(&mut self, peer: PeerId) -> bool {
        if let Some(addr) = self.peers.remove(&peer) {
            self.peers_by_addr.remove(&addr);
            self.last_receive.remove(&peer);
            true
        } else {
            false
        }
    }

    fn pump(&mut self) -> io::Result<()> {
        loop {
            match self.socket.recv_from(&mut self.recv_buf[..]) {
                Ok((size, addr)) => {
                    if size < 1 {
                        continue;
                    }
                    let Some(channel) = Channel::from_tag(self.recv_buf[0]) else {
                        // Junk datagram; not from our protocol.
                        continue;
                    };
                    let payload = self.recv_buf[1..size].to_vec();
                    let peer = self.register_peer(addr);
                    self.last_receive.insert(peer, Instant::now());
                    self.pending.push_back(TransportEvent::Message {
                        peer,
                        channel,
                        payload,
                    });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn sweep_timeouts(&mut self) {
        let timed_out: Vec<PeerId> = self
            .last_receive
            .iter()
            .filter(|(_, at)| at.elapsed() > self.timeout)
            .map(|(&peer, _)| peer)
            .collect();
        for peer in timed_out {
            self.drop_peer(peer);
            self.pending
                .push_back(TransportEvent::PeerDisconnected(peer));
        }
    }
}

impl Transport for UdpTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.pending.is_empty() {
            if let Err(e) = self.pump() {
                log::warn!("udp receive failed: {e}");
            }
            self.sweep_timeouts();
        }
        self.pending.pop_front()
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let addr = *self
            .peers
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(channel.tag());
        frame.extend_from_slice(payload);
        self.socket.send_to(&frame, addr)?;
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) {
        if self.drop_peer(peer) {
            self.pending
                .push_back(TransportEvent::PeerDisconnected(peer));
        }
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }
}
