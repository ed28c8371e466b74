use std::collections::HashMap;

use glam::Vec3;

use skirmish::{
    advance, sequence_after, Channel, EntityId, EntityKind, FixedTimestep, InputState, Message,
    PeerId, SnapshotCodec, Transport, TransportEvent, World,
};

use crate::config::ServerConfig;

const SPAWN_POSITION: Vec3 = Vec3::ZERO;
const MIN_HUMANOIDS: usize = 2;

#[derive(Debug, Default)]
struct PeerData {
    players: Vec<EntityId>,
}

/// Authoritative session: owns the world, drains the transport, runs
/// fixed ticks and broadcasts per-peer snapshots.
pub struct GameServer<T: Transport> {
    transport: T,
    config: ServerConfig,
    world: World,
    timestep: FixedTimestep,
    peers: HashMap<PeerId, PeerData>,
    public_codec: SnapshotCodec,
    player_codec: SnapshotCodec,
    grid_payload: Option<Vec<u8>>,
}

impl<T: Transport> GameServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        // Interval 0 would divide by zero in the broadcast gate; treat
        // it as broadcasting every tick.
        let config = ServerConfig {
            snapshot_interval: config.snapshot_interval.max(1),
            ..config
        };
        let timestep = FixedTimestep::new(config.tick_rate);
        Self {
            transport,
            config,
            world: World::new(),
            timestep,
            peers: HashMap::new(),
            public_codec: SnapshotCodec::public(),
            player_codec: SnapshotCodec::player_section(),
            grid_payload: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Replace the opaque grid payload, pushing it to every connected
    /// peer. New peers receive it on connect.
    pub fn set_grid_payload(&mut self, data: Vec<u8>) {
        let message = Message::GridSnapshot { data: data.clone() }.encode();
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            if let Err(e) = self.transport.send(peer, Channel::Reliable, &message) {
                log::warn!("grid send to peer {peer} failed: {e}");
            }
        }
        self.grid_payload = Some(data);
    }

    /// One frame of the outer loop: drain the transport, then run every
    /// tick the elapsed time pays for.
    pub fn update(&mut self, delta: f32) {
        self.process_events();
        self.timestep.accumulate(delta);
        while self.timestep.consume_tick() {
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.populate();
        advance(&mut self.world, self.timestep.dt());
        if self.world.tick() % self.config.snapshot_interval == 0 {
            self.broadcast();
        }
    }

    /// Every player gets a humanoid; the arena keeps a minimum
    /// population even with no players bound.
    fn populate(&mut self) {
        let unbound: Vec<EntityId> = self
            .world
            .players()
            .filter(|(_, player)| player.humanoid.is_none())
            .map(|(id, _)| id)
            .collect();
        for player_id in unbound {
            let humanoid = self.world.spawn_humanoid(SPAWN_POSITION);
            self.world.bind_player_humanoid(player_id, Some(humanoid));
            log::debug!("bound humanoid {humanoid} to player {player_id}");
        }

        while self.world.ids_of_kind(EntityKind::Humanoid).len() < MIN_HUMANOIDS {
            self.world.spawn_humanoid(SPAWN_POSITION);
        }
    }

    fn process_events(&mut self) {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::PeerConnected(peer) => self.on_peer_connected(peer),
                TransportEvent::PeerDisconnected(peer) => self.remove_peer(peer),
                TransportEvent::Message { peer, payload, .. } => match Message::decode(&payload) {
                    Ok(message) => self.handle_message(peer, message),
                    Err(e) => {
                        log::warn!("dropping peer {peer}: undecodable message: {e}");
                        self.drop_peer(peer);
                    }
                },
            }
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId) {
        if self.peers.len() >= self.config.max_peers {
            log::warn!("peer {peer} rejected: server full");
            self.transport.disconnect(peer);
            return;
        }
        log::info!("peer {peer} connected");
        self.peers.insert(peer, PeerData::default());

        if let Some(grid) = &self.grid_payload {
            let message = Message::GridSnapshot { data: grid.clone() }.encode();
            if let Err(e) = self.transport.send(peer, Channel::Reliable, &message) {
                log::warn!("grid send to peer {peer} failed: {e}");
            }
        }
    }

    fn handle_message(&mut self, peer: PeerId, message: Message) {
        if !self.peers.contains_key(&peer) {
            return;
        }
        match message {
            Message::PlayerJoinRequest => self.handle_join(peer),
            Message::PlayerLeaveRequest => self.handle_leave(peer),
            Message::PlayerInputState { sequence, input } => {
                self.handle_input(peer, sequence, input);
            }
            other => {
                log::debug!("ignoring unexpected message from peer {peer}: {other:?}");
            }
        }
    }

    fn handle_join(&mut self, peer: PeerId) {
        // One player per peer. A duplicate join (a retried request, or
        // a response lost in flight) re-sends the existing id.
        let existing = self.peers.get(&peer).and_then(|d| d.players.first().copied());
        let player_id = match existing {
            Some(player_id) => player_id,
            None => {
                let player_id = self.world.spawn_player();
                if let Some(data) = self.peers.get_mut(&peer) {
                    data.players.push(player_id);
                }
                log::info!("peer {peer} joined as player {player_id}");
                player_id
            }
        };

        let response = Message::PlayerJoinResponse { player_id }.encode();
        if let Err(e) = self.transport.send(peer, Channel::Reliable, &response) {
            log::warn!("join response to peer {peer} failed: {e}");
        }
    }

    fn handle_leave(&mut self, peer: PeerId) {
        let Some(data) = self.peers.get_mut(&peer) else {
            return;
        };
        if let Some(player_id) = data.players.pop() {
            log::info!("peer {peer} left as player {player_id}");
            self.remove_player(player_id);
        }
    }

    fn handle_input(&mut self, peer: PeerId, sequence: u16, input: InputState) {
        let Some(&player_id) = self.peers.get(&peer).and_then(|d| d.players.first()) else {
            return;
        };
        let Some(player) = self.world.player_mut(player_id) else {
            return;
        };

        // Out-of-order and duplicate inputs are expected; keep the newest.
        let stale = player
            .input_sequence
            .is_some_and(|stored| !sequence_after(stored, sequence));
        if stale {
            return;
        }
        player.input = input;
        player.input_sequence = Some(sequence);
    }

    /// One public payload shared by everyone, plus each peer's own
    /// player section appended before sending.
    fn broadcast(&mut self) {
        let public = match self.world.dump(&self.public_codec) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("public snapshot dump failed: {e}");
                return;
            }
        };

        let peers: Vec<(PeerId, Vec<EntityId>)> = self
            .peers
            .iter()
            .map(|(&peer, data)| (peer, data.players.clone()))
            .collect();

        for (peer, players) in peers {
            let section = match self
                .world
                .dump_filtered(&self.player_codec, |e| players.contains(&e.id()))
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("player snapshot dump for peer {peer} failed: {e}");
                    continue;
                }
            };

            let mut payload = public.clone();
            payload.extend_from_slice(&section);
            let message = Message::EntitySnapshot {
                tick: self.world.tick(),
                payload,
            };
            if let Err(e) = self.transport.send(peer, Channel::Unreliable, &message.encode()) {
                log::warn!("snapshot send to peer {peer} failed: {e}");
            }
        }
    }

    fn remove_player(&mut self, player_id: EntityId) {
        if let Some(player) = self.world.player(player_id) {
            if let Some(humanoid) = player.humanoid {
                self.world.remove(humanoid);
            }
        }
        self.world.remove(player_id);
    }

    fn drop_peer(&mut self, peer: PeerId) {
        self.transport.disconnect(peer);
        self.remove_peer(peer);
    }

    fn remove_peer(&mut self, peer: PeerId) {
        let Some(data) = self.peers.remove(&peer) else {
            return;
        };
        log::info!("peer {peer} disconnected");
        for player_id in data.players {
            self.remove_player(player_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish::{InputFlags, InputState, MemoryTransport};

    fn server_with_client() -> (GameServer<MemoryTransport>, MemoryTransport, PeerId) {
        let mut server_side = MemoryTransport::new();
        let mut client_side = MemoryTransport::new();
        let (server_peer, _) = MemoryTransport::connect(&mut client_side, &mut server_side);
        let server = GameServer::new(server_side, ServerConfig::default());
        (server, client_side, server_peer)
    }

    fn drain_until_message(transport: &mut MemoryTransport) -> Option<Message> {
        while let Some(event) = transport.poll_event() {
            if let TransportEvent::Message { payload, .. } = event {
                return Some(Message::decode(&payload).ok()?);
            }
        }
        None
    }

    #[test]
    fn join_spawns_player_and_responds() {
        let (mut server, mut client, server_peer) = server_with_client();

        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(0.0);

        let Some(Message::PlayerJoinResponse { player_id }) = drain_until_message(&mut client)
        else {
            panic!("expected a join response");
        };
        assert!(server.world().player(player_id).is_some());
    }

    #[test]
    fn population_policy_binds_and_tops_up() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(1.0 / 30.0);

        let humanoids = server.world().ids_of_kind(EntityKind::Humanoid);
        assert_eq!(humanoids.len(), MIN_HUMANOIDS);

        let (player_id, player) = server.world().players().next().unwrap();
        let bound = player.humanoid.unwrap();
        assert!(humanoids.contains(&bound));
        assert!(server.world().player(player_id).is_some());
    }

    #[test]
    fn stale_input_is_discarded() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(0.0);
        let Some(Message::PlayerJoinResponse { player_id }) = drain_until_message(&mut client)
        else {
            panic!("expected a join response");
        };

        let forward = InputState {
            flags: InputFlags::MOVE_FORWARD,
            aim_yaw: 0.0,
            aim_pitch: 0.0,
        };
        client
            .send(
                server_peer,
                Channel::Unreliable,
                &Message::PlayerInputState { sequence: 10, input: forward }.encode(),
            )
            .unwrap();
        // An older sequence arriving late must not overwrite the input.
        client
            .send(
                server_peer,
                Channel::Unreliable,
                &Message::PlayerInputState { sequence: 9, input: InputState::default() }.encode(),
            )
            .unwrap();
        server.update(0.0);

        let player = server.world().player(player_id).unwrap();
        assert_eq!(player.input_sequence, Some(10));
        assert!(player.input.flags.contains(InputFlags::MOVE_FORWARD));
    }

    #[test]
    fn broadcast_carries_public_and_player_sections() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(1.0 / 30.0);

        let mut snapshot = None;
        while let Some(event) = client.poll_event() {
            if let TransportEvent::Message { payload, .. } = event {
                if let Ok(Message::EntitySnapshot { tick, payload }) = Message::decode(&payload) {
                    snapshot = Some((tick, payload));
                }
            }
        }
        let (tick, payload) = snapshot.expect("expected an entity snapshot");
        assert_eq!(tick, 1);

        let mut replica = World::new();
        replica.load(&SnapshotCodec::full(), &payload).unwrap();
        assert_eq!(replica.players().count(), 1);
        let (_, player) = replica.players().next().unwrap();
        assert!(player.humanoid.is_some());
        assert_eq!(
            replica.ids_of_kind(EntityKind::Humanoid).len(),
            MIN_HUMANOIDS
        );
    }

    #[test]
    fn leave_removes_player_and_humanoid() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(1.0 / 30.0);
        let (player_id, player) = server.world().players().next().unwrap();
        let humanoid = player.humanoid.unwrap();

        client
            .send(server_peer, Channel::Reliable, &Message::PlayerLeaveRequest.encode())
            .unwrap();
        server.update(0.0);

        assert!(server.world().player(player_id).is_none());
        assert!(!server.world().contains(humanoid));
    }

    #[test]
    fn undecodable_message_drops_the_peer() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(0.0);
        assert_eq!(server.peer_count(), 1);

        client
            .send(server_peer, Channel::Reliable, &[0xFE, 0xED])
            .unwrap();
        server.update(0.0);

        assert_eq!(server.peer_count(), 0);
        assert_eq!(server.world().players().count(), 0);
    }

    #[test]
    fn server_full_rejects_new_peers() {
        let mut server_side = MemoryTransport::new();
        let mut first = MemoryTransport::new();
        let mut second = MemoryTransport::new();
        MemoryTransport::connect(&mut first, &mut server_side);
        MemoryTransport::connect(&mut second, &mut server_side);

        let config = ServerConfig {
            max_peers: 1,
            ..Default::default()
        };
        let mut server = GameServer::new(server_side, config);
        server.update(0.0);

        assert_eq!(server.peer_count(), 1);
    }

    #[test]
    fn duplicate_join_reuses_the_player() {
        let (mut server, mut client, server_peer) = server_with_client();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        client
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(0.0);

        let mut ids = Vec::new();
        while let Some(event) = client.poll_event() {
            if let TransportEvent::Message { payload, .. } = event {
                if let Ok(Message::PlayerJoinResponse { player_id }) = Message::decode(&payload) {
                    ids.push(player_id);
                }
            }
        }
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_eq!(server.world().players().count(), 1);
    }

    #[test]
    fn zero_snapshot_interval_broadcasts_every_tick() {
        let mut server_side = MemoryTransport::new();
        let mut client_side = MemoryTransport::new();
        let (server_peer, _) = MemoryTransport::connect(&mut client_side, &mut server_side);

        let config = ServerConfig {
            snapshot_interval: 0,
            ..Default::default()
        };
        let mut server = GameServer::new(server_side, config);
        client_side
            .send(server_peer, Channel::Reliable, &Message::PlayerJoinRequest.encode())
            .unwrap();
        server.update(1.0 / 30.0);

        let mut saw_snapshot = false;
        while let Some(event) = client_side.poll_event() {
            if let TransportEvent::Message { payload, .. } = event {
                if let Ok(Message::EntitySnapshot { .. }) = Message::decode(&payload) {
                    saw_snapshot = true;
                }
            }
        }
        assert!(saw_snapshot);
    }

    #[test]
    fn grid_payload_reaches_existing_and_new_peers() {
        let (mut server, mut client, _) = server_with_client();
        server.update(0.0);
        server.set_grid_payload(vec![7, 7, 7]);

        assert_eq!(
            drain_until_message(&mut client),
            Some(Message::GridSnapshot { data: vec![7, 7, 7] })
        );
    }
}
