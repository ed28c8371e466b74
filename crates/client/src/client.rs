use glam::Vec3;

use skirmish::{
    advance, Channel, EntityId, FixedTimestep, InputState, Message, PeerId, SnapshotCodec,
    Transport, TransportEvent, World,
};

use crate::prediction::PredictionEngine;

/// Client session: mirrors the server's world from snapshots and keeps
/// the local player responsive through prediction. The world is absent
/// until a join response arrives.
pub struct GameClient<T: Transport> {
    transport: T,
    server_peer: Option<PeerId>,
    world: Option<World>,
    player_id: Option<EntityId>,
    grid: Option<Vec<u8>>,
    codec: SnapshotCodec,
    prediction: PredictionEngine,
    timestep: FixedTimestep,
}

impl<T: Transport> GameClient<T> {
    pub fn new(transport: T, tick_rate: u32) -> Self {
        Self {
            transport,
            server_peer: None,
            world: None,
            player_id: None,
            grid: None,
            codec: SnapshotCodec::full(),
            prediction: PredictionEngine::new(),
            timestep: FixedTimestep::new(tick_rate),
        }
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    pub fn grid(&self) -> Option<&[u8]> {
        self.grid.as_deref()
    }

    pub fn is_joined(&self) -> bool {
        self.world.is_some() && self.player_id.is_some()
    }

    /// Position of the local player's humanoid, if it is alive.
    pub fn local_position(&self) -> Option<Vec3> {
        let world = self.world.as_ref()?;
        let humanoid = world.player(self.player_id?)?.humanoid?;
        Some(world.humanoid(humanoid)?.position)
    }

    pub fn leave(&mut self) {
        if let Some(peer) = self.server_peer {
            let message = Message::PlayerLeaveRequest.encode();
            if let Err(e) = self.transport.send(peer, Channel::Reliable, &message) {
                log::warn!("leave request failed: {e}");
            }
        }
        self.reset();
    }

    /// One frame: drain the transport, then predict and simulate every
    /// tick the elapsed time pays for, holding `input` for all of them.
    pub fn update(&mut self, delta: f32, input: InputState) {
        self.process_events();
        self.timestep.accumulate(delta);
        while self.timestep.consume_tick() {
            self.tick(input);
        }
    }

    fn tick(&mut self, input: InputState) {
        let (Some(world), Some(player_id), Some(peer)) =
            (self.world.as_mut(), self.player_id, self.server_peer)
        else {
            return;
        };

        if let Some(sequence) = self.prediction.predict(world, player_id, input) {
            let message = Message::PlayerInputState { sequence, input }.encode();
            if let Err(e) = self.transport.send(peer, Channel::Unreliable, &message) {
                log::warn!("input send failed: {e}");
            }
        }
        advance(world, self.timestep.dt());
    }

    fn process_events(&mut self) {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::PeerConnected(peer) => {
                    log::info!("connected to server (peer {peer})");
                    self.server_peer = Some(peer);
                    let message = Message::PlayerJoinRequest.encode();
                    if let Err(e) = self.transport.send(peer, Channel::Reliable, &message) {
                        log::warn!("join request failed: {e}");
                    }
                }
                TransportEvent::PeerDisconnected(_) => {
                    log::info!("server connection lost");
                    self.server_peer = None;
                    self.reset();
                }
                TransportEvent::Message { payload, .. } => match Message::decode(&payload) {
                    Ok(message) => self.handle_message(message),
                    Err(e) => {
                        log::warn!("undecodable server message, resetting session: {e}");
                        self.disconnect();
                    }
                },
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::PlayerJoinResponse { player_id } => {
                log::info!("joined as player {player_id}");
                self.world = Some(World::new());
                self.player_id = Some(player_id);
                self.prediction = PredictionEngine::new();
            }
            Message::GridSnapshot { data } => {
                self.grid = Some(data);
            }
            Message::EntitySnapshot { tick, payload } => self.apply_snapshot(tick, &payload),
            other => {
                log::debug!("ignoring unexpected server message: {other:?}");
            }
        }
    }

    fn apply_snapshot(&mut self, tick: u32, payload: &[u8]) {
        let Some(world) = self.world.as_mut() else {
            // Snapshots can race the join response; drop them until the
            // world exists.
            return;
        };
        let Some(player_id) = self.player_id else {
            return;
        };

        let predicted = world
            .player(player_id)
            .and_then(|p| p.humanoid)
            .and_then(|h| world.humanoid(h))
            .map(|h| h.position);

        if let Err(e) = world.load(&self.codec, payload) {
            log::warn!("snapshot rejected, resetting session: {e}");
            self.disconnect();
            return;
        }
        world.set_tick(tick);
        let dt = self.timestep.dt();
        self.prediction.reconcile(world, player_id, predicted, dt);
    }

    fn disconnect(&mut self) {
        if let Some(peer) = self.server_peer.take() {
            self.transport.disconnect(peer);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.world = None;
        self.player_id = None;
        self.prediction = PredictionEngine::new();
        self.timestep.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish::MemoryTransport;

    fn client_with_server_side() -> (GameClient<MemoryTransport>, MemoryTransport, PeerId) {
        let mut client_side = MemoryTransport::new();
        let mut server_side = MemoryTransport::new();
        let (_, client_peer) = MemoryTransport::connect(&mut client_side, &mut server_side);
        let client = GameClient::new(client_side, 30);
        (client, server_side, client_peer)
    }

    fn next_message(transport: &mut MemoryTransport) -> Option<Message> {
        while let Some(event) = transport.poll_event() {
            if let TransportEvent::Message { payload, .. } = event {
                return Message::decode(&payload).ok();
            }
        }
        None
    }

    #[test]
    fn connect_sends_join_request() {
        let (mut client, mut server_side, _) = client_with_server_side();
        client.update(0.0, InputState::default());
        assert_eq!(next_message(&mut server_side), Some(Message::PlayerJoinRequest));
        assert!(!client.is_joined());
    }

    #[test]
    fn join_response_creates_the_world() {
        let (mut client, mut server_side, client_peer) = client_with_server_side();
        client.update(0.0, InputState::default());

        server_side
            .send(
                client_peer,
                Channel::Reliable,
                &Message::PlayerJoinResponse { player_id: 7 }.encode(),
            )
            .unwrap();
        client.update(0.0, InputState::default());

        assert!(client.is_joined());
        assert_eq!(client.player_id(), Some(7));
        assert_eq!(client.world().unwrap().entity_count(), 0);
    }

    #[test]
    fn grid_snapshot_is_stored_opaquely() {
        let (mut client, mut server_side, client_peer) = client_with_server_side();
        client.update(0.0, InputState::default());

        server_side
            .send(
                client_peer,
                Channel::Reliable,
                &Message::GridSnapshot { data: vec![1, 2, 3] }.encode(),
            )
            .unwrap();
        client.update(0.0, InputState::default());

        assert_eq!(client.grid(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn malformed_snapshot_resets_the_session() {
        let (mut client, mut server_side, client_peer) = client_with_server_side();
        client.update(0.0, InputState::default());

        server_side
            .send(
                client_peer,
                Channel::Reliable,
                &Message::PlayerJoinResponse { player_id: 1 }.encode(),
            )
            .unwrap();
        // Entity snapshot whose payload is cut short.
        server_side
            .send(
                client_peer,
                Channel::Unreliable,
                &Message::EntitySnapshot {
                    tick: 1,
                    payload: vec![5],
                }
                .encode(),
            )
            .unwrap();
        client.update(0.0, InputState::default());

        assert!(!client.is_joined());
    }
}
