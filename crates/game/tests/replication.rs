//! Replication flow through the public API: two worlds kept in step by
//! repeated dump/load cycles while both sides mutate.

use glam::Vec3;

use skirmish::{
    advance, Channel, InputFlags, InputState, MemoryTransport, Message, SnapshotCodec, Transport,
    TransportEvent, World,
};

fn receive_message(transport: &mut MemoryTransport) -> Option<Message> {
    while let Some(event) = transport.poll_event() {
        if let TransportEvent::Message { payload, .. } = event {
            return Message::decode(&payload).ok();
        }
    }
    None
}

#[test]
fn repeated_snapshots_keep_a_replica_in_step() {
    let codec = SnapshotCodec::public();
    let mut authority = World::new();
    let mut replica = World::new();

    let runner = authority.spawn_humanoid(Vec3::ZERO);
    authority.humanoid_mut(runner).unwrap().input = InputState {
        flags: InputFlags::MOVE_FORWARD,
        aim_yaw: 0.4,
        aim_pitch: 0.0,
    };
    authority.spawn_humanoid(Vec3::new(3.0, 0.0, 3.0));

    let dt = 1.0 / 30.0;
    for step in 0..10 {
        advance(&mut authority, dt);
        if step == 4 {
            // A mid-stream spawn must appear on the replica.
            authority.spawn_projectile(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Some(runner));
        }

        let bytes = authority.dump(&codec).unwrap();
        replica.load(&codec, &bytes).unwrap();

        assert_eq!(replica.entity_count(), authority.entity_count());
        let authoritative = authority.humanoid(runner).unwrap().position;
        let replicated = replica.humanoid(runner).unwrap().position;
        assert_eq!(
            replicated.to_array().map(f32::to_bits),
            authoritative.to_array().map(f32::to_bits)
        );
    }
}

#[test]
fn snapshot_survives_a_transport_hop() {
    let codec = SnapshotCodec::public();
    let mut sender = World::new();
    sender.spawn_humanoid(Vec3::new(1.0, 0.0, 2.0));
    sender.spawn_projectile(Vec3::new(0.0, 4.0, 0.0), Vec3::new(0.0, -1.0, 0.0), None);
    for _ in 0..7 {
        sender.advance_tick();
    }

    let mut a = MemoryTransport::new();
    let mut b = MemoryTransport::new();
    let (b_peer, _) = MemoryTransport::connect(&mut a, &mut b);

    let message = Message::EntitySnapshot {
        tick: sender.tick(),
        payload: sender.dump(&codec).unwrap(),
    };
    a.send(b_peer, Channel::Unreliable, &message.encode()).unwrap();

    let Some(Message::EntitySnapshot { tick, payload }) = receive_message(&mut b) else {
        panic!("expected the snapshot to arrive");
    };
    assert_eq!(tick, 7);

    let mut receiver = World::new();
    receiver.load(&codec, &payload).unwrap();
    receiver.set_tick(tick);
    assert_eq!(receiver.entity_count(), 2);
    assert_eq!(receiver.dump(&codec).unwrap(), sender.dump(&codec).unwrap());
}

#[test]
fn replica_converges_to_the_latest_applied_snapshot() {
    let codec = SnapshotCodec::public();
    let mut authority = World::new();
    let survivor = authority.spawn_humanoid(Vec3::ZERO);
    let casualty = authority.spawn_humanoid(Vec3::new(2.0, 0.0, 0.0));
    let before = authority.dump(&codec).unwrap();

    authority.remove(casualty);
    let after = authority.dump(&codec).unwrap();

    // Unreliable delivery can duplicate and reorder whole snapshots;
    // the replica always matches whichever one was applied last.
    let mut replica = World::new();
    replica.load(&codec, &after).unwrap();
    assert!(!replica.contains(casualty));

    replica.load(&codec, &before).unwrap();
    assert!(replica.contains(casualty));
    assert!(replica.contains(survivor));

    replica.load(&codec, &after).unwrap();
    replica.load(&codec, &after).unwrap();
    assert!(!replica.contains(casualty));
    assert_eq!(replica.dump(&codec).unwrap(), after);
}
