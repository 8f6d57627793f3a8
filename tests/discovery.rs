//! End-to-end ADP scenarios on the virtual network.

#[allow(dead_code)]
mod helpers;

use std::time::Duration;

use avdecc_runtime::entity::DiscoveredEntity;
use avdecc_runtime::net::sim::VirtualAvbNetwork;
use avdecc_runtime::wire::{AdpMessageType, Adpdu, Pdu};
use avdecc_runtime::{EngineConfig, EngineEvent, EntityId};

use helpers::{
    controller_entity, decode_tap, start_engine, Peer, CONTROLLER_ID, PEER_ENTITY_ID,
};

fn peer_entity() -> DiscoveredEntity {
    let mut entity = DiscoveredEntity::controller(PEER_ENTITY_ID, EntityId::new(0x20));
    entity.valid_time = 62;
    entity.talker_stream_sources = 2;
    entity
}

#[test_log::test(tokio::test(start_paused = true))]
async fn entity_comes_online_and_expires_after_twice_valid_time() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut events = engine.observe().await.unwrap();
    let peer = Peer::attach(&hub);

    let started = tokio::time::Instant::now();
    peer.send(&Pdu::Adp(Adpdu::entity_available(&peer_entity(), 1)))
        .await;

    match events.next().await.expect("online event") {
        EngineEvent::RemoteEntityOnline(seen) => {
            assert_eq!(seen.entity_id, PEER_ENTITY_ID);
            assert_eq!(seen.valid_time, 62);
            assert!(seen.capabilities.supports_aem());
            assert_eq!(seen.mac_address, helpers::PEER_MAC);
        }
        other => panic!("expected online, got {other:?}"),
    }

    // No further ADP: exactly one offline, 2 x valid_time later, and
    // nothing in between.
    match events.next().await.expect("offline event") {
        EngineEvent::RemoteEntityOffline(entity_id) => assert_eq!(entity_id, PEER_ENTITY_ID),
        other => panic!("expected offline, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(124) && elapsed <= Duration::from_secs(126),
        "expired after {elapsed:?}"
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(events.try_next().is_none(), "no events after offline");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn refresh_without_changes_is_silent_and_gptp_change_updates_once() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut events = engine.observe().await.unwrap();
    let peer = Peer::attach(&hub);

    let entity = peer_entity();
    peer.send(&Pdu::Adp(Adpdu::entity_available(&entity, 1)))
        .await;
    assert!(matches!(
        events.next().await,
        Some(EngineEvent::RemoteEntityOnline(_))
    ));

    // Same information, bumped available_index: a refresh, not an update.
    peer.send(&Pdu::Adp(Adpdu::entity_available(&entity, 2)))
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(events.try_next().is_none(), "refresh must not update");

    let mut moved = entity.clone();
    moved.gptp_grandmaster_id = EntityId::new(0xFEED);
    peer.send(&Pdu::Adp(Adpdu::entity_available(&moved, 3)))
        .await;
    match events.next().await.expect("updated event") {
        EngineEvent::RemoteEntityUpdated(seen) => {
            assert_eq!(seen.gptp_grandmaster_id, EntityId::new(0xFEED));
        }
        other => panic!("expected updated, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(events.try_next().is_none(), "exactly one update");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn entity_departing_goes_offline_immediately() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut events = engine.observe().await.unwrap();
    let peer = Peer::attach(&hub);

    let entity = peer_entity();
    peer.send(&Pdu::Adp(Adpdu::entity_available(&entity, 1)))
        .await;
    assert!(matches!(
        events.next().await,
        Some(EngineEvent::RemoteEntityOnline(_))
    ));

    peer.send(&Pdu::Adp(Adpdu::entity_departing(&entity, 2)))
        .await;
    assert!(matches!(
        events.next().await,
        Some(EngineEvent::RemoteEntityOffline(id)) if id == PEER_ENTITY_ID
    ));

    // A re-appearance is a fresh online.
    peer.send(&Pdu::Adp(Adpdu::entity_available(&entity, 3)))
        .await;
    assert!(matches!(
        events.next().await,
        Some(EngineEvent::RemoteEntityOnline(_))
    ));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn discover_remote_entities_broadcasts_a_global_probe() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut tap = hub.tap();

    engine.discover_remote_entities().await.unwrap();

    let frame = tap.recv().await.expect("probe on the wire");
    let pdu = decode_tap(&frame, helpers::PEER_MAC).expect("engine frame");
    match pdu {
        Pdu::Adp(adpdu) => {
            assert_eq!(adpdu.message_type, AdpMessageType::EntityDiscover);
            assert_eq!(adpdu.entity_id, EntityId::ZERO);
        }
        other => panic!("expected ADP, got {other:?}"),
    }

    engine
        .discover_remote_entity(PEER_ENTITY_ID)
        .await
        .unwrap();
    let frame = tap.recv().await.expect("targeted probe");
    match decode_tap(&frame, helpers::PEER_MAC).expect("engine frame") {
        Pdu::Adp(adpdu) => {
            assert_eq!(adpdu.message_type, AdpMessageType::EntityDiscover);
            assert_eq!(adpdu.entity_id, PEER_ENTITY_ID);
        }
        other => panic!("expected ADP, got {other:?}"),
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn advertiser_cadence_is_half_the_valid_time() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut tap = hub.tap();

    let mut local = controller_entity(CONTROLLER_ID);
    local.entity.valid_time = 10;
    engine.register_local_entity(local).await.unwrap();

    let started = tokio::time::Instant::now();
    engine
        .enable_entity_advertising(CONTROLLER_ID)
        .await
        .unwrap();

    // Three advertisements: immediately, then every 5 s.
    let mut offsets = Vec::new();
    while offsets.len() < 3 {
        let frame = tap.recv().await.expect("advertisement");
        let Some(Pdu::Adp(adpdu)) = decode_tap(&frame, helpers::PEER_MAC) else {
            continue;
        };
        assert_eq!(adpdu.message_type, AdpMessageType::EntityAvailable);
        assert_eq!(adpdu.entity_id, CONTROLLER_ID);
        assert_eq!(adpdu.valid_time, 10);
        offsets.push(started.elapsed());
    }
    for (i, offset) in offsets.iter().enumerate() {
        let expected = Duration::from_secs(5 * i as u64);
        let delta = if *offset > expected {
            *offset - expected
        } else {
            expected - *offset
        };
        assert!(delta <= Duration::from_millis(500), "tick {i} at {offset:?}");
    }

    // Disable: exactly one ENTITY_DEPARTING, then silence.
    engine
        .disable_entity_advertising(CONTROLLER_ID)
        .await
        .unwrap();
    let frame = tap.recv().await.expect("departing");
    match decode_tap(&frame, helpers::PEER_MAC).expect("engine frame") {
        Pdu::Adp(adpdu) => {
            assert_eq!(adpdu.message_type, AdpMessageType::EntityDeparting);
            assert_eq!(adpdu.entity_id, CONTROLLER_ID);
        }
        other => panic!("expected ADP, got {other:?}"),
    }

    // Silence afterwards: no further advertisement for two periods.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(tap.try_recv().is_err(), "advertiser kept running");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn duplicate_local_entity_registration_is_rejected() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut tap = hub.tap();

    let entity_id = EntityId::new(0xBBBB_0000_0000_0001);
    engine
        .register_local_entity(controller_entity(entity_id))
        .await
        .unwrap();
    let second = engine.register_local_entity(controller_entity(entity_id)).await;
    assert!(matches!(
        second,
        Err(avdecc_runtime::Error::DuplicateLocalEntityID)
    ));

    // Only one advertiser instance exists: with valid_time 62 the period
    // is 31 s, so two periods produce exactly three frames.
    engine.enable_entity_advertising(entity_id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(63)).await;
    let mut count = 0;
    while let Ok(frame) = tap.try_recv() {
        if let Some(Pdu::Adp(adpdu)) = decode_tap(&frame, helpers::PEER_MAC) {
            if adpdu.message_type == AdpMessageType::EntityAvailable {
                count += 1;
            }
        }
    }
    assert_eq!(count, 3, "one advertiser, valid_time 62 -> 31 s period");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn advertising_entities_answer_probes() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut peer = Peer::attach(&hub);

    engine
        .register_local_entity(controller_entity(CONTROLLER_ID))
        .await
        .unwrap();
    engine
        .enable_entity_advertising(CONTROLLER_ID)
        .await
        .unwrap();

    // The initial advertisement reaches the peer first.
    loop {
        if let Pdu::Adp(adpdu) = peer.recv().await {
            if adpdu.message_type == AdpMessageType::EntityAvailable {
                break;
            }
        }
    }

    let started = tokio::time::Instant::now();
    peer.send(&Pdu::Adp(Adpdu::entity_discover(CONTROLLER_ID)))
        .await;

    loop {
        if let Pdu::Adp(adpdu) = peer.recv().await {
            if adpdu.message_type == AdpMessageType::EntityAvailable {
                assert_eq!(adpdu.entity_id, CONTROLLER_ID);
                break;
            }
        }
    }
    // Far sooner than the 31 s cadence: this was the probe answer.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn unregistering_an_advertising_entity_departs_first() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut tap = hub.tap();

    engine
        .register_local_entity(controller_entity(CONTROLLER_ID))
        .await
        .unwrap();
    engine
        .enable_entity_advertising(CONTROLLER_ID)
        .await
        .unwrap();

    // Drain the initial advertisement.
    let _ = tap.recv().await;

    engine.unregister_local_entity(CONTROLLER_ID).await.unwrap();
    let frame = tap.recv().await.expect("departing frame");
    match decode_tap(&frame, helpers::PEER_MAC).expect("engine frame") {
        Pdu::Adp(adpdu) => {
            assert_eq!(adpdu.message_type, AdpMessageType::EntityDeparting);
        }
        other => panic!("expected ADP, got {other:?}"),
    }

    assert!(matches!(
        engine.unregister_local_entity(CONTROLLER_ID).await,
        Err(avdecc_runtime::Error::UnknownLocalEntity)
    ));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn advertisements_sample_updated_entity_fields() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut tap = hub.tap();

    let mut local = controller_entity(CONTROLLER_ID);
    local.entity.valid_time = 10;
    engine.register_local_entity(local.clone()).await.unwrap();
    engine
        .enable_entity_advertising(CONTROLLER_ID)
        .await
        .unwrap();

    // First advertisement carries the registration snapshot.
    let frame = tap.recv().await.expect("initial advertisement");
    match decode_tap(&frame, helpers::PEER_MAC).expect("engine frame") {
        Pdu::Adp(adpdu) => assert_eq!(adpdu.gptp_grandmaster_id, EntityId::ZERO),
        other => panic!("expected ADP, got {other:?}"),
    }

    // Mutate between ticks; the next tick samples the new fields.
    local.entity.gptp_grandmaster_id = EntityId::new(0xFEED);
    engine.update_local_entity(local).await.unwrap();

    let frame = tap.recv().await.expect("next advertisement");
    match decode_tap(&frame, helpers::PEER_MAC).expect("engine frame") {
        Pdu::Adp(adpdu) => {
            assert_eq!(adpdu.message_type, AdpMessageType::EntityAvailable);
            assert_eq!(adpdu.gptp_grandmaster_id, EntityId::new(0xFEED));
        }
        other => panic!("expected ADP, got {other:?}"),
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn adp_for_a_registered_id_raises_local_events() {
    let hub = VirtualAvbNetwork::new();
    let engine = start_engine(&hub, EngineConfig::default()).await;
    let mut events = engine.observe().await.unwrap();
    let peer = Peer::attach(&hub);

    engine
        .register_local_entity(controller_entity(CONTROLLER_ID))
        .await
        .unwrap();

    // The same EntityID shows up in discovery (e.g. advertised through
    // another interface of this host).
    let mut mirror = DiscoveredEntity::controller(CONTROLLER_ID, EntityId::new(0x10));
    mirror.valid_time = 62;
    peer.send(&Pdu::Adp(Adpdu::entity_available(&mirror, 1)))
        .await;

    assert!(matches!(
        events.next().await,
        Some(EngineEvent::LocalEntityOnline(seen)) if seen.entity_id == CONTROLLER_ID
    ));
}
