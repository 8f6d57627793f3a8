//! Shared fixtures for the end-to-end tests on the virtual network.

use avdecc_runtime::entity::DiscoveredEntity;
use avdecc_runtime::net::sim::{VirtualAvbNetwork, VirtualPort};
use avdecc_runtime::net::RawNetwork;
use avdecc_runtime::wire::{self, AecpParseLimits, Pdu};
use avdecc_runtime::{Engine, EngineConfig, EntityId, LocalEntity, MacAddress};
use bytes::Bytes;

pub const ENGINE_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const PEER_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

pub const CONTROLLER_ID: EntityId = EntityId::new(0xAAAA_0000_0000_0001);
pub const PEER_ENTITY_ID: EntityId = EntityId::new(0x0011_2233_4455_6677);

pub async fn start_engine(hub: &VirtualAvbNetwork, config: EngineConfig) -> Engine {
    let port = hub.attach(ENGINE_MAC);
    Engine::new(port, config)
        .await
        .expect("engine starts on the virtual network")
}

pub fn controller_entity(entity_id: EntityId) -> LocalEntity {
    LocalEntity::new(DiscoveredEntity::controller(
        entity_id,
        EntityId::new(0x0000_0000_0000_0010),
    ))
}

/// A simulated remote device on the virtual network.
pub struct Peer {
    pub mac: MacAddress,
    pub port: VirtualPort,
}

impl Peer {
    pub fn attach(hub: &VirtualAvbNetwork) -> Self {
        Self {
            mac: PEER_MAC,
            port: hub.attach(PEER_MAC),
        }
    }

    pub async fn send(&self, pdu: &Pdu) {
        self.send_to(MacAddress::AVDECC_MULTICAST, pdu).await;
    }

    pub async fn send_to(&self, dest: MacAddress, pdu: &Pdu) {
        let frame = wire::serialize_frame(dest, self.mac, pdu);
        RawNetwork::send(&self.port, frame)
            .await
            .expect("virtual network accepts frames");
    }

    /// Receive the next frame the hub delivered to this peer.
    pub async fn recv(&mut self) -> Pdu {
        let frame = self.port.recv().await.expect("hub stays alive");
        let (_, pdu) =
            wire::parse_frame(&frame, &AecpParseLimits::default()).expect("peers only see AVDECC");
        pdu
    }
}

/// Decode a tapped frame, skipping frames from the given source.
pub fn decode_tap(frame: &Bytes, skip_src: MacAddress) -> Option<Pdu> {
    let (ethernet, pdu) = wire::parse_frame(frame, &AecpParseLimits::default())?;
    if ethernet.src == skip_src {
        return None;
    }
    Some(pdu)
}
