//! Entity types as seen by the discovery protocol.
//!
//! A [`DiscoveredEntity`] is the snapshot ADP advertises about one entity.
//! A [`LocalEntity`] is such a snapshot for an entity owned by this engine
//! instance; the engine keeps the advertising schedule for it separately.

use crate::{EntityId, MacAddress};

/// Lower bound of the ADP valid time, in seconds.
pub const MIN_VALID_TIME: u8 = 2;
/// Upper bound (and default) of the ADP valid time, in seconds.
pub const MAX_VALID_TIME: u8 = 62;

// ============================================================================
// CAPABILITY FLAGS
// ============================================================================

/// ADP entity_capabilities flags (IEEE 1722.1 Table 6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityCapabilities(pub u32);

impl EntityCapabilities {
    pub const EFU_MODE: u32 = 0x0000_0001;
    pub const ADDRESS_ACCESS_SUPPORTED: u32 = 0x0000_0002;
    pub const GATEWAY_ENTITY: u32 = 0x0000_0004;
    pub const AEM_SUPPORTED: u32 = 0x0000_0008;
    pub const LEGACY_AVC: u32 = 0x0000_0010;
    pub const ASSOCIATION_ID_SUPPORTED: u32 = 0x0000_0020;
    pub const ASSOCIATION_ID_VALID: u32 = 0x0000_0040;
    pub const VENDOR_UNIQUE_SUPPORTED: u32 = 0x0000_0080;
    pub const CLASS_A_SUPPORTED: u32 = 0x0000_0100;
    pub const CLASS_B_SUPPORTED: u32 = 0x0000_0200;
    pub const GPTP_SUPPORTED: u32 = 0x0000_0400;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn supports_aem(&self) -> bool {
        self.contains(Self::AEM_SUPPORTED)
    }
}

/// ADP talker_capabilities flags (IEEE 1722.1 Table 6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TalkerCapabilities(pub u16);

impl TalkerCapabilities {
    pub const IMPLEMENTED: u16 = 0x0001;
    pub const OTHER_SOURCE: u16 = 0x0200;
    pub const CONTROL_SOURCE: u16 = 0x0400;
    pub const MEDIA_CLOCK_SOURCE: u16 = 0x0800;
    pub const SMPTE_SOURCE: u16 = 0x1000;
    pub const MIDI_SOURCE: u16 = 0x2000;
    pub const AUDIO_SOURCE: u16 = 0x4000;
    pub const VIDEO_SOURCE: u16 = 0x8000;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

/// ADP listener_capabilities flags (IEEE 1722.1 Table 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerCapabilities(pub u16);

impl ListenerCapabilities {
    pub const IMPLEMENTED: u16 = 0x0001;
    pub const OTHER_SINK: u16 = 0x0200;
    pub const CONTROL_SINK: u16 = 0x0400;
    pub const MEDIA_CLOCK_SINK: u16 = 0x0800;
    pub const SMPTE_SINK: u16 = 0x1000;
    pub const MIDI_SINK: u16 = 0x2000;
    pub const AUDIO_SINK: u16 = 0x4000;
    pub const VIDEO_SINK: u16 = 0x8000;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

/// ADP controller_capabilities flags (IEEE 1722.1 Table 6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerCapabilities(pub u32);

impl ControllerCapabilities {
    pub const IMPLEMENTED: u32 = 0x0000_0001;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Snapshot of what ADP advertises about one entity.
///
/// Two entities are the same iff their `entity_id`s match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntity {
    pub entity_id: EntityId,
    pub entity_model_id: EntityId,
    pub mac_address: MacAddress,
    pub interface_index: u16,
    pub capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: TalkerCapabilities,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: ListenerCapabilities,
    pub controller_capabilities: ControllerCapabilities,
    pub gptp_grandmaster_id: EntityId,
    pub gptp_domain_number: u8,
    pub identify_control_index: u16,
    pub association_id: EntityId,
    /// Advertised validity in seconds, clamped to [2, 62].
    pub valid_time: u8,
}

impl DiscoveredEntity {
    /// Minimal controller-role entity with default capabilities.
    pub fn controller(entity_id: EntityId, entity_model_id: EntityId) -> Self {
        Self {
            entity_id,
            entity_model_id,
            mac_address: MacAddress::default(),
            interface_index: 0,
            capabilities: EntityCapabilities::new(EntityCapabilities::AEM_SUPPORTED),
            talker_stream_sources: 0,
            talker_capabilities: TalkerCapabilities::default(),
            listener_stream_sinks: 0,
            listener_capabilities: ListenerCapabilities::default(),
            controller_capabilities: ControllerCapabilities::new(
                ControllerCapabilities::IMPLEMENTED,
            ),
            gptp_grandmaster_id: EntityId::ZERO,
            gptp_domain_number: 0,
            identify_control_index: 0,
            association_id: EntityId::ZERO,
            valid_time: MAX_VALID_TIME,
        }
    }

    /// Valid time clamped to the range the wire format can carry.
    pub fn clamped_valid_time(&self) -> u8 {
        self.valid_time.clamp(MIN_VALID_TIME, MAX_VALID_TIME)
    }

    /// Whether a re-advertisement differs in any field that upper layers
    /// observe. A changed available_index alone is not an update, it
    /// increments on every advertisement.
    pub fn adp_information_changed(&self, newer: &Self) -> bool {
        self.capabilities != newer.capabilities
            || self.talker_stream_sources != newer.talker_stream_sources
            || self.talker_capabilities != newer.talker_capabilities
            || self.listener_stream_sinks != newer.listener_stream_sinks
            || self.listener_capabilities != newer.listener_capabilities
            || self.controller_capabilities != newer.controller_capabilities
            || self.gptp_grandmaster_id != newer.gptp_grandmaster_id
            || self.gptp_domain_number != newer.gptp_domain_number
            || self.association_id != newer.association_id
            || self.valid_time != newer.valid_time
    }
}

/// An entity owned by this engine instance.
///
/// Registering it with the engine allows it to send commands and receive
/// AECP traffic; advertising is toggled separately through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntity {
    pub entity: DiscoveredEntity,
}

impl LocalEntity {
    pub fn new(entity: DiscoveredEntity) -> Self {
        Self { entity }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.entity_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn valid_time_is_clamped_to_wire_range() {
        let mut entity = DiscoveredEntity::controller(EntityId::new(1), EntityId::new(2));
        entity.valid_time = 0;
        assert_eq!(entity.clamped_valid_time(), MIN_VALID_TIME);
        entity.valid_time = 200;
        assert_eq!(entity.clamped_valid_time(), MAX_VALID_TIME);
        entity.valid_time = 10;
        assert_eq!(entity.clamped_valid_time(), 10);
    }

    #[test_log::test]
    fn gptp_change_is_an_update() {
        let entity = DiscoveredEntity::controller(EntityId::new(1), EntityId::new(2));
        let mut newer = entity.clone();
        assert!(!entity.adp_information_changed(&newer));

        newer.gptp_grandmaster_id = EntityId::new(42);
        assert!(entity.adp_information_changed(&newer));
    }

    #[test_log::test]
    fn capability_flags_contain() {
        let caps = EntityCapabilities::new(
            EntityCapabilities::AEM_SUPPORTED | EntityCapabilities::CLASS_A_SUPPORTED,
        );
        assert!(caps.supports_aem());
        assert!(caps.contains(EntityCapabilities::CLASS_A_SUPPORTED));
        assert!(!caps.contains(EntityCapabilities::GPTP_SUPPORTED));
    }
}
