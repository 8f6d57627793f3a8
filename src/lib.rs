//! # avdecc-runtime
//!
//! An async IEEE 1722.1 (AVDECC) controller protocol engine for tokio.
//!
//! The engine speaks the three AVDECC sub-protocols over a raw L2
//! transport: ADP (discovery), AECP (enumeration & control, with AEM, AA
//! and Milan MVU payloads) and ACMP (connection management). It maintains
//! the discovery view of the network, correlates commands with responses
//! under the 1722.1 retransmission rules, and surfaces everything else
//! (unsolicited notifications, sniffed ACMP traffic) as events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use avdecc_runtime::{Engine, EngineConfig, EntityId};
//!
//! #[tokio::main]
//! async fn main() -> avdecc_runtime::Result<()> {
//!     let network = my_l2_backend("en0")?;
//!     let engine = Engine::new(network, EngineConfig::default()).await?;
//!
//!     // Watch the network
//!     let mut events = engine.observe().await?;
//!     engine.register_local_entity(controller_entity).await?;
//!     engine.enable_entity_advertising(controller_id).await?;
//!     engine.discover_remote_entities().await?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("{event:?}");
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! All mutable state lives in a single background task. Public API calls
//! go through a command channel and resolve via oneshot replies, so the
//! ordering guarantees of the protocol (online precedes updated precedes
//! offline, exactly-once command completion) hold without shared locks.
//! The transport is abstract ([`net::RawNetwork`]); production backends
//! (pcap, OS-native L2 sockets) live out of tree, and an in-memory hub
//! ([`net::sim`]) serves tests and simulations.

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod net;
pub mod runtime;
pub mod status;

/// Wire format parsing for AVDECC PDUs.
/// Exposed for testing and interoperability verification.
pub mod wire;

pub use config::EngineConfig;
pub use entity::{DiscoveredEntity, LocalEntity};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventMonitor};
pub use runtime::Engine;
pub use status::{AaCommandStatus, AcmpStatus, AemCommandStatus, MvuCommandStatus};

use std::fmt;

// ============================================================================
// PROTOCOL IDENTIFIERS
// ============================================================================

/// 64-bit AVDECC entity identifier (EUI-64 semantics).
///
/// The all-zero value means "unset"; in a targeted ENTITY_DISCOVER it
/// addresses every entity on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u64);

impl EntityId {
    /// The distinguished "unset" identifier.
    pub const ZERO: Self = Self(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Check whether this identifier carries a real value.
    pub const fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 6-byte link-layer address. The all-zero value is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Multicast destination for all AVDECC traffic (IEEE 1722.1 §5.2).
    pub const AVDECC_MULTICAST: Self = Self([0x91, 0xE0, 0xF0, 0x01, 0x00, 0x00]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 6]
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Identification of one stream endpoint: the owning entity plus the
/// stream's 16-bit ordinal within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamIdentification {
    pub entity_id: EntityId,
    pub stream_index: u16,
}

impl StreamIdentification {
    pub const fn new(entity_id: EntityId, stream_index: u16) -> Self {
        Self {
            entity_id,
            stream_index,
        }
    }
}

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub mod prelude {
    pub use crate::{
        AaCommandStatus, AcmpStatus, AemCommandStatus, DiscoveredEntity, Engine, EngineConfig,
        EngineEvent, EntityId, Error, EventMonitor, LocalEntity, MacAddress, MvuCommandStatus,
        Result, StreamIdentification,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn entity_id_zero_is_unset() {
        assert!(!EntityId::ZERO.is_set());
        assert!(EntityId::new(1).is_set());
        assert_eq!(EntityId::default(), EntityId::ZERO);
    }

    #[test_log::test]
    fn entity_id_display_is_fixed_width_hex() {
        assert_eq!(
            EntityId::new(0x0011_2233_4455_6677).to_string(),
            "0x0011223344556677"
        );
    }

    #[test_log::test]
    fn mac_address_validity() {
        assert!(!MacAddress::default().is_valid());
        assert!(MacAddress::AVDECC_MULTICAST.is_valid());
        assert!(MacAddress::AVDECC_MULTICAST.is_multicast());
        assert!(!MacAddress::new([2, 0, 0, 0, 0, 1]).is_multicast());
    }
}
