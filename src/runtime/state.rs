//! Engine state.
//!
//! All of it is owned by the engine task; handlers borrow it mutably and
//! return actions instead of doing I/O.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::entity::DiscoveredEntity;
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::wire::{Acmpdu, AcmpMessageType, AecpMessageType, Aecpdu, AemCommandType};
use crate::{EntityId, MacAddress};

/// Capacity of each observer's event channel.
pub(crate) const OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// A local entity registered with the engine.
pub(crate) struct LocalEntityState {
    pub entity: DiscoveredEntity,
    pub advertising: bool,
    /// Next ENTITY_AVAILABLE transmission; `None` while not advertising.
    pub next_advertise_at: Option<Instant>,
    /// Increments on every transmitted ENTITY_AVAILABLE.
    pub available_index: u32,
    aecp_sequence_id: u16,
    acmp_sequence_id: u16,
}

impl LocalEntityState {
    pub fn new(entity: DiscoveredEntity) -> Self {
        Self {
            entity,
            advertising: false,
            next_advertise_at: None,
            available_index: 0,
            aecp_sequence_id: 0,
            acmp_sequence_id: 0,
        }
    }

    pub fn next_aecp_sequence_id(&mut self) -> u16 {
        let id = self.aecp_sequence_id;
        self.aecp_sequence_id = self.aecp_sequence_id.wrapping_add(1);
        id
    }

    pub fn next_acmp_sequence_id(&mut self) -> u16 {
        let id = self.acmp_sequence_id;
        self.acmp_sequence_id = self.acmp_sequence_id.wrapping_add(1);
        id
    }

    /// Advertising period: half the advertised valid time.
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.entity.clamped_valid_time()) / 2)
    }
}

/// An entity observed through ADP, local or remote.
pub(crate) struct ObservedEntity {
    pub entity: DiscoveredEntity,
    pub expires_at: Instant,
}

/// Sub-protocol discriminator of an in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CommandKind {
    Aem,
    Aa,
    Mvu,
    Acmp,
}

impl CommandKind {
    pub fn of_aecp(pdu: &Aecpdu) -> Self {
        match pdu {
            Aecpdu::Aem(_) => Self::Aem,
            Aecpdu::Aa(_) => Self::Aa,
            Aecpdu::Mvu(_) => Self::Mvu,
        }
    }
}

/// Key of the in-flight table. ACMP commands use `EntityId::ZERO` as the
/// target since their responses arrive on the multicast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct InFlightKey {
    pub controller_entity_id: EntityId,
    pub target_entity_id: EntityId,
    pub sequence_id: u16,
    pub kind: CommandKind,
}

/// Completion channel of an in-flight command.
pub(crate) enum PendingResponder {
    Aecp(oneshot::Sender<Result<Aecpdu>>),
    Acmp(oneshot::Sender<Result<Acmpdu>>),
}

impl PendingResponder {
    pub fn complete_aecp(self, response: Aecpdu) {
        if let Self::Aecp(tx) = self {
            let _ = tx.send(Ok(response));
        }
    }

    pub fn complete_acmp(self, response: Acmpdu) {
        if let Self::Acmp(tx) = self {
            let _ = tx.send(Ok(response));
        }
    }

    pub fn fail(self, error: Error) {
        match self {
            Self::Aecp(tx) => {
                let _ = tx.send(Err(error));
            }
            Self::Acmp(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// One command awaiting its response.
pub(crate) struct InFlightCommand {
    /// The serialized frame, retransmitted verbatim.
    pub frame: Bytes,
    /// Sends left after the one already on the wire.
    pub attempts_remaining: u8,
    pub next_deadline: Instant,
    pub timeout: Duration,
    /// Message type the response must carry.
    pub expected_response: ExpectedResponse,
    pub responder: PendingResponder,
}

/// What a matching response looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpectedResponse {
    Aecp {
        message_type: AecpMessageType,
        /// AEM responses must echo the command type.
        aem_command_type: Option<AemCommandType>,
    },
    Acmp {
        message_type: AcmpMessageType,
    },
}

pub(crate) struct EngineState {
    pub config: EngineConfig,
    pub local_mac: MacAddress,
    pub interface_index: u16,
    pub local_entities: HashMap<EntityId, LocalEntityState>,
    /// Entities currently visible through ADP (local and remote).
    pub discovered: HashMap<EntityId, ObservedEntity>,
    pub inflight: HashMap<InFlightKey, InFlightCommand>,
    observers: HashMap<u64, mpsc::Sender<EngineEvent>>,
    next_observer_id: u64,
    pub shutting_down: bool,
}

impl EngineState {
    pub fn new(config: EngineConfig, local_mac: MacAddress, interface_index: u16) -> Self {
        Self {
            config,
            local_mac,
            interface_index,
            local_entities: HashMap::new(),
            discovered: HashMap::new(),
            inflight: HashMap::new(),
            observers: HashMap::new(),
            next_observer_id: 0,
            shutting_down: false,
        }
    }

    pub fn is_local(&self, entity_id: EntityId) -> bool {
        self.local_entities.contains_key(&entity_id)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn add_observer(&mut self) -> (u64, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(OBSERVER_CHANNEL_CAPACITY);
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.insert(id, tx);
        (id, rx)
    }

    pub fn remove_observer(&mut self, id: u64) {
        self.observers.remove(&id);
    }

    /// Deliver an event to every registered observer, in registration
    /// order. A full or closed channel drops the observer's copy.
    pub fn emit(&mut self, event: EngineEvent) {
        self.observers.retain(|id, tx| {
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(observer = *id, "Observer channel full, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Earliest retransmission or advertising deadline, if any.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        let retransmit = self
            .inflight
            .values()
            .map(|command| command.next_deadline)
            .min();
        let advertise = self
            .local_entities
            .values()
            .filter_map(|local| local.next_advertise_at)
            .min();
        match (retransmit, advertise) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }
}
