//! The protocol engine and its public handle.
//!
//! [`Engine`] is a cheap cloneable handle. All protocol state lives in a
//! background task; handle methods enqueue a command and await the
//! reply, so no public call ever blocks on anything but the engine's own
//! processing.

use tokio::sync::{mpsc, oneshot};

use crate::entity::LocalEntity;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventMonitor};
use crate::net::RawNetwork;
use crate::wire::{Acmpdu, Aecpdu};
use crate::{EngineConfig, EntityId, MacAddress};

pub(crate) mod correlator;
pub(crate) mod discovery;
pub(crate) mod event_loop;
pub(crate) mod state;

/// Capacity of the handle-to-task command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// COMMANDS
// ============================================================================

/// Commands sent from handles to the engine task
pub(crate) enum Command {
    RegisterLocalEntity {
        entity: LocalEntity,
        reply: oneshot::Sender<Result<()>>,
    },
    UnregisterLocalEntity {
        entity_id: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateLocalEntity {
        entity: LocalEntity,
        reply: oneshot::Sender<Result<()>>,
    },
    EnableAdvertising {
        entity_id: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    DisableAdvertising {
        entity_id: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// `EntityId::ZERO` probes globally.
    DiscoverRemoteEntities {
        target: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    SendAecpCommand {
        controller_entity_id: EntityId,
        pdu: Aecpdu,
        dest: MacAddress,
        reply: oneshot::Sender<Result<Aecpdu>>,
    },
    SendAecpResponse {
        pdu: Aecpdu,
        dest: MacAddress,
        reply: oneshot::Sender<Result<()>>,
    },
    SendAcmpCommand {
        controller_entity_id: EntityId,
        pdu: Acmpdu,
        reply: oneshot::Sender<Result<Acmpdu>>,
    },
    SendAcmpResponse {
        pdu: Acmpdu,
        reply: oneshot::Sender<Result<()>>,
    },
    Observe {
        reply: oneshot::Sender<(u64, mpsc::Receiver<EngineEvent>)>,
    },
    Unobserve {
        id: u64,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ============================================================================
// ENGINE HANDLE
// ============================================================================

/// Handle to a running protocol engine.
///
/// Clones share the same engine task. The engine keeps running until
/// [`Engine::shutdown`] is called or every handle is dropped.
#[derive(Clone)]
pub struct Engine {
    cmd_tx: mpsc::Sender<Command>,
    local_mac: MacAddress,
    interface_index: u16,
}

impl Engine {
    /// Start an engine on the given transport.
    ///
    /// Joins the AVDECC multicast group and spawns the engine task.
    pub async fn new<N: RawNetwork + Sync>(network: N, config: EngineConfig) -> Result<Self> {
        let local_mac = network.local_mac();
        if !local_mac.is_valid() {
            return Err(Error::InterfaceInvalid);
        }
        network.join_multicast(MacAddress::AVDECC_MULTICAST)?;

        let interface_index = network.interface_index();
        let state = state::EngineState::new(config, local_mac, interface_index);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(event_loop::engine_task(network, cmd_rx, state));

        tracing::info!(mac = %local_mac, interface_index, "Engine started");
        Ok(Self {
            cmd_tx,
            local_mac,
            interface_index,
        })
    }

    /// The MAC address of the underlying interface.
    pub fn local_mac(&self) -> MacAddress {
        self.local_mac
    }

    /// The OS interface index of the underlying interface.
    pub fn interface_index(&self) -> u16 {
        self.interface_index
    }

    /// Register a local entity, allowing it to send and receive messages.
    pub async fn register_local_entity(&self, entity: LocalEntity) -> Result<()> {
        self.roundtrip(|reply| Command::RegisterLocalEntity { entity, reply })
            .await?
    }

    /// Unregister a local entity. An advertising entity departs first.
    pub async fn unregister_local_entity(&self, entity_id: EntityId) -> Result<()> {
        self.roundtrip(|reply| Command::UnregisterLocalEntity { entity_id, reply })
            .await?
    }

    /// Replace the advertised snapshot of a registered local entity.
    /// The next ENTITY_AVAILABLE samples the new field values; sequence
    /// counters and the advertising schedule are unaffected.
    pub async fn update_local_entity(&self, entity: LocalEntity) -> Result<()> {
        self.roundtrip(|reply| Command::UpdateLocalEntity { entity, reply })
            .await?
    }

    /// Start periodic ENTITY_AVAILABLE advertising for a local entity.
    pub async fn enable_entity_advertising(&self, entity_id: EntityId) -> Result<()> {
        self.roundtrip(|reply| Command::EnableAdvertising { entity_id, reply })
            .await?
    }

    /// Stop advertising; one ENTITY_DEPARTING is emitted.
    pub async fn disable_entity_advertising(&self, entity_id: EntityId) -> Result<()> {
        self.roundtrip(|reply| Command::DisableAdvertising { entity_id, reply })
            .await?
    }

    /// Broadcast a global ENTITY_DISCOVER.
    pub async fn discover_remote_entities(&self) -> Result<()> {
        self.roundtrip(|reply| Command::DiscoverRemoteEntities {
            target: EntityId::ZERO,
            reply,
        })
        .await?
    }

    /// Probe one specific entity.
    pub async fn discover_remote_entity(&self, entity_id: EntityId) -> Result<()> {
        self.roundtrip(|reply| Command::DiscoverRemoteEntities {
            target: entity_id,
            reply,
        })
        .await?
    }

    /// Send an AECP command from the given registered controller entity
    /// and await the matching response.
    ///
    /// The engine stamps `controller_entity_id` and `sequence_id`,
    /// retransmits per 1722.1 and resolves exactly once: with the
    /// response, with [`Error::Timeout`], or with
    /// [`Error::EngineShutDown`] when the engine stops first.
    pub async fn send_aecp_command(
        &self,
        controller_entity_id: EntityId,
        pdu: Aecpdu,
        dest: MacAddress,
    ) -> Result<Aecpdu> {
        self.roundtrip(|reply| Command::SendAecpCommand {
            controller_entity_id,
            pdu,
            dest,
            reply,
        })
        .await?
    }

    /// Send an AECP response (for a command delivered through
    /// [`EngineEvent::AecpCommand`]). Fire-and-forget.
    pub async fn send_aecp_response(&self, pdu: Aecpdu, dest: MacAddress) -> Result<()> {
        self.roundtrip(|reply| Command::SendAecpResponse { pdu, dest, reply })
            .await?
    }

    /// Send an ACMP command and await the matching response. Same
    /// completion contract as [`Engine::send_aecp_command`].
    pub async fn send_acmp_command(
        &self,
        controller_entity_id: EntityId,
        pdu: Acmpdu,
    ) -> Result<Acmpdu> {
        self.roundtrip(|reply| Command::SendAcmpCommand {
            controller_entity_id,
            pdu,
            reply,
        })
        .await?
    }

    /// Send an ACMP response on the multicast. Fire-and-forget.
    pub async fn send_acmp_response(&self, pdu: Acmpdu) -> Result<()> {
        self.roundtrip(|reply| Command::SendAcmpResponse { pdu, reply })
            .await?
    }

    /// Register an observer and return its event monitor.
    pub async fn observe(&self) -> Result<EventMonitor> {
        let (id, rx) = self
            .roundtrip(|reply| Command::Observe { reply })
            .await?;
        Ok(EventMonitor {
            id,
            rx,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Shut down the engine: advertising entities depart, in-flight
    /// commands abort, observer channels close. Blocks until the engine
    /// task has drained. Idempotent.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Send one command and await its oneshot reply.
    async fn roundtrip<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply))
            .await
            .map_err(|_| Error::EngineShutDown)?;
        rx.await.map_err(|_| Error::EngineShutDown)
    }
}
