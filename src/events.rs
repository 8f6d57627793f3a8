//! Engine event surface.
//!
//! Observers register through [`crate::Engine::observe`] and read
//! [`EngineEvent`] values off the returned [`EventMonitor`]. Events are
//! dispatched by the engine task in frame-processing order, so for any
//! one entity `Online` precedes `Updated` precedes `Offline`, and a
//! deregistered monitor receives nothing after [`EventMonitor::close`]
//! returns.

use tokio::sync::{mpsc, oneshot};

use crate::entity::DiscoveredEntity;
use crate::runtime::Command;
use crate::wire::{Acmpdu, Aecpdu};
use crate::{EntityId, MacAddress};

/// Everything the engine reports that is not the result of a command.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The transport failed fatally; the engine is shutting down and all
    /// in-flight commands complete with a network error.
    TransportError,
    /// A registered local entity appeared in discovery.
    LocalEntityOnline(DiscoveredEntity),
    /// A registered local entity re-advertised with changed information.
    LocalEntityUpdated(DiscoveredEntity),
    /// A registered local entity departed or expired from discovery.
    LocalEntityOffline(EntityId),
    /// A remote entity appeared.
    RemoteEntityOnline(DiscoveredEntity),
    /// A remote entity re-advertised with changed information.
    RemoteEntityUpdated(DiscoveredEntity),
    /// A remote entity departed or expired.
    RemoteEntityOffline(EntityId),
    /// An AECP command addressed to a registered local entity.
    AecpCommand {
        local_entity_id: EntityId,
        source: MacAddress,
        pdu: Aecpdu,
    },
    /// An unsolicited AECP response addressed to a registered local
    /// entity, with no matching in-flight command.
    AecpUnsolicitedResponse {
        local_entity_id: EntityId,
        pdu: Aecpdu,
    },
    /// An ACMP command issued by some other controller, observed on the
    /// wire.
    AcmpSniffedCommand(Acmpdu),
    /// An ACMP response to some other controller, observed on the wire.
    AcmpSniffedResponse(Acmpdu),
}

/// Receiving side of one observer registration.
pub struct EventMonitor {
    pub(crate) id: u64,
    pub(crate) rx: mpsc::Receiver<EngineEvent>,
    pub(crate) cmd_tx: mpsc::Sender<Command>,
}

impl EventMonitor {
    /// Await the next event. Returns `None` once the engine has shut
    /// down and the backlog is drained.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Drain without waiting; `None` when no event is queued.
    pub fn try_next(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Deregister. After this returns the engine delivers no further
    /// events to this monitor; anything already queued is discarded.
    pub async fn close(mut self) {
        let (reply, done) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Unobserve { id: self.id, reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
        self.rx.close();
    }
}

impl futures::Stream for EventMonitor {
    type Item = EngineEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<EngineEvent>> {
        self.rx.poll_recv(cx)
    }
}
