//! Discovery (ADP) handling.
//!
//! Contains the ADP message handlers, the advertising scheduler and the
//! expiry scan. Handlers mutate [`EngineState`] and push [`Action`]s; the
//! event loop performs the I/O.

use bytes::Bytes;
use tokio::time::Instant;

use crate::events::EngineEvent;
use crate::runtime::state::{EngineState, LocalEntityState, ObservedEntity};
use crate::wire::{self, AdpMessageType, Adpdu, Pdu};
use crate::{EntityId, MacAddress};

// ============================================================================
// ACTION TYPE
// ============================================================================

/// Action to execute after handling an event
pub(crate) enum Action {
    /// Transmit a frame on the wire
    SendFrame(Bytes),
    /// Deliver an event to all observers
    Emit(EngineEvent),
}

/// Serialize a PDU into a multicast frame from our interface.
pub(crate) fn multicast_frame(state: &EngineState, pdu: &Pdu) -> Bytes {
    wire::serialize_frame(MacAddress::AVDECC_MULTICAST, state.local_mac, pdu)
}

// ============================================================================
// ADP MESSAGE HANDLERS
// ============================================================================

pub(crate) fn handle_adpdu(
    pdu: &Adpdu,
    source: MacAddress,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) {
    match pdu.message_type {
        AdpMessageType::EntityAvailable => handle_entity_available(pdu, source, state, actions),
        AdpMessageType::EntityDeparting => handle_entity_departing(pdu, state, actions),
        AdpMessageType::EntityDiscover => handle_entity_discover(pdu, state, actions),
    }
}

fn handle_entity_available(
    pdu: &Adpdu,
    source: MacAddress,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) {
    if !pdu.entity_id.is_set() {
        tracing::warn!("Dropping ENTITY_AVAILABLE without an entity ID");
        return;
    }

    let entity = pdu.to_discovered_entity(source, state.interface_index);
    let expires_at =
        Instant::now() + std::time::Duration::from_secs(u64::from(entity.clamped_valid_time()) * 2);
    let local = state.is_local(pdu.entity_id);

    match state.discovered.entry(pdu.entity_id) {
        std::collections::hash_map::Entry::Vacant(slot) => {
            tracing::debug!(entity = %pdu.entity_id, "Entity online (valid_time={}s)", entity.valid_time);
            slot.insert(ObservedEntity {
                entity: entity.clone(),
                expires_at,
            });
            actions.push(Action::Emit(if local {
                EngineEvent::LocalEntityOnline(entity)
            } else {
                EngineEvent::RemoteEntityOnline(entity)
            }));
        }
        std::collections::hash_map::Entry::Occupied(mut slot) => {
            let observed = slot.get_mut();
            observed.expires_at = expires_at;
            if observed.entity.adp_information_changed(&entity) {
                tracing::debug!(entity = %pdu.entity_id, "Entity updated");
                observed.entity = entity.clone();
                actions.push(Action::Emit(if local {
                    EngineEvent::LocalEntityUpdated(entity)
                } else {
                    EngineEvent::RemoteEntityUpdated(entity)
                }));
            } else {
                observed.entity = entity;
            }
        }
    }
}

fn handle_entity_departing(pdu: &Adpdu, state: &mut EngineState, actions: &mut Vec<Action>) {
    if state.discovered.remove(&pdu.entity_id).is_some() {
        tracing::debug!(entity = %pdu.entity_id, "Entity departing");
        actions.push(Action::Emit(if state.is_local(pdu.entity_id) {
            EngineEvent::LocalEntityOffline(pdu.entity_id)
        } else {
            EngineEvent::RemoteEntityOffline(pdu.entity_id)
        }));
    }
}

/// Another controller probes the network; answer for every advertising
/// local entity the probe addresses.
fn handle_entity_discover(pdu: &Adpdu, state: &mut EngineState, actions: &mut Vec<Action>) {
    let target = pdu.entity_id;
    let mut advertisements = Vec::new();
    for local in state.local_entities.values_mut() {
        if !local.advertising {
            continue;
        }
        if target.is_set() && target != local.entity.entity_id {
            continue;
        }
        local.available_index = local.available_index.wrapping_add(1);
        advertisements.push(Pdu::Adp(Adpdu::entity_available(
            &local.entity,
            local.available_index,
        )));
    }
    for pdu in advertisements {
        let frame = multicast_frame(state, &pdu);
        actions.push(Action::SendFrame(frame));
    }
}

// ============================================================================
// EXPIRY SCAN
// ============================================================================

/// Drop every observed entity whose advertisement has gone stale.
/// Runs at least once per second.
pub(crate) fn expiry_scan(state: &mut EngineState, actions: &mut Vec<Action>, now: Instant) {
    let expired: Vec<EntityId> = state
        .discovered
        .iter()
        .filter(|(_, observed)| now >= observed.expires_at)
        .map(|(id, _)| *id)
        .collect();
    for entity_id in expired {
        state.discovered.remove(&entity_id);
        tracing::debug!(entity = %entity_id, "Entity timed out");
        actions.push(Action::Emit(if state.is_local(entity_id) {
            EngineEvent::LocalEntityOffline(entity_id)
        } else {
            EngineEvent::RemoteEntityOffline(entity_id)
        }));
    }
}

// ============================================================================
// ADVERTISING
// ============================================================================

/// Start advertising a local entity: transmit immediately, then every
/// `valid_time / 2` seconds.
pub(crate) fn start_advertising(
    local: &mut LocalEntityState,
    local_mac: MacAddress,
    actions: &mut Vec<Action>,
) {
    local.advertising = true;
    local.available_index = local.available_index.wrapping_add(1);
    let pdu = Pdu::Adp(Adpdu::entity_available(&local.entity, local.available_index));
    actions.push(Action::SendFrame(wire::serialize_frame(
        MacAddress::AVDECC_MULTICAST,
        local_mac,
        &pdu,
    )));
    local.next_advertise_at = Some(Instant::now() + local.advertise_interval());
}

/// Stop advertising: one ENTITY_DEPARTING, then silence.
pub(crate) fn stop_advertising(
    local: &mut LocalEntityState,
    local_mac: MacAddress,
    actions: &mut Vec<Action>,
) {
    local.advertising = false;
    local.next_advertise_at = None;
    local.available_index = local.available_index.wrapping_add(1);
    let pdu = Pdu::Adp(Adpdu::entity_departing(&local.entity, local.available_index));
    actions.push(Action::SendFrame(wire::serialize_frame(
        MacAddress::AVDECC_MULTICAST,
        local_mac,
        &pdu,
    )));
}

/// Transmit ENTITY_AVAILABLE for every local entity whose advertising
/// deadline has passed, sampling its current field values.
pub(crate) fn advertise_due(state: &mut EngineState, actions: &mut Vec<Action>, now: Instant) {
    let local_mac = state.local_mac;
    for local in state.local_entities.values_mut() {
        let Some(deadline) = local.next_advertise_at else {
            continue;
        };
        if now < deadline {
            continue;
        }
        local.available_index = local.available_index.wrapping_add(1);
        let pdu = Pdu::Adp(Adpdu::entity_available(&local.entity, local.available_index));
        actions.push(Action::SendFrame(wire::serialize_frame(
            MacAddress::AVDECC_MULTICAST,
            local_mac,
            &pdu,
        )));
        local.next_advertise_at = Some(now + local.advertise_interval());
    }
}

// ============================================================================
// DISCOVERY REQUESTS
// ============================================================================

/// Build the ENTITY_DISCOVER probe. `EntityId::ZERO` probes globally.
pub(crate) fn build_discover(state: &EngineState, target: EntityId) -> Bytes {
    multicast_frame(state, &Pdu::Adp(Adpdu::entity_discover(target)))
}
