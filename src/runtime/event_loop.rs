//! The engine task.
//!
//! A single background task owns the whole [`EngineState`] and multiplexes
//! over the transport, the command channel from [`crate::Engine`] handles,
//! the 1-second discovery expiry scan, and the earliest retransmission or
//! advertising deadline. Handlers return [`Action`]s; only this loop
//! touches the network.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant};

use crate::config::EXPIRY_SCAN_INTERVAL;
use crate::error::Error;
use crate::events::EngineEvent;
use crate::net::RawNetwork;
use crate::runtime::correlator;
use crate::runtime::discovery::{self, Action};
use crate::runtime::state::EngineState;
use crate::runtime::Command;
use crate::wire::{self, AecpParseLimits, Pdu};

/// Why the select loop ended.
enum Exit {
    /// Orderly shutdown; the sender (if any) is acknowledged once the
    /// departures are on the wire and every command is aborted.
    Shutdown(Option<oneshot::Sender<()>>),
    /// The transport died underneath us.
    TransportFailed,
}

pub(crate) async fn engine_task<N: RawNetwork>(
    mut network: N,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut state: EngineState,
) {
    let mut expiry_scan = interval(EXPIRY_SCAN_INTERVAL);

    let exit = loop {
        let next_deadline = state.next_timer_deadline();
        let mut actions = Vec::new();

        // Handlers only touch state and the action list; all I/O happens
        // after the select, once the recv future released the network.
        let exit = tokio::select! {
            frame = network.recv() => {
                match frame {
                    Ok(bytes) => {
                        handle_frame(&bytes, &mut state, &mut actions);
                        None
                    }
                    Err(e) => {
                        tracing::error!("Transport receive failed: {e}");
                        Some(Exit::TransportFailed)
                    }
                }
            }

            _ = expiry_scan.tick() => {
                discovery::expiry_scan(&mut state, &mut actions, Instant::now());
                None
            }

            () = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                correlator::handle_timeouts(&mut state, &mut actions, now);
                discovery::advertise_due(&mut state, &mut actions, now);
                None
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Shutdown { reply }) => Some(Exit::Shutdown(Some(reply))),
                    // Every handle dropped; same as an explicit shutdown.
                    None => Some(Exit::Shutdown(None)),
                    Some(cmd) => {
                        handle_command(cmd, &mut state, &mut actions);
                        None
                    }
                }
            }
        };

        if let Some(exit) = exit {
            break exit;
        }
        if execute_actions(&network, &mut state, actions).await.is_err() {
            break Exit::TransportFailed;
        }
    };

    match exit {
        Exit::Shutdown(reply) => {
            shut_down(&network, &mut state).await;
            if let Some(reply) = reply {
                let _ = reply.send(());
            }
        }
        Exit::TransportFailed => transport_failed(&mut state),
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decode one inbound frame and route it. Undecodable frames are logged
/// and dropped; they are never fatal.
fn handle_frame(frame: &Bytes, state: &mut EngineState, actions: &mut Vec<Action>) {
    let limits = AecpParseLimits::from(&state.config);
    let Some((ethernet, pdu)) = wire::parse_frame(frame, &limits) else {
        tracing::debug!(len = frame.len(), "Dropping undecodable frame");
        return;
    };
    if ethernet.src == state.local_mac {
        return; // our own transmission looped back
    }
    match pdu {
        Pdu::Adp(adpdu) => discovery::handle_adpdu(&adpdu, ethernet.src, state, actions),
        Pdu::Aecp(aecpdu) => correlator::handle_aecpdu(aecpdu, ethernet.src, state, actions),
        Pdu::Acmp(acmpdu) => correlator::handle_acmpdu(acmpdu, state, actions),
    }
}

fn handle_command(cmd: Command, state: &mut EngineState, actions: &mut Vec<Action>) {
    match cmd {
        Command::RegisterLocalEntity { entity, reply } => {
            let result = register_local_entity(entity, state);
            let _ = reply.send(result);
        }
        Command::UnregisterLocalEntity { entity_id, reply } => {
            let result = unregister_local_entity(entity_id, state, actions);
            let _ = reply.send(result);
        }
        Command::UpdateLocalEntity { entity, reply } => {
            let result = update_local_entity(entity, state);
            let _ = reply.send(result);
        }
        Command::EnableAdvertising { entity_id, reply } => {
            let local_mac = state.local_mac;
            let result = match state.local_entities.get_mut(&entity_id) {
                Some(local) => {
                    if !local.advertising {
                        discovery::start_advertising(local, local_mac, actions);
                    }
                    Ok(())
                }
                None => Err(Error::UnknownLocalEntity),
            };
            let _ = reply.send(result);
        }
        Command::DisableAdvertising { entity_id, reply } => {
            let local_mac = state.local_mac;
            let result = match state.local_entities.get_mut(&entity_id) {
                Some(local) => {
                    if local.advertising {
                        discovery::stop_advertising(local, local_mac, actions);
                    }
                    Ok(())
                }
                None => Err(Error::UnknownLocalEntity),
            };
            let _ = reply.send(result);
        }
        Command::DiscoverRemoteEntities { target, reply } => {
            actions.push(Action::SendFrame(discovery::build_discover(state, target)));
            let _ = reply.send(Ok(()));
        }
        Command::SendAecpCommand {
            controller_entity_id,
            pdu,
            dest,
            reply,
        } => {
            correlator::handle_send_aecp(controller_entity_id, pdu, dest, reply, state, actions);
        }
        Command::SendAecpResponse { pdu, dest, reply } => {
            let result = correlator::handle_send_aecp_response(pdu, dest, state, actions);
            let _ = reply.send(result);
        }
        Command::SendAcmpCommand {
            controller_entity_id,
            pdu,
            reply,
        } => {
            correlator::handle_send_acmp(controller_entity_id, pdu, reply, state, actions);
        }
        Command::SendAcmpResponse { pdu, reply } => {
            let result = correlator::handle_send_acmp_response(pdu, state, actions);
            let _ = reply.send(result);
        }
        Command::Observe { reply } => {
            let _ = reply.send(state.add_observer());
        }
        Command::Unobserve { id, reply } => {
            state.remove_observer(id);
            let _ = reply.send(());
        }
        Command::Shutdown { .. } => unreachable!("handled by the select loop"),
    }
}

fn register_local_entity(
    entity: crate::LocalEntity,
    state: &mut EngineState,
) -> crate::Result<()> {
    let entity_id = entity.entity_id();
    if !entity_id.is_set() {
        return Err(Error::InvalidEntityType);
    }
    if state.local_entities.contains_key(&entity_id) {
        return Err(Error::DuplicateLocalEntityID);
    }
    let mut entity = entity.entity;
    entity.valid_time = entity.clamped_valid_time();
    entity.mac_address = state.local_mac;
    entity.interface_index = state.interface_index;
    tracing::info!(entity = %entity_id, "Registered local entity");
    state
        .local_entities
        .insert(entity_id, crate::runtime::state::LocalEntityState::new(entity));
    Ok(())
}

fn update_local_entity(entity: crate::LocalEntity, state: &mut EngineState) -> crate::Result<()> {
    let local_mac = state.local_mac;
    let interface_index = state.interface_index;
    let Some(local) = state.local_entities.get_mut(&entity.entity_id()) else {
        return Err(Error::UnknownLocalEntity);
    };
    let mut entity = entity.entity;
    entity.valid_time = entity.clamped_valid_time();
    entity.mac_address = local_mac;
    entity.interface_index = interface_index;
    local.entity = entity;
    Ok(())
}

fn unregister_local_entity(
    entity_id: crate::EntityId,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) -> crate::Result<()> {
    let local_mac = state.local_mac;
    let Some(mut local) = state.local_entities.remove(&entity_id) else {
        return Err(Error::UnknownLocalEntity);
    };
    if local.advertising {
        discovery::stop_advertising(&mut local, local_mac, actions);
    }
    if state.discovered.remove(&entity_id).is_some() {
        actions.push(Action::Emit(EngineEvent::LocalEntityOffline(entity_id)));
    }
    tracing::info!(entity = %entity_id, "Unregistered local entity");
    Ok(())
}

async fn execute_actions<N: RawNetwork>(
    network: &N,
    state: &mut EngineState,
    actions: Vec<Action>,
) -> std::io::Result<()> {
    for action in actions {
        match action {
            Action::SendFrame(frame) => network.send(frame).await?,
            Action::Emit(event) => state.emit(event),
        }
    }
    Ok(())
}

/// Orderly shutdown: every advertising entity departs, every pending
/// command aborts, then the task ends and observer channels close.
async fn shut_down<N: RawNetwork>(network: &N, state: &mut EngineState) {
    state.shutting_down = true;
    tracing::info!(
        pending = state.inflight.len(),
        "Engine shutting down, aborting pending commands"
    );

    let local_mac = state.local_mac;
    let mut actions = Vec::new();
    for local in state.local_entities.values_mut() {
        if local.advertising {
            discovery::stop_advertising(local, local_mac, &mut actions);
        }
    }
    correlator::abort_all(state, || Error::EngineShutDown);

    // Departures are best-effort at this point.
    let _ = execute_actions(network, state, actions).await;
}

/// Fatal transport failure: every observer hears about it once and every
/// pending command completes with a network error.
fn transport_failed(state: &mut EngineState) {
    state.shutting_down = true;
    state.emit(EngineEvent::TransportError);
    correlator::abort_all(state, || Error::TransportError);
}
