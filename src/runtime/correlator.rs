//! Command correlation.
//!
//! Gives AECP and ACMP request/response semantics on top of best-effort
//! broadcast frames: sequence ID allocation, the in-flight table,
//! retransmission, timeout, duplicate suppression, and the routing of
//! everything that is not a response to one of our commands.
//!
//! ## Data Flow
//!
//! ```text
//! User awaits engine.send_aecp_command()
//!        │
//!        ▼
//! Engine handle sends Command::SendAecpCommand
//!        │
//!        ▼
//! handle_send_aecp() stamps sequence ID, records the in-flight entry,
//! returns Action::SendFrame
//!        │
//!        ▼
//! Peer responds (or the retransmission timer fires up to two more sends)
//!        │
//!        ▼
//! handle_aecpdu() matches the in-flight entry, completes the oneshot
//!        │
//!        ▼
//! User's .await resolves with the response (or Error::Timeout)
//! ```

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::runtime::discovery::Action;
use crate::runtime::state::{
    CommandKind, EngineState, ExpectedResponse, InFlightCommand, InFlightKey, PendingResponder,
};
use crate::wire::{self, Acmpdu, Aecpdu, Pdu, AECP_MAX_SIZE};
use crate::{EntityId, MacAddress};

// ============================================================================
// SEND PATH
// ============================================================================

/// Handle `Command::SendAecpCommand`
pub(crate) fn handle_send_aecp(
    controller_entity_id: EntityId,
    mut pdu: Aecpdu,
    dest: MacAddress,
    reply: oneshot::Sender<Result<Aecpdu>>,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) {
    if let Err(error) = validate_send(state, controller_entity_id, pdu.is_command()) {
        let _ = reply.send(Err(error));
        return;
    }
    let Some(expected_message_type) = pdu.message_type().response_type() else {
        let _ = reply.send(Err(Error::MessageNotSupported));
        return;
    };
    if !state.config.allow_send_big_aecp_payloads && pdu.wire_size() > AECP_MAX_SIZE {
        let _ = reply.send(Err(Error::MessageNotSupported));
        return;
    }

    let target_entity_id = pdu.target_entity_id();
    let kind = CommandKind::of_aecp(&pdu);
    let sequence_id = match state.local_entities.get_mut(&controller_entity_id) {
        Some(local) => local.next_aecp_sequence_id(),
        None => {
            let _ = reply.send(Err(Error::UnknownLocalEntity));
            return;
        }
    };

    let key = InFlightKey {
        controller_entity_id,
        target_entity_id,
        sequence_id,
        kind,
    };
    // A still-occupied slot after a full 16-bit wrap means the previous
    // command never completed; refuse rather than alias it.
    if state.inflight.contains_key(&key) {
        let _ = reply.send(Err(Error::InternalError));
        return;
    }

    pdu.stamp(controller_entity_id, sequence_id);
    let aem_command_type = match &pdu {
        Aecpdu::Aem(aem) => Some(aem.command_type),
        _ => None,
    };
    let frame = wire::serialize_frame(dest, state.local_mac, &Pdu::Aecp(pdu));
    let timeout = state.config.effective_command_timeout();

    tracing::debug!(
        controller = %controller_entity_id,
        target = %target_entity_id,
        sequence_id,
        "Sending AECP command"
    );

    state.inflight.insert(
        key,
        InFlightCommand {
            frame: frame.clone(),
            attempts_remaining: state.config.effective_command_attempts() - 1,
            next_deadline: Instant::now() + timeout,
            timeout,
            expected_response: ExpectedResponse::Aecp {
                message_type: expected_message_type,
                aem_command_type,
            },
            responder: PendingResponder::Aecp(reply),
        },
    );
    actions.push(Action::SendFrame(frame));
}

/// Handle `Command::SendAcmpCommand`
pub(crate) fn handle_send_acmp(
    controller_entity_id: EntityId,
    mut pdu: Acmpdu,
    reply: oneshot::Sender<Result<Acmpdu>>,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) {
    if let Err(error) = validate_send(state, controller_entity_id, pdu.message_type.is_command()) {
        let _ = reply.send(Err(error));
        return;
    }
    let Some(expected_message_type) = pdu.message_type.response_type() else {
        let _ = reply.send(Err(Error::MessageNotSupported));
        return;
    };

    let sequence_id = match state.local_entities.get_mut(&controller_entity_id) {
        Some(local) => local.next_acmp_sequence_id(),
        None => {
            let _ = reply.send(Err(Error::UnknownLocalEntity));
            return;
        }
    };

    // ACMP responses come back on the multicast; the key has no target.
    let key = InFlightKey {
        controller_entity_id,
        target_entity_id: EntityId::ZERO,
        sequence_id,
        kind: CommandKind::Acmp,
    };
    if state.inflight.contains_key(&key) {
        let _ = reply.send(Err(Error::InternalError));
        return;
    }

    pdu.stamp(controller_entity_id, sequence_id);
    let timeout = state.config.acmp_timeout(pdu.message_type);
    let frame = wire::serialize_frame(
        MacAddress::AVDECC_MULTICAST,
        state.local_mac,
        &Pdu::Acmp(pdu),
    );

    tracing::debug!(
        controller = %controller_entity_id,
        sequence_id,
        "Sending ACMP command"
    );

    state.inflight.insert(
        key,
        InFlightCommand {
            frame: frame.clone(),
            attempts_remaining: state.config.effective_command_attempts() - 1,
            next_deadline: Instant::now() + timeout,
            timeout,
            expected_response: ExpectedResponse::Acmp {
                message_type: expected_message_type,
            },
            responder: PendingResponder::Acmp(reply),
        },
    );
    actions.push(Action::SendFrame(frame));
}

fn validate_send(
    state: &EngineState,
    controller_entity_id: EntityId,
    is_command: bool,
) -> Result<()> {
    if state.shutting_down {
        return Err(Error::EngineShutDown);
    }
    if !is_command {
        return Err(Error::MessageNotSupported);
    }
    let Some(local) = state.local_entities.get(&controller_entity_id) else {
        return Err(Error::UnknownLocalEntity);
    };
    if !local
        .entity
        .controller_capabilities
        .contains(crate::entity::ControllerCapabilities::IMPLEMENTED)
    {
        return Err(Error::InvalidEntityType);
    }
    Ok(())
}

/// Handle `Command::SendAecpResponse`: fire-and-forget, no tracking.
pub(crate) fn handle_send_aecp_response(
    pdu: Aecpdu,
    dest: MacAddress,
    state: &EngineState,
    actions: &mut Vec<Action>,
) -> Result<()> {
    if !pdu.is_response() {
        return Err(Error::MessageNotSupported);
    }
    if !state.config.allow_send_big_aecp_payloads && pdu.wire_size() > AECP_MAX_SIZE {
        return Err(Error::MessageNotSupported);
    }
    actions.push(Action::SendFrame(wire::serialize_frame(
        dest,
        state.local_mac,
        &Pdu::Aecp(pdu),
    )));
    Ok(())
}

/// Handle `Command::SendAcmpResponse`: fire-and-forget, multicast.
pub(crate) fn handle_send_acmp_response(
    pdu: Acmpdu,
    state: &EngineState,
    actions: &mut Vec<Action>,
) -> Result<()> {
    if !pdu.message_type.is_response() {
        return Err(Error::MessageNotSupported);
    }
    actions.push(Action::SendFrame(wire::serialize_frame(
        MacAddress::AVDECC_MULTICAST,
        state.local_mac,
        &Pdu::Acmp(pdu),
    )));
    Ok(())
}

// ============================================================================
// RECEIVE PATH
// ============================================================================

/// Route an inbound AECPDU: in-flight completion, command delivery to a
/// local entity, unsolicited notification, or silent drop.
pub(crate) fn handle_aecpdu(
    pdu: Aecpdu,
    source: MacAddress,
    state: &mut EngineState,
    actions: &mut Vec<Action>,
) {
    if pdu.is_response() {
        let key = InFlightKey {
            controller_entity_id: pdu.controller_entity_id(),
            target_entity_id: pdu.target_entity_id(),
            sequence_id: pdu.sequence_id(),
            kind: CommandKind::of_aecp(&pdu),
        };
        let matched = state
            .inflight
            .get(&key)
            .is_some_and(|command| matches_expected_aecp(&command.expected_response, &pdu));
        if matched {
            if let Some(command) = state.inflight.remove(&key) {
                tracing::debug!(sequence_id = pdu.sequence_id(), "AECP response matched");
                command.responder.complete_aecp(pdu);
            }
            return;
        }

        let controller_entity_id = pdu.controller_entity_id();
        if state.is_local(controller_entity_id) {
            if pdu.is_unsolicited() {
                actions.push(Action::Emit(EngineEvent::AecpUnsolicitedResponse {
                    local_entity_id: controller_entity_id,
                    pdu,
                }));
            } else {
                // Late duplicate of an already-completed command.
                tracing::trace!(
                    sequence_id = pdu.sequence_id(),
                    "Dropping stale AECP response"
                );
            }
        }
        return;
    }

    // Commands are delivered when they target one of our entities.
    let target_entity_id = pdu.target_entity_id();
    if state.is_local(target_entity_id) {
        actions.push(Action::Emit(EngineEvent::AecpCommand {
            local_entity_id: target_entity_id,
            source,
            pdu,
        }));
    } else {
        tracing::trace!(target = %target_entity_id, "Ignoring AECP command for foreign entity");
    }
}

fn matches_expected_aecp(expected: &ExpectedResponse, pdu: &Aecpdu) -> bool {
    match expected {
        ExpectedResponse::Aecp {
            message_type,
            aem_command_type,
        } => {
            if pdu.message_type() != *message_type {
                return false;
            }
            match (aem_command_type, pdu) {
                (Some(expected_type), Aecpdu::Aem(aem)) => aem.command_type == *expected_type,
                (None, _) => true,
                _ => false,
            }
        }
        ExpectedResponse::Acmp { .. } => false,
    }
}

/// Route an inbound ACMPDU: in-flight completion for our own commands,
/// sniffed events for everybody else's.
pub(crate) fn handle_acmpdu(pdu: Acmpdu, state: &mut EngineState, actions: &mut Vec<Action>) {
    let ours = state.is_local(pdu.controller_entity_id);

    if pdu.message_type.is_response() {
        if ours {
            let key = InFlightKey {
                controller_entity_id: pdu.controller_entity_id,
                target_entity_id: EntityId::ZERO,
                sequence_id: pdu.sequence_id,
                kind: CommandKind::Acmp,
            };
            let expected = ExpectedResponse::Acmp {
                message_type: pdu.message_type,
            };
            let matched = state
                .inflight
                .get(&key)
                .is_some_and(|command| command.expected_response == expected);
            if matched {
                if let Some(command) = state.inflight.remove(&key) {
                    tracing::debug!(sequence_id = pdu.sequence_id, "ACMP response matched");
                    command.responder.complete_acmp(pdu);
                }
            } else {
                tracing::trace!(sequence_id = pdu.sequence_id, "Dropping stale ACMP response");
            }
        } else {
            actions.push(Action::Emit(EngineEvent::AcmpSniffedResponse(pdu)));
        }
        return;
    }

    if ours {
        // The multicast echo of our own command.
        tracing::trace!(sequence_id = pdu.sequence_id, "Ignoring own ACMP command echo");
    } else {
        actions.push(Action::Emit(EngineEvent::AcmpSniffedCommand(pdu)));
    }
}

// ============================================================================
// TIMEOUTS
// ============================================================================

/// Retransmit or expire every in-flight command whose deadline passed.
pub(crate) fn handle_timeouts(state: &mut EngineState, actions: &mut Vec<Action>, now: Instant) {
    let due: Vec<InFlightKey> = state
        .inflight
        .iter()
        .filter(|(_, command)| now >= command.next_deadline)
        .map(|(key, _)| *key)
        .collect();

    for key in due {
        let expired = {
            let Some(command) = state.inflight.get_mut(&key) else {
                continue;
            };
            if command.attempts_remaining > 0 {
                command.attempts_remaining -= 1;
                command.next_deadline = now + command.timeout;
                tracing::debug!(
                    sequence_id = key.sequence_id,
                    remaining = command.attempts_remaining,
                    "Retransmitting command"
                );
                actions.push(Action::SendFrame(command.frame.clone()));
                false
            } else {
                true
            }
        };
        if expired {
            if let Some(command) = state.inflight.remove(&key) {
                tracing::debug!(sequence_id = key.sequence_id, "Command timed out");
                command.responder.fail(Error::Timeout);
            }
        }
    }
}

/// Fail every in-flight command; used on shutdown and transport death.
pub(crate) fn abort_all(state: &mut EngineState, error: fn() -> Error) {
    for (_, command) in state.inflight.drain() {
        command.responder.fail(error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::entity::DiscoveredEntity;
    use crate::wire::{AemAecpdu, AemCommandType};
    use bytes::Bytes;

    /// The frames queued by handlers, in order.
    fn queued_frames(actions: &[Action]) -> Vec<Bytes> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::SendFrame(frame) => Some(frame.clone()),
                Action::Emit(_) => None,
            })
            .collect()
    }

    fn state_with_controller(controller_id: EntityId) -> EngineState {
        let mut state = EngineState::new(
            EngineConfig::default(),
            MacAddress::new([2, 0, 0, 0, 0, 1]),
            1,
        );
        let entity = DiscoveredEntity::controller(controller_id, EntityId::new(0x10));
        state.local_entities.insert(
            controller_id,
            crate::runtime::state::LocalEntityState::new(entity),
        );
        state
    }

    fn aem_command(target: EntityId) -> Aecpdu {
        Aecpdu::Aem(AemAecpdu::command(
            target,
            AemCommandType::ENTITY_AVAILABLE,
            Bytes::new(),
        ))
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn sequence_ids_are_consecutive_across_targets() {
        let controller = EntityId::new(0xAA);
        let mut state = state_with_controller(controller);
        let mut actions = Vec::new();

        for expected_seq in 0..3u16 {
            let target = EntityId::new(0x100 + u64::from(expected_seq));
            let (reply, _rx) = oneshot::channel();
            handle_send_aecp(
                controller,
                aem_command(target),
                MacAddress::AVDECC_MULTICAST,
                reply,
                &mut state,
                &mut actions,
            );
            let key = InFlightKey {
                controller_entity_id: controller,
                target_entity_id: target,
                sequence_id: expected_seq,
                kind: CommandKind::Aem,
            };
            assert!(state.inflight.contains_key(&key), "seq {expected_seq}");
        }
        assert_eq!(queued_frames(&actions).len(), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn unknown_controller_is_rejected() {
        let mut state = state_with_controller(EntityId::new(0xAA));
        let mut actions = Vec::new();
        let (reply, mut rx) = oneshot::channel();
        handle_send_aecp(
            EntityId::new(0xBB),
            aem_command(EntityId::new(0x77)),
            MacAddress::AVDECC_MULTICAST,
            reply,
            &mut state,
            &mut actions,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(Error::UnknownLocalEntity)
        ));
        assert!(state.inflight.is_empty());
        assert!(actions.is_empty());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn sending_a_response_through_the_command_path_is_rejected() {
        let controller = EntityId::new(0xAA);
        let mut state = state_with_controller(controller);
        let mut actions = Vec::new();

        let mut pdu = AemAecpdu::command(
            EntityId::new(0x77),
            AemCommandType::ENTITY_AVAILABLE,
            Bytes::new(),
        );
        pdu.message_type = crate::wire::AecpMessageType::AemResponse;
        let (reply, mut rx) = oneshot::channel();
        handle_send_aecp(
            controller,
            Aecpdu::Aem(pdu),
            MacAddress::AVDECC_MULTICAST,
            reply,
            &mut state,
            &mut actions,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(Error::MessageNotSupported)
        ));
    }
}
