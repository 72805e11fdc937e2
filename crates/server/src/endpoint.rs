//! One endpoint instance as the host sees it: lifecycle state, outbound
//! queue and the delivery sink feeding its socket writer.

use std::collections::VecDeque;

use shared::{
    domain::{EndpointId, EndpointState, InstanceId},
    protocol::{Message, ServerEvent},
};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("endpoint {endpoint} instance {instance_id} cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub endpoint: EndpointId,
    pub instance_id: InstanceId,
    pub from: EndpointState,
    pub to: EndpointState,
}

pub struct EndpointInstance {
    id: InstanceId,
    endpoint: EndpointId,
    state: EndpointState,
    queue: VecDeque<Message>,
    sink: mpsc::UnboundedSender<ServerEvent>,
    has_session: bool,
}

impl EndpointInstance {
    pub fn new(
        id: InstanceId,
        endpoint: EndpointId,
        sink: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            endpoint,
            state: EndpointState::Uninitialized,
            queue: VecDeque::new(),
            sink,
            has_session: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EndpointState::Ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether this instance has been handed a session, delivered or queued.
    pub fn has_session(&self) -> bool {
        self.has_session || self.queue.iter().any(|m| matches!(m, Message::SessionStart(_)))
    }

    fn transition(&mut self, next: EndpointState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                endpoint: self.endpoint,
                instance_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn launch(&mut self) -> Result<(), TransitionError> {
        self.transition(EndpointState::Launching)
    }

    /// Returns `Ok(false)` when the instance was already ready.
    pub fn mark_ready(&mut self) -> Result<bool, TransitionError> {
        if self.state == EndpointState::Ready {
            return Ok(false);
        }
        self.transition(EndpointState::Ready)?;
        Ok(true)
    }

    /// Moves to `Closed` and discards the queue.
    pub fn close(&mut self) -> Result<usize, TransitionError> {
        self.transition(EndpointState::Closed)?;
        let discarded = self.queue.len();
        self.queue.clear();
        Ok(discarded)
    }

    pub fn enqueue(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    pub fn take_queue(&mut self) -> VecDeque<Message> {
        std::mem::take(&mut self.queue)
    }

    /// Push a handshake event that is not subject to readiness.
    pub fn notify(&self, event: ServerEvent) -> bool {
        self.sink.send(event).is_ok()
    }

    /// Hand a message to the socket writer. Only legal while ready.
    pub fn deliver(&mut self, message: Message, replayed: bool) -> bool {
        debug_assert!(self.is_ready(), "delivery to an instance that is not ready");
        if matches!(message, Message::SessionStart(_)) {
            self.has_session = true;
        }
        self.sink
            .send(ServerEvent::Delivery { message, replayed })
            .is_ok()
    }
}

#[cfg(test)]
#[path = "tests/endpoint_tests.rs"]
mod tests;
