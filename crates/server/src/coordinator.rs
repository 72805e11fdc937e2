//! Host-side relay between the display and controller endpoints.
//!
//! The coordinator is a plain synchronous state holder. It is owned by a
//! single actor task (see `actor.rs`) so every operation runs to completion
//! before the next one starts.

use std::collections::HashMap;

use shared::{
    cache::SessionCache,
    domain::{EndpointId, InstanceId},
    error::InvalidPayload,
    protocol::{CoordinatorStatus, EndpointStatus, Message, ServerEvent},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointInstance, TransitionError};

/// A freshly attached endpoint instance and the stream of events destined for it.
pub struct Attachment {
    pub instance_id: InstanceId,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Held until the destination announces readiness. Not a failure.
    Queued,
    /// No live instance; state was still cached for the next one.
    NoEndpoint,
    Rejected(InvalidPayload),
}

impl SendOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SendOutcome::Queued)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    Flushed { replayed: usize, flushed: usize },
    AlreadyReady,
    UnknownInstance,
    Rejected(TransitionError),
}

#[derive(Default)]
pub struct Coordinator {
    next_instance_id: u64,
    endpoints: HashMap<EndpointId, EndpointInstance>,
    cache: SessionCache,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Create a new instance for `endpoint`. A live instance of the same
    /// endpoint is closed first; its queue goes with it.
    pub fn attach(&mut self, endpoint: EndpointId) -> Attachment {
        if let Some(previous) = self.endpoints.remove(&endpoint) {
            info!(
                endpoint = %endpoint,
                instance_id = previous.id().0,
                "coordinator: replacing endpoint instance"
            );
            close_instance(previous);
        }

        self.next_instance_id += 1;
        let instance_id = InstanceId(self.next_instance_id);
        let (sink, events) = mpsc::unbounded_channel();
        let mut instance = EndpointInstance::new(instance_id, endpoint, sink);
        if let Err(error) = instance.launch() {
            warn!(%error, "coordinator: fresh instance refused to launch");
        }
        instance.notify(ServerEvent::Attached {
            endpoint,
            instance_id,
        });
        info!(
            endpoint = %endpoint,
            instance_id = instance_id.0,
            "coordinator: endpoint attached"
        );
        self.endpoints.insert(endpoint, instance);

        Attachment {
            instance_id,
            events,
        }
    }

    /// Mark the instance ready and flush: the full cached state first (unless
    /// the instance already has a session coming), then the queue in FIFO
    /// order. Cached messages that are also queued are left to the queue.
    pub fn register_ready(&mut self, instance_id: InstanceId) -> ReadyOutcome {
        let Some(instance) = self
            .endpoints
            .values_mut()
            .find(|instance| instance.id() == instance_id)
        else {
            debug!(instance_id = instance_id.0, "coordinator: ready from unknown instance");
            return ReadyOutcome::UnknownInstance;
        };

        match instance.mark_ready() {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    endpoint = %instance.endpoint(),
                    instance_id = instance_id.0,
                    "coordinator: duplicate ready ignored"
                );
                return ReadyOutcome::AlreadyReady;
            }
            Err(error) => {
                warn!(%error, "coordinator: ready rejected");
                return ReadyOutcome::Rejected(error);
            }
        }

        let endpoint = instance.endpoint();
        let has_session = instance.has_session();
        let queue = instance.take_queue();
        let replay: Vec<Message> = if has_session {
            Vec::new()
        } else {
            self.cache
                .replay()
                .into_iter()
                .filter(|message| !queue.contains(message))
                .collect()
        };

        let mut replayed = 0;
        let mut flushed = 0;
        let mut alive = true;
        for message in replay {
            alive = instance.deliver(message, true);
            if !alive {
                break;
            }
            replayed += 1;
        }
        if alive {
            for message in queue {
                alive = instance.deliver(message, false);
                if !alive {
                    break;
                }
                flushed += 1;
            }
        }

        info!(
            endpoint = %endpoint,
            instance_id = instance_id.0,
            replayed,
            flushed,
            "coordinator: endpoint ready"
        );
        if !alive {
            self.evict(endpoint);
        }

        ReadyOutcome::Flushed { replayed, flushed }
    }

    pub fn send(&mut self, destination: EndpointId, message: Message) -> SendOutcome {
        let channel = message.channel();
        if let Err(error) = message.validate() {
            warn!(
                destination = %destination,
                channel = channel.name(),
                %error,
                "coordinator: dropping invalid payload"
            );
            return SendOutcome::Rejected(error);
        }

        if channel.is_state() && self.cache.record(&message) {
            debug!(channel = channel.name(), "coordinator: cache updated");
        }

        let Some(instance) = self.endpoints.get_mut(&destination) else {
            debug!(
                destination = %destination,
                channel = channel.name(),
                "coordinator: no live instance"
            );
            return SendOutcome::NoEndpoint;
        };

        if !instance.is_ready() {
            instance.enqueue(message);
            debug!(
                destination = %destination,
                channel = channel.name(),
                queued = instance.queued(),
                "coordinator: destination not ready, message queued"
            );
            return SendOutcome::Queued;
        }

        if instance.deliver(message, false) {
            SendOutcome::Delivered
        } else {
            self.evict(destination);
            SendOutcome::NoEndpoint
        }
    }

    /// Re-send every cached state message to a ready instance, bypassing
    /// its queue. Commands are never resent. Returns the number delivered.
    pub fn request_resend(&mut self, instance_id: InstanceId) -> usize {
        let Some(instance) = self
            .endpoints
            .values_mut()
            .find(|instance| instance.id() == instance_id)
        else {
            debug!(instance_id = instance_id.0, "coordinator: resend for unknown instance");
            return 0;
        };
        let endpoint = instance.endpoint();
        if !instance.is_ready() {
            debug!(
                endpoint = %endpoint,
                instance_id = instance_id.0,
                "coordinator: resend before ready ignored"
            );
            return 0;
        }

        let messages = self.cache.replay();
        if messages.is_empty() {
            debug!(endpoint = %endpoint, "coordinator: resend requested with empty cache");
            return 0;
        }

        let mut resent = 0;
        for message in messages {
            if !instance.deliver(message, true) {
                self.evict(endpoint);
                return resent;
            }
            resent += 1;
        }
        info!(
            endpoint = %endpoint,
            instance_id = instance_id.0,
            resent,
            "coordinator: cached state resent"
        );
        resent
    }

    /// Close an instance. A close for an instance that was already replaced is ignored.
    pub fn close(&mut self, instance_id: InstanceId) -> bool {
        let Some(endpoint) = self
            .endpoints
            .values()
            .find(|instance| instance.id() == instance_id)
            .map(EndpointInstance::endpoint)
        else {
            return false;
        };
        if let Some(instance) = self.endpoints.remove(&endpoint) {
            close_instance(instance);
        }
        true
    }

    pub fn status(&self) -> CoordinatorStatus {
        let endpoints = EndpointId::ALL
            .iter()
            .map(|endpoint| match self.endpoints.get(endpoint) {
                Some(instance) => EndpointStatus {
                    endpoint: *endpoint,
                    instance_id: Some(instance.id()),
                    state: Some(instance.state()),
                    queued: instance.queued(),
                },
                None => EndpointStatus {
                    endpoint: *endpoint,
                    instance_id: None,
                    state: None,
                    queued: 0,
                },
            })
            .collect();
        CoordinatorStatus {
            endpoints,
            cache: self.cache.summary(),
        }
    }

    fn evict(&mut self, endpoint: EndpointId) {
        if let Some(instance) = self.endpoints.remove(&endpoint) {
            warn!(
                endpoint = %endpoint,
                instance_id = instance.id().0,
                "coordinator: delivery channel closed, evicting instance"
            );
            close_instance(instance);
        }
    }
}

fn close_instance(mut instance: EndpointInstance) {
    match instance.close() {
        Ok(discarded) => info!(
            endpoint = %instance.endpoint(),
            instance_id = instance.id().0,
            discarded,
            "coordinator: endpoint closed"
        ),
        Err(error) => warn!(%error, "coordinator: close rejected"),
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
