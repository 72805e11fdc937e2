//! Coordinator actor: owns the `Coordinator` and applies commands one at a time.
//!
//! Connection handlers talk to it through `CoordinatorHandle`, which sends
//! `CoordinatorCommand`s over an mpsc channel. Only queries wait for a reply.

use shared::{
    domain::{EndpointId, InstanceId},
    protocol::{CoordinatorStatus, Message},
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::coordinator::{Attachment, Coordinator};

pub enum CoordinatorCommand {
    Attach {
        endpoint: EndpointId,
        reply: oneshot::Sender<Attachment>,
    },
    Ready {
        instance_id: InstanceId,
    },
    Send {
        from: InstanceId,
        destination: EndpointId,
        message: Message,
    },
    RequestResend {
        instance_id: InstanceId,
    },
    Close {
        instance_id: InstanceId,
    },
    Status {
        reply: oneshot::Sender<CoordinatorStatus>,
    },
}

/// Handle to the running coordinator actor (cheap to Clone).
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    pub fn spawn(coordinator: Coordinator) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(coordinator, command_rx));
        Self { command_tx }
    }

    async fn dispatch(&self, cmd: CoordinatorCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(component = "coordinator_actor", "actor channel closed, command dropped");
        }
    }

    pub async fn attach(&self, endpoint: EndpointId) -> Option<Attachment> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(CoordinatorCommand::Attach { endpoint, reply })
            .await;
        rx.await.ok()
    }

    pub async fn ready(&self, instance_id: InstanceId) {
        self.dispatch(CoordinatorCommand::Ready { instance_id })
            .await;
    }

    /// Fire-and-forget relay.
    pub async fn send(&self, from: InstanceId, destination: EndpointId, message: Message) {
        self.dispatch(CoordinatorCommand::Send {
            from,
            destination,
            message,
        })
        .await;
    }

    pub async fn request_resend(&self, instance_id: InstanceId) {
        self.dispatch(CoordinatorCommand::RequestResend { instance_id })
            .await;
    }

    pub async fn close(&self, instance_id: InstanceId) {
        self.dispatch(CoordinatorCommand::Close { instance_id })
            .await;
    }

    pub async fn status(&self) -> Option<CoordinatorStatus> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(CoordinatorCommand::Status { reply }).await;
        rx.await.ok()
    }
}

async fn actor_loop(
    mut coordinator: Coordinator,
    mut command_rx: mpsc::Receiver<CoordinatorCommand>,
) {
    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            CoordinatorCommand::Attach { endpoint, reply } => {
                let _ = reply.send(coordinator.attach(endpoint));
            }
            CoordinatorCommand::Ready { instance_id } => {
                coordinator.register_ready(instance_id);
            }
            CoordinatorCommand::Send {
                from,
                destination,
                message,
            } => {
                let channel = message.channel();
                let outcome = coordinator.send(destination, message);
                debug!(
                    from = from.0,
                    destination = %destination,
                    channel = channel.name(),
                    ?outcome,
                    "coordinator: relayed"
                );
            }
            CoordinatorCommand::RequestResend { instance_id } => {
                coordinator.request_resend(instance_id);
            }
            CoordinatorCommand::Close { instance_id } => {
                coordinator.close(instance_id);
            }
            CoordinatorCommand::Status { reply } => {
                let _ = reply.send(coordinator.status());
            }
        }
    }
    debug!(component = "coordinator_actor", "actor loop finished");
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
