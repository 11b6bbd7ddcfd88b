//! The coordinator task and its handle.
//!
//! One task owns the [`SessionCoordinator`]. Transport events, user commands
//! and invite deadlines are applied in the order they arrive; callers talk
//! to it through a cloneable [`CoordinatorHandle`].

use nearguard_core::{ChatMessage, Endpoint, EndpointId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::coordinator::{CoordinatorEvent, SelectOutcome, SessionCoordinator, StatusSnapshot};
use crate::error::CoordinatorError;
use crate::transport::EventReceiver;

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<T>;

/// A user operation queued for the coordinator task.
#[derive(Debug)]
pub enum Command {
    Select {
        peer: EndpointId,
        reply: Reply<Result<SelectOutcome, CoordinatorError>>,
    },
    Respond {
        accept: bool,
        reply: Reply<Result<Endpoint, CoordinatorError>>,
    },
    Send {
        text: String,
        reply: Reply<Result<ChatMessage, CoordinatorError>>,
    },
    Disconnect {
        peer: EndpointId,
        reply: Reply<Result<(), CoordinatorError>>,
    },
    StartAdvertising {
        reply: Reply<Result<(), CoordinatorError>>,
    },
    StopAdvertising {
        reply: Reply<()>,
    },
    StartBrowsing {
        reply: Reply<Result<(), CoordinatorError>>,
    },
    StopBrowsing {
        reply: Reply<()>,
    },
    Status {
        reply: Reply<StatusSnapshot>,
    },
    Messages {
        since: u64,
        reply: Reply<Vec<ChatMessage>>,
    },
}

/// Cloneable front door to a running [`CoordinatorTask`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    pub async fn select(&self, peer: EndpointId) -> Result<SelectOutcome, CoordinatorError> {
        self.request(|reply| Command::Select { peer, reply }).await?
    }

    pub async fn respond(&self, accept: bool) -> Result<Endpoint, CoordinatorError> {
        self.request(|reply| Command::Respond { accept, reply }).await?
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<ChatMessage, CoordinatorError> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await?
    }

    pub async fn disconnect(&self, peer: EndpointId) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::Disconnect { peer, reply }).await?
    }

    pub async fn start_advertising(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::StartAdvertising { reply }).await?
    }

    pub async fn stop_advertising(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::StopAdvertising { reply }).await
    }

    pub async fn start_browsing(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::StartBrowsing { reply }).await?
    }

    pub async fn stop_browsing(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::StopBrowsing { reply }).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, CoordinatorError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn messages(&self, since: u64) -> Result<Vec<ChatMessage>, CoordinatorError> {
        self.request(|reply| Command::Messages { since, reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }
}

pub struct CoordinatorTask {
    coordinator: SessionCoordinator,
    transport_events: EventReceiver,
    commands: mpsc::Receiver<Command>,
    shutdown: broadcast::Receiver<()>,
}

impl CoordinatorTask {
    pub fn new(
        coordinator: SessionCoordinator,
        transport_events: EventReceiver,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = CoordinatorHandle {
            commands: tx,
            events: coordinator.event_sender(),
        };
        let task = Self {
            coordinator,
            transport_events,
            commands: rx,
            shutdown,
        };
        (task, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(local = %self.coordinator.local(), "coordinator started");
        loop {
            let deadline = self.coordinator.next_invite_deadline();
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("coordinator shutting down");
                    break;
                }
                Some(event) = self.transport_events.recv() => {
                    self.coordinator.handle_transport_event(event);
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        tracing::info!("all coordinator handles dropped");
                        break;
                    }
                },
                _ = sleep_until_deadline(deadline) => {
                    self.coordinator.expire_invites(Instant::now());
                }
            }
        }
        self.coordinator.shutdown();
    }

    fn apply(&mut self, command: Command) {
        let c = &mut self.coordinator;
        // A caller that gave up waiting is not an error.
        match command {
            Command::Select { peer, reply } => {
                let _ = reply.send(c.select(&peer));
            }
            Command::Respond { accept, reply } => {
                let _ = reply.send(c.respond(accept));
            }
            Command::Send { text, reply } => {
                let _ = reply.send(c.send(&text));
            }
            Command::Disconnect { peer, reply } => {
                let _ = reply.send(c.disconnect(&peer));
            }
            Command::StartAdvertising { reply } => {
                let _ = reply.send(c.start_advertising());
            }
            Command::StopAdvertising { reply } => {
                c.stop_advertising();
                let _ = reply.send(());
            }
            Command::StartBrowsing { reply } => {
                let _ = reply.send(c.start_browsing());
            }
            Command::StopBrowsing { reply } => {
                c.stop_browsing();
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(c.status());
            }
            Command::Messages { since, reply } => {
                let _ = reply.send(c.messages(since));
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
