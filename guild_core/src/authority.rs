//! Single-threaded owner of the simulation state.
//!
//! Other threads talk to the authority through an [`AuthorityHandle`]; every
//! request is serialized onto the authority's queue and executed between ticks.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use bevy::prelude::App;
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};
use guild_runtime::{CommandEnvelope, CommandPayload, CommandReply};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatch::execute_command;
use crate::raid::SimInstant;
use crate::raid_commands::activation_notice;
use crate::resources::ServerConfig;
use crate::run_tick;
use crate::snapshot::{PersistenceError, SnapshotStore};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("the authority loop has stopped")]
pub struct AuthorityClosed;

enum AuthorityMessage {
    Command {
        envelope: CommandEnvelope,
        reply: Sender<CommandReply>,
    },
    Subscribe(Sender<String>),
}

/// Cloneable front door to a running [`Authority`].
#[derive(Clone)]
pub struct AuthorityHandle {
    sender: Sender<AuthorityMessage>,
}

impl AuthorityHandle {
    /// Queue a command; the reply arrives on the returned receiver.
    pub fn submit(&self, envelope: CommandEnvelope) -> Result<Receiver<CommandReply>, AuthorityClosed> {
        let (reply, receiver) = bounded(1);
        self.sender
            .send(AuthorityMessage::Command { envelope, reply })
            .map_err(|_| AuthorityClosed)?;
        Ok(receiver)
    }

    /// Queue a command and block until it has been executed.
    pub fn request(&self, envelope: CommandEnvelope) -> Result<CommandReply, AuthorityClosed> {
        self.submit(envelope)?.recv().map_err(|_| AuthorityClosed)
    }

    /// Receive every broadcast line (raid announcements and the like) from now on.
    pub fn subscribe(&self) -> Result<Receiver<String>, AuthorityClosed> {
        let (sender, receiver) = unbounded();
        self.sender
            .send(AuthorityMessage::Subscribe(sender))
            .map_err(|_| AuthorityClosed)?;
        Ok(receiver)
    }

    pub fn shutdown(&self) -> Result<CommandReply, AuthorityClosed> {
        self.request(CommandEnvelope::admin(CommandPayload::Shutdown))
    }
}

type Clock = Box<dyn FnMut() -> SimInstant + Send>;

pub struct Authority {
    app: App,
    store: SnapshotStore,
    config: ServerConfig,
    receiver: Receiver<AuthorityMessage>,
    subscribers: Vec<Sender<String>>,
    clock: Clock,
}

enum Flow {
    Continue,
    Stop,
}

impl Authority {
    pub fn new(app: App, store: SnapshotStore, config: ServerConfig) -> (Self, AuthorityHandle) {
        let (sender, receiver) = unbounded();
        (
            Self::with_receiver(app, store, config, receiver),
            AuthorityHandle { sender },
        )
    }

    fn with_receiver(
        app: App,
        store: SnapshotStore,
        config: ServerConfig,
        receiver: Receiver<AuthorityMessage>,
    ) -> Self {
        Self {
            app,
            store,
            config,
            receiver,
            subscribers: Vec::new(),
            clock: Box::new(SimInstant::now),
        }
    }

    /// Replace the wall clock used for ticks and command timestamps.
    pub fn with_clock(mut self, clock: impl FnMut() -> SimInstant + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Build the app on a dedicated thread and run the loop there.
    pub fn spawn(
        build: impl FnOnce() -> App + Send + 'static,
        store: SnapshotStore,
        config: ServerConfig,
    ) -> (AuthorityHandle, JoinHandle<Result<(), PersistenceError>>) {
        let (sender, receiver) = unbounded();
        let handle = AuthorityHandle { sender };
        let join = thread::spawn(move || {
            Authority::with_receiver(build(), store, config, receiver).run()
        });
        (handle, join)
    }

    /// Serve requests and ticks until shutdown is requested or every handle
    /// is dropped, then save.
    pub fn run(mut self) -> Result<(), PersistenceError> {
        let ticker = tick(self.config.tick_interval);
        let mut last_save = Instant::now();
        info!(
            target: "guilds::server",
            tick_ms = self.config.tick_interval.as_millis() as u64,
            autosave_secs = self.config.autosave_interval.as_secs(),
            data_dir = %self.store.dir().display(),
            "authority.started"
        );

        loop {
            select! {
                recv(self.receiver) -> message => {
                    let Ok(message) = message else {
                        debug!(target: "guilds::server", "authority.handles_dropped");
                        break;
                    };
                    if let Flow::Stop = self.handle(message) {
                        break;
                    }
                }
                recv(ticker) -> _ => {
                    self.tick();
                    if last_save.elapsed() >= self.config.autosave_interval {
                        // Failures are logged; the next interval tries again.
                        let _ = self.save("autosave");
                        last_save = Instant::now();
                    }
                }
            }
        }

        let result = self.store.save_world(&mut self.app.world);
        match &result {
            Ok(()) => info!(target: "guilds::server", "authority.stopped"),
            Err(err) => warn!(target: "guilds::server", error = %err, "authority.final_save_failed"),
        }
        result
    }

    fn handle(&mut self, message: AuthorityMessage) -> Flow {
        let (envelope, reply) = match message {
            AuthorityMessage::Subscribe(sender) => {
                self.subscribers.push(sender);
                return Flow::Continue;
            }
            AuthorityMessage::Command { envelope, reply } => (envelope, reply),
        };

        let (response, flow) = match envelope.payload {
            CommandPayload::Save => {
                let response = match self.save("request") {
                    Ok(()) => CommandReply::accepted("Saved."),
                    Err(err) => CommandReply::rejected(err.to_string()),
                };
                (response, Flow::Continue)
            }
            CommandPayload::Shutdown => (CommandReply::accepted("Shutting down."), Flow::Stop),
            _ => {
                let now = (self.clock)();
                let response = execute_command(&mut self.app.world, &envelope, now);
                debug!(
                    target: "guilds::server",
                    command = envelope.payload.label(),
                    accepted = response.accepted,
                    "command.executed"
                );
                (response, Flow::Continue)
            }
        };
        let response = response.with_correlation(envelope.correlation_id);
        self.broadcast(&response.broadcast);
        // The requester may have gone away; the command still took effect.
        let _ = reply.send(response);
        flow
    }

    fn tick(&mut self) {
        let now = (self.clock)();
        let notices: Vec<String> = run_tick(&mut self.app, now)
            .iter()
            .map(activation_notice)
            .collect();
        self.broadcast(&notices);
    }

    fn save(&mut self, reason: &'static str) -> Result<(), PersistenceError> {
        let result = self.store.save_world(&mut self.app.world);
        if let Err(err) = &result {
            warn!(target: "guilds::persistence", reason, error = %err, "snapshot.save_failed");
        }
        result
    }

    fn broadcast(&mut self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        self.subscribers.retain(|subscriber| {
            lines
                .iter()
                .all(|line| subscriber.send(line.clone()).is_ok())
        });
    }
}
