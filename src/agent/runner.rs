//! Queue drain loop binding an [`Agent`] implementation to the bus.
//!
//! One runner per local agent: it receives dispatch requests from the
//! agent's priority queues, invokes the implementation, replies through
//! the bus, and persists the agent's state snapshot and context history
//! after every task.

use crate::agent::{Agent, TASK_DISPATCH, TASK_RESULT, TaskOutcome, TaskRequest};
use crate::bus::domain::Message;
use crate::bus::services::CommunicationBus;
use crate::registry::domain::AgentName;
use crate::store::domain::{AgentState, ContextEntry};
use crate::store::ports::StateRepository;
use mockable::Clock;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Control handle for a spawned runner.
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RunnerHandle {
    /// Signals the runner to stop and waits for it to drain.
    pub async fn stop(self) {
        self.shutdown.send(true).ok();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "agent runner ended abnormally");
        }
    }
}

/// Drain loop executing bus-dispatched tasks on one agent.
pub struct AgentRunner<S, C>
where
    S: StateRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    name: AgentName,
    agent: Arc<dyn Agent>,
    bus: Arc<CommunicationBus<C>>,
    store: Arc<S>,
    clock: Arc<C>,
    memory_retention: usize,
}

impl<S, C> AgentRunner<S, C>
where
    S: StateRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a runner for the named agent.
    #[must_use]
    pub fn new(
        name: AgentName,
        agent: Arc<dyn Agent>,
        bus: Arc<CommunicationBus<C>>,
        store: Arc<S>,
        clock: Arc<C>,
        memory_retention: usize,
    ) -> Self {
        Self {
            name,
            agent,
            bus,
            store,
            clock,
            memory_retention: memory_retention.max(1),
        }
    }

    /// Spawns the drain loop onto the runtime.
    #[must_use]
    pub fn spawn(self) -> RunnerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        RunnerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(agent = %self.name, "agent runner started");
        loop {
            let message = tokio::select! {
                received = self.bus.receive(&self.name) => match received {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::error!(agent = %self.name, error = %err, "receive failed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if message.message_type() == TASK_DISPATCH {
                self.handle_dispatch(message).await;
            } else {
                tracing::debug!(
                    agent = %self.name,
                    message_type = message.message_type(),
                    "ignoring unhandled message type"
                );
            }
        }
        tracing::info!(agent = %self.name, "agent runner stopped");
    }

    async fn handle_dispatch(&self, message: Message) {
        let request: TaskRequest = match serde_json::from_value(message.payload().clone()) {
            Ok(request) => request,
            Err(err) => {
                self.reply(&message, &TaskOutcome::failure(format!("malformed task: {err}")));
                return;
            }
        };

        let mut state = match self.store.load_agent_state(&self.name).await {
            Ok(state) => state,
            Err(_) => AgentState::new(self.name.clone(), &*self.clock),
        };
        let task_type = request.task_type.clone();
        state.begin_task(&task_type, &*self.clock);
        self.persist(&state).await;

        let started = Instant::now();
        let outcome = self.agent.execute(request).await;
        let elapsed = started.elapsed();

        match &outcome {
            TaskOutcome::Success { .. } => state.record_success(elapsed, &*self.clock),
            TaskOutcome::Failure { .. } => state.record_failure(elapsed, &*self.clock),
        }
        state.remember(
            json!({"task_type": task_type, "success": outcome.is_success()}),
            self.memory_retention,
            &*self.clock,
        );
        self.persist(&state).await;
        let context_entry = ContextEntry {
            recorded_at: self.clock.utc(),
            entry: json!({"task_type": task_type, "success": outcome.is_success()}),
        };
        if let Err(err) = self.store.append_context(&self.name, context_entry).await {
            tracing::warn!(agent = %self.name, error = %err, "context append failed");
        }

        self.reply(&message, &outcome);
    }

    async fn persist(&self, state: &AgentState) {
        if let Err(err) = self.store.save_agent_state(state).await {
            tracing::warn!(agent = %self.name, error = %err, "state snapshot failed");
        }
    }

    fn reply(&self, original: &Message, outcome: &TaskOutcome) {
        let payload = match serde_json::to_value(outcome) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(agent = %self.name, error = %err, "outcome serialization failed");
                return;
            }
        };
        if let Err(err) = self.bus.respond(original, TASK_RESULT, payload) {
            tracing::warn!(agent = %self.name, error = %err, "reply delivery failed");
        }
    }
}
