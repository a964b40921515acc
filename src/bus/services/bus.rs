//! The communication bus: prioritised queues, request correlation, and
//! pub/sub delivery.
//!
//! Every receiver owns five priority queues behind its own lock, so
//! contention on one receiver never blocks delivery to another. A
//! `request` suspends only the calling task: the reply is routed through a
//! one-shot channel keyed by the request id, leaving the queues free for
//! unrelated traffic.

use crate::bus::domain::{
    BusDomainError, DeliveryGuarantee, Message, MessageId, Priority, TopicName,
};
use crate::bus::ports::AddressBook;
use crate::bus::services::queues::PriorityQueues;
use crate::config::BackoffPolicy;
use crate::registry::domain::AgentName;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, oneshot};

/// Party name the bus signs delivery-failure notices with.
const BUS_PARTY: &str = "bus";

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors returned by the communication bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The receiver is not a known party.
    #[error("unknown receiver: {0}")]
    UnknownReceiver(AgentName),

    /// The receiver's queues are full; the send was refused rather than
    /// growing the backlog.
    #[error("receiver {receiver} is over capacity ({capacity} queued)")]
    Backpressure {
        /// The overloaded receiver.
        receiver: AgentName,
        /// The configured queue bound.
        capacity: usize,
    },

    /// No correlated response arrived within the request timeout.
    #[error("no response to request {0} within its timeout")]
    ResponseTimeout(MessageId),

    /// The response channel closed without a reply.
    #[error("response channel for request {0} closed")]
    ChannelClosed(MessageId),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] BusDomainError),

    /// The bus state was poisoned by a panicking holder.
    #[error("bus state unavailable: {0}")]
    Internal(String),
}

/// Policy knobs for the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum messages queued per receiver across all priority tiers.
    pub queue_capacity: usize,
    /// Total delivery attempts per at-least-once subscription before a
    /// message is dead-lettered.
    pub max_redeliveries: u32,
    /// Backoff schedule between redelivery attempts.
    pub redelivery_backoff: BackoffPolicy,
}

impl BusConfig {
    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::config::ConfigError::InvalidValue`] for
    /// out-of-range fields.
    pub fn validate(&self) -> Result<(), crate::config::ConfigError> {
        if self.queue_capacity == 0 {
            return Err(crate::config::ConfigError::InvalidValue {
                field: "bus.queue_capacity",
                reason: "must queue at least one message".to_owned(),
            });
        }
        if self.max_redeliveries == 0 {
            return Err(crate::config::ConfigError::InvalidValue {
                field: "bus.max_redeliveries",
                reason: "must attempt at least one delivery".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_redeliveries: 3,
            redelivery_backoff: BackoffPolicy::default(),
        }
    }
}

/// A delivery that exhausted its redelivery budget.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    /// The undeliverable message.
    pub message: Message,
    /// The subscriber that never acknowledged it.
    pub subscriber: AgentName,
    /// Total delivery attempts made.
    pub attempts: u32,
    /// When the message was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeliveryKey {
    message: MessageId,
    subscriber: AgentName,
}

#[derive(Debug, Clone)]
struct Subscription {
    subscriber: AgentName,
    guarantee: DeliveryGuarantee,
}

#[derive(Debug)]
struct PendingDelivery {
    message: Message,
    attempts: u32,
    next_due: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Mailbox {
    queues: Mutex<PriorityQueues>,
    notify: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> BusResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|err| BusError::Internal(err.to_string()))
}

fn advance(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Typed message passing between named parties.
pub struct CommunicationBus<C>
where
    C: Clock + Send + Sync,
{
    address_book: Arc<dyn AddressBook>,
    config: BusConfig,
    clock: Arc<C>,
    mailboxes: Mutex<HashMap<AgentName, Arc<Mailbox>>>,
    pending_replies: Mutex<HashMap<MessageId, oneshot::Sender<Message>>>,
    subscriptions: Mutex<HashMap<TopicName, Vec<Subscription>>>,
    pending_acks: Mutex<HashMap<DeliveryKey, PendingDelivery>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl<C> CommunicationBus<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a bus validating receivers against the given address book.
    #[must_use]
    pub fn new(address_book: Arc<dyn AddressBook>, config: BusConfig, clock: Arc<C>) -> Self {
        Self {
            address_book,
            config,
            clock,
            mailboxes: Mutex::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            pending_acks: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    fn mailbox(&self, receiver: &AgentName) -> BusResult<Arc<Mailbox>> {
        let mut mailboxes = lock(&self.mailboxes)?;
        Ok(Arc::clone(
            mailboxes.entry(receiver.clone()).or_default(),
        ))
    }

    fn enqueue(&self, message: Message) -> BusResult<()> {
        let receiver = message.receiver().clone();
        if !self.address_book.contains(&receiver) {
            return Err(BusError::UnknownReceiver(receiver));
        }
        let mailbox = self.mailbox(&receiver)?;
        {
            let mut queues = lock(&mailbox.queues)?;
            if queues.len() >= self.config.queue_capacity {
                return Err(BusError::Backpressure {
                    receiver,
                    capacity: self.config.queue_capacity,
                });
            }
            queues.push(message);
        }
        mailbox.notify.notify_one();
        Ok(())
    }

    /// Sends a message into the receiver's priority queues.
    ///
    /// Replies (messages with `in_reply_to` set) are routed to the
    /// suspended requester instead of the queues; a reply whose requester
    /// already gave up is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownReceiver`] when the receiver is not a
    /// known party, or [`BusError::Backpressure`] when its queues are
    /// full.
    pub fn send(&self, message: Message) -> BusResult<()> {
        if let Some(request_id) = message.in_reply_to() {
            let waiter = lock(&self.pending_replies)?.remove(&request_id);
            if let Some(tx) = waiter {
                if tx.send(message).is_err() {
                    tracing::debug!(%request_id, "reply arrived after requester gave up");
                }
                return Ok(());
            }
        }
        self.enqueue(message)
    }

    /// Sends a request and suspends until its correlated reply arrives.
    ///
    /// Only the calling task suspends; queue delivery to every receiver
    /// continues meanwhile. The message's own timeout bounds the wait.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ResponseTimeout`] when the timeout elapses
    /// first, or any [`BusError`] the underlying send raises.
    pub async fn request(&self, message: Message) -> BusResult<Message> {
        let request = message.expecting_response();
        let request_id = request.id();
        let wait = request.timeout();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending_replies)?.insert(request_id, tx);

        if let Err(err) = self.send(request) {
            let _removed = lock(&self.pending_replies)?.remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::ChannelClosed(request_id)),
            Err(_) => {
                let _removed = lock(&self.pending_replies)?.remove(&request_id);
                Err(BusError::ResponseTimeout(request_id))
            }
        }
    }

    /// Builds and sends the correlated reply to a request.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Domain`] for an invalid message type, or any
    /// [`BusError`] the underlying send raises.
    pub fn respond(
        &self,
        original: &Message,
        message_type: &str,
        payload: serde_json::Value,
    ) -> BusResult<()> {
        let reply = Message::reply_to(original, message_type, payload, &*self.clock)?;
        self.send(reply)
    }

    /// Awaits the highest-priority queued message for a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub async fn receive(&self, receiver: &AgentName) -> BusResult<Message> {
        let mailbox = self.mailbox(receiver)?;
        loop {
            if let Some(message) = lock(&mailbox.queues)?.pop() {
                return Ok(message);
            }
            mailbox.notify.notified().await;
        }
    }

    /// Pops the highest-priority queued message, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn try_receive(&self, receiver: &AgentName) -> BusResult<Option<Message>> {
        let mailbox = self.mailbox(receiver)?;
        let message = lock(&mailbox.queues)?.pop();
        Ok(message)
    }

    /// Returns how many messages are queued for a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn queued_len(&self, receiver: &AgentName) -> BusResult<usize> {
        let mailboxes = lock(&self.mailboxes)?;
        match mailboxes.get(receiver) {
            Some(mailbox) => Ok(lock(&mailbox.queues)?.len()),
            None => Ok(0),
        }
    }

    /// Subscribes a receiver to a topic under a delivery guarantee.
    ///
    /// Re-subscribing updates the guarantee in place.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownReceiver`] when the subscriber is not a
    /// known party.
    pub fn subscribe(
        &self,
        topic: TopicName,
        subscriber: AgentName,
        guarantee: DeliveryGuarantee,
    ) -> BusResult<()> {
        if !self.address_book.contains(&subscriber) {
            return Err(BusError::UnknownReceiver(subscriber));
        }
        let mut subscriptions = lock(&self.subscriptions)?;
        let entries = subscriptions.entry(topic).or_default();
        if let Some(existing) = entries.iter_mut().find(|s| s.subscriber == subscriber) {
            existing.guarantee = guarantee;
        } else {
            entries.push(Subscription {
                subscriber,
                guarantee,
            });
        }
        Ok(())
    }

    /// Fans a message out to every subscriber of a topic.
    ///
    /// Each subscriber receives its own queued copy carrying the published
    /// message's id. Returns how many copies were enqueued; an overloaded
    /// at-least-once subscriber still gets a pending-delivery record, so
    /// the redelivery sweep retries it later.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn publish(&self, topic: &TopicName, message: &Message) -> BusResult<usize> {
        let subscribers = lock(&self.subscriptions)?
            .get(topic)
            .cloned()
            .unwrap_or_default();
        let now = self.clock.utc();
        let mut delivered = 0;
        for subscription in subscribers {
            let copy = message.readdressed(subscription.subscriber.clone());
            if subscription.guarantee == DeliveryGuarantee::AtLeastOnce {
                let key = DeliveryKey {
                    message: copy.id(),
                    subscriber: subscription.subscriber.clone(),
                };
                let next_due = advance(now, self.config.redelivery_backoff.delay_for_attempt(1));
                lock(&self.pending_acks)?.insert(
                    key,
                    PendingDelivery {
                        message: copy.clone(),
                        attempts: 1,
                        next_due,
                    },
                );
            }
            match self.enqueue(copy) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        topic = %topic,
                        subscriber = %subscription.subscriber,
                        error = %err,
                        "publish delivery failed"
                    );
                }
            }
        }
        Ok(delivered)
    }

    /// Acknowledges an at-least-once delivery.
    ///
    /// Returns whether a pending delivery was settled; acknowledging an
    /// already-settled (or never tracked) delivery is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn ack(&self, subscriber: &AgentName, message_id: MessageId) -> BusResult<bool> {
        let key = DeliveryKey {
            message: message_id,
            subscriber: subscriber.clone(),
        };
        Ok(lock(&self.pending_acks)?.remove(&key).is_some())
    }

    /// Redelivers overdue unacknowledged messages and dead-letters the
    /// ones that exhausted their attempts.
    ///
    /// Deliveries become due per the configured backoff schedule; callers
    /// drive this on an interval. Returns the newly dead-lettered
    /// deliveries; each one also produces a `delivery_failed` notice to
    /// the original sender.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn sweep_redeliveries(&self) -> BusResult<Vec<DeadLetter>> {
        let now = self.clock.utc();
        let due: Vec<DeliveryKey> = lock(&self.pending_acks)?
            .iter()
            .filter(|(_, delivery)| delivery.next_due <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut newly_dead = Vec::new();
        for key in due {
            let Some(mut delivery) = lock(&self.pending_acks)?.remove(&key) else {
                continue;
            };
            if delivery.attempts >= self.config.max_redeliveries {
                let letter = DeadLetter {
                    message: delivery.message,
                    subscriber: key.subscriber,
                    attempts: delivery.attempts,
                    failed_at: now,
                };
                self.report_delivery_failure(&letter);
                lock(&self.dead_letters)?.push(letter.clone());
                newly_dead.push(letter);
            } else {
                delivery.attempts += 1;
                delivery.next_due = advance(
                    now,
                    self.config
                        .redelivery_backoff
                        .delay_for_attempt(delivery.attempts),
                );
                let copy = delivery.message.clone();
                lock(&self.pending_acks)?.insert(key, delivery);
                if let Err(err) = self.enqueue(copy) {
                    tracing::warn!(error = %err, "redelivery enqueue failed");
                }
            }
        }
        Ok(newly_dead)
    }

    /// Returns all dead-lettered deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Internal`] when the bus state is unavailable.
    pub fn dead_letters(&self) -> BusResult<Vec<DeadLetter>> {
        Ok(lock(&self.dead_letters)?.clone())
    }

    fn report_delivery_failure(&self, letter: &DeadLetter) {
        let Ok(bus_party) = AgentName::new(BUS_PARTY) else {
            return;
        };
        let notice = Message::new(
            bus_party,
            letter.message.sender().clone(),
            "delivery_failed",
            Priority::High,
            json!({
                "message_id": letter.message.id(),
                "subscriber": letter.subscriber,
                "attempts": letter.attempts,
            }),
            &*self.clock,
        );
        match notice {
            Ok(built) => {
                if let Err(err) = self.enqueue(built) {
                    tracing::warn!(error = %err, "could not notify sender of dead letter");
                }
            }
            Err(err) => tracing::warn!(error = %err, "could not build dead-letter notice"),
        }
    }
}
