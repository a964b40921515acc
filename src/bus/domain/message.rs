//! The Message aggregate carried by the communication bus.
//!
//! Messages are immutable once sent: the bus owns them for their queued
//! lifetime and hands payload ownership to the receiver on delivery.

use super::{BusDomainError, MessageId, Priority};
use crate::registry::domain::AgentName;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default wait for a correlated response.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A prioritised message between two named parties.
///
/// # Invariants
///
/// - `id` is globally unique
/// - `message_type` is non-empty
/// - `timeout` is positive
/// - messages are never mutated after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    sender: AgentName,
    receiver: AgentName,
    message_type: String,
    priority: Priority,
    payload: Value,
    #[serde(default)]
    dependencies: Vec<MessageId>,
    #[serde(default)]
    in_reply_to: Option<MessageId>,
    #[serde(default)]
    requires_response: bool,
    timeout: Duration,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a fresh id and the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BusDomainError::EmptyMessageType`] when the type is empty
    /// after trimming.
    pub fn new(
        sender: AgentName,
        receiver: AgentName,
        message_type: impl Into<String>,
        priority: Priority,
        payload: Value,
        clock: &impl Clock,
    ) -> Result<Self, BusDomainError> {
        let normalized_type = message_type.into().trim().to_owned();
        if normalized_type.is_empty() {
            return Err(BusDomainError::EmptyMessageType);
        }
        Ok(Self {
            id: MessageId::new(),
            sender,
            receiver,
            message_type: normalized_type,
            priority,
            payload,
            dependencies: Vec::new(),
            in_reply_to: None,
            requires_response: false,
            timeout: DEFAULT_TIMEOUT,
            created_at: clock.utc(),
        })
    }

    /// Creates a publication template addressed to the sender itself.
    ///
    /// The bus re-addresses a copy per subscriber at publish time, so the
    /// receiver field of the template is never delivered to.
    ///
    /// # Errors
    ///
    /// Returns [`BusDomainError::EmptyMessageType`] when the type is empty
    /// after trimming.
    pub fn publication(
        sender: AgentName,
        message_type: impl Into<String>,
        priority: Priority,
        payload: Value,
        clock: &impl Clock,
    ) -> Result<Self, BusDomainError> {
        let receiver = sender.clone();
        Self::new(sender, receiver, message_type, priority, payload, clock)
    }

    /// Creates the correlated reply to a request.
    ///
    /// The reply swaps sender and receiver, inherits the request's
    /// priority, and references the request id so the bus can route it to
    /// the suspended caller.
    ///
    /// # Errors
    ///
    /// Returns [`BusDomainError::EmptyMessageType`] when the type is empty
    /// after trimming.
    pub fn reply_to(
        original: &Self,
        message_type: impl Into<String>,
        payload: Value,
        clock: &impl Clock,
    ) -> Result<Self, BusDomainError> {
        let mut reply = Self::new(
            original.receiver.clone(),
            original.sender.clone(),
            message_type,
            original.priority,
            payload,
            clock,
        )?;
        reply.in_reply_to = Some(original.id);
        Ok(reply)
    }

    /// Sets the message ids this message builds on.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = MessageId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Sets the response timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BusDomainError::ZeroTimeout`] for a zero duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, BusDomainError> {
        if timeout.is_zero() {
            return Err(BusDomainError::ZeroTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Marks the message as expecting a correlated response.
    #[must_use]
    pub const fn expecting_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    /// Returns a copy addressed to another receiver, preserving the id.
    ///
    /// Used for pub/sub fan-out where every subscriber receives its own
    /// queued copy of one published message.
    pub(crate) fn readdressed(&self, receiver: AgentName) -> Self {
        let mut copy = self.clone();
        copy.receiver = receiver;
        copy
    }

    /// Returns the message identifier.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the sending party.
    #[must_use]
    pub const fn sender(&self) -> &AgentName {
        &self.sender
    }

    /// Returns the receiving party.
    #[must_use]
    pub const fn receiver(&self) -> &AgentName {
        &self.receiver
    }

    /// Returns the message type tag.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Returns the urgency tier.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the message into its payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Returns the message ids this message builds on.
    #[must_use]
    pub fn dependencies(&self) -> &[MessageId] {
        &self.dependencies
    }

    /// Returns the request id this message answers, if it is a reply.
    #[must_use]
    pub const fn in_reply_to(&self) -> Option<MessageId> {
        self.in_reply_to
    }

    /// Returns whether the sender expects a correlated response.
    #[must_use]
    pub const fn requires_response(&self) -> bool {
        self.requires_response
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
