//! Delivery guarantee semantics for pub/sub subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Redelivery contract of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryGuarantee {
    /// Delivered once with no redelivery; lost if the handler crashes.
    AtMostOnce,
    /// Redelivered with backoff until acknowledged or the retry ceiling is
    /// reached; receivers must deduplicate by message id.
    AtLeastOnce,
}

impl DeliveryGuarantee {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AtMostOnce => "at_most_once",
            Self::AtLeastOnce => "at_least_once",
        }
    }
}

impl fmt::Display for DeliveryGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
