//! Retry policy for transport-level anomalies.
//!
//! Only failures that happen before a response can be validated go through
//! here. A response the server rejected is never retried.

use std::time::Duration;

use crate::error::{TransportError, TransportErrorKind};

/// Delay before the single retry of a transient anomaly.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Something went wrong before there was a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    Timeout,
    /// The transport returned without error but with no status or no envelope.
    EmptyResponse,
    Network,
    /// The in-flight request was cancelled, typically by navigation or shutdown.
    Aborted,
    Unclassified,
}

impl Anomaly {
    /// Classify a transport failure.
    ///
    /// The structured kind wins when the transport supplies one; opaque
    /// failures are matched case-insensitively on their message.
    pub fn from_transport(error: &TransportError) -> Self {
        match error.kind {
            TransportErrorKind::Timeout => Anomaly::Timeout,
            TransportErrorKind::Network => Anomaly::Network,
            TransportErrorKind::Aborted => Anomaly::Aborted,
            TransportErrorKind::Opaque => Self::from_message(&error.message),
        }
    }

    pub fn from_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("timeout") {
            Anomaly::Timeout
        } else if message.contains("empty response") {
            Anomaly::EmptyResponse
        } else if message.contains("network error") {
            Anomaly::Network
        } else if message.contains("aborted") {
            Anomaly::Aborted
        } else {
            Anomaly::Unclassified
        }
    }
}

/// What the dispatcher should do about an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Wait, then send the identical request once more.
    RetryOnce { delay: Duration },
    /// Resolve the call as cancelled; nothing surfaces to the caller.
    Suppress,
    /// No retry; validate whatever state exists.
    FallThrough,
}

/// Fixed-delay, single-retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn action(&self, anomaly: Anomaly) -> RetryAction {
        match anomaly {
            Anomaly::Timeout | Anomaly::EmptyResponse | Anomaly::Network => {
                RetryAction::RetryOnce { delay: self.delay }
            }
            Anomaly::Aborted => RetryAction::Suppress,
            Anomaly::Unclassified => RetryAction::FallThrough,
        }
    }
}
