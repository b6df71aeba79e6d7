//! Out-of-band error reporting and the per-call decision to use it.

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::envelope::ResponseEnvelope;

/// Fire-and-forget sink for diagnostic messages.
pub trait TelemetryReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Reports through `tracing` at error level, target `iznik::telemetry`.
///
/// Pair it with a subscriber layer that forwards to the tracking service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TelemetryReporter for TracingReporter {
    fn report(&self, message: &str) {
        error!(target: "iznik::telemetry", "{message}");
    }
}

type Predicate = dyn Fn(Option<&ResponseEnvelope>) -> bool + Send + Sync;

/// Whether a rejected call is escalated to telemetry.
///
/// Call sites that expect some failures (a probe allowed to 404, say) pass
/// `Never` or a predicate so the error still reaches their own control flow
/// without raising noise.
#[derive(Clone, Default)]
pub enum LogDecision {
    #[default]
    Always,
    Never,
    When(Arc<Predicate>),
}

impl LogDecision {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(Option<&ResponseEnvelope>) -> bool + Send + Sync + 'static,
    {
        LogDecision::When(Arc::new(predicate))
    }

    pub fn should_report(&self, envelope: Option<&ResponseEnvelope>) -> bool {
        match self {
            LogDecision::Always => true,
            LogDecision::Never => false,
            LogDecision::When(predicate) => predicate(envelope),
        }
    }
}

impl From<bool> for LogDecision {
    fn from(log: bool) -> Self {
        if log {
            LogDecision::Always
        } else {
            LogDecision::Never
        }
    }
}

impl fmt::Debug for LogDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDecision::Always => f.write_str("Always"),
            LogDecision::Never => f.write_str("Never"),
            LogDecision::When(_) => f.write_str("When(..)"),
        }
    }
}
