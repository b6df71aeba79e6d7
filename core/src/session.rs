//! Session/store collaborator.
//!
//! The dispatcher needs two things from the session: a signal that persisted
//! state has been restored (so session-derived headers exist), and a boolean
//! flag lookup for operator mode.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;

#[async_trait]
pub trait SessionContext: Send + Sync {
    /// Resolves once the session is usable. May resolve immediately.
    async fn ready(&self);

    /// Synchronous flag lookup; unknown flags are `false`.
    fn flag(&self, name: &str) -> bool;
}

/// A session that is always ready and whose flags never change.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    flags: HashMap<String, bool>,
}

impl StaticSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl SessionContext for StaticSession {
    async fn ready(&self) {}

    fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// A session that becomes ready once its persisted state is restored.
///
/// Calls made before `mark_restored` wait; calls after it proceed at once.
#[derive(Debug)]
pub struct RestorableSession {
    restored: watch::Sender<bool>,
    flags: RwLock<HashMap<String, bool>>,
}

impl Default for RestorableSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RestorableSession {
    pub fn new() -> Self {
        let (restored, _) = watch::channel(false);
        Self {
            restored,
            flags: RwLock::new(HashMap::new()),
        }
    }

    pub fn mark_restored(&self) {
        self.restored.send_replace(true);
    }

    pub fn is_restored(&self) -> bool {
        *self.restored.borrow()
    }

    pub fn set_flag(&self, name: impl Into<String>, value: bool) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }
}

#[async_trait]
impl SessionContext for RestorableSession {
    async fn ready(&self) {
        let mut rx = self.restored.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|restored| *restored).await;
    }

    fn flag(&self, name: &str) -> bool {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(false)
    }
}
