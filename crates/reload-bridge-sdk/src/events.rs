//! Reload notification capability
//!
//! The coordinator depends on an explicit subscription interface rather than
//! on whatever event target a compiled unit happens to publish.

use std::sync::Arc;

/// Handler invoked when a subscribed event fires
pub type ReloadHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Source of external reload notifications
pub trait ReloadNotifier: Send + Sync + 'static {
    /// Register `handler` for `event`; the handler stays registered until the
    /// returned subscription is dropped or unsubscribed
    fn subscribe(&self, event: &str, handler: ReloadHandler) -> Subscription;
}

/// Token for a registered handler
///
/// Dropping the token unsubscribes.
#[must_use = "dropping a subscription unsubscribes the handler"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a subscription that runs `cancel` once when released
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Release the handler now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
