use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::debug;

use crate::{MatchRule, OwnedMessage};

use super::Shared;

/// The server-side state of a match entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Subscription {
    /// No `AddMatch` has been issued for the rule.
    Unsubscribed,
    /// An `AddMatch` call is outstanding.
    Pending,
    /// The `AddMatch` call was acknowledged by the bus.
    Subscribed,
}

/// One observer attached to a match entry.
pub(crate) struct ObserverSlot {
    pub(crate) id: u64,
    pub(crate) tx: mpsc::UnboundedSender<OwnedMessage>,
    /// Whether this observer participates in the server-side subscription.
    pub(crate) subscribes: bool,
}

/// A match entry: one compiled rule shared by every observer subscribed to
/// the same rule string, and at most one server-side subscription.
pub(crate) struct MatchEntry {
    pub(crate) rule: MatchRule,
    pub(crate) observers: Vec<ObserverSlot>,
    pub(crate) subscription: Subscription,
}

impl MatchEntry {
    pub(crate) fn new(rule: MatchRule) -> Self {
        Self {
            rule,
            observers: Vec::new(),
            subscription: Subscription::Unsubscribed,
        }
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        self.observers.iter().any(|slot| slot.subscribes)
    }
}

/// A subscription handle tying a match rule to a stream of messages.
///
/// Matched messages are received with [`recv`]. Dropping the observer
/// disposes it: it detaches from its match entry, and when it was the last
/// subscribing observer on the rule a best-effort `RemoveMatch` is sent.
///
/// [`recv`]: Self::recv
#[derive(Debug)]
pub struct Observer {
    shared: Weak<Shared>,
    rule: Box<str>,
    id: u64,
    rx: mpsc::UnboundedReceiver<OwnedMessage>,
    disposed: bool,
}

impl Observer {
    pub(crate) fn new(
        shared: Weak<Shared>,
        rule: Box<str>,
        id: u64,
        rx: mpsc::UnboundedReceiver<OwnedMessage>,
    ) -> Self {
        Self {
            shared,
            rule,
            id,
            rx,
            disposed: false,
        }
    }

    /// The rule string this observer is attached to.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Receive the next matched message.
    ///
    /// Returns `None` once the observer is disposed or the connection is
    /// torn down and every buffered message has been drained.
    pub async fn recv(&mut self) -> Option<OwnedMessage> {
        self.rx.recv().await
    }

    /// Receive a matched message if one is already buffered.
    pub fn try_recv(&mut self) -> Option<OwnedMessage> {
        self.rx.try_recv().ok()
    }

    /// Dispose the observer.
    ///
    /// Disposal is idempotent. Detaches from the match entry; disposing the
    /// last subscribing observer of a rule removes the entry and sends a
    /// best-effort `RemoveMatch` with no reply expected.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }

        self.disposed = true;
        self.rx.close();

        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        shared.detach_observer(&self.rule, self.id);
        debug!(rule = &*self.rule, "observer disposed");
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.dispose();
    }
}
