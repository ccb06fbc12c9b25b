//! Transport observers.

use dg_ir::TransportEvent;

/// Handle returned by `subscribe`; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type TransportCallback = Box<dyn FnMut(&TransportEvent) + Send>;

#[derive(Default)]
pub struct Subscribers {
    next: u64,
    entries: Vec<(SubscriptionId, TransportCallback)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribe(&mut self, callback: TransportCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.entries.push((id, callback));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(e, _)| *e != id);
        self.entries.len() != before
    }

    /// Deliver `event` to every subscriber in subscription order.
    pub fn notify(&mut self, event: &TransportEvent) {
        for (_, callback) in &mut self.entries {
            callback(event);
        }
    }
}
