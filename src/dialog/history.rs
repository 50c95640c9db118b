//! Append-only dialog log with synchronous publish/subscribe.
//!
//! Appends are serialized: each one is pushed and delivered to every handler
//! registered at that moment before the next append starts, so every handler
//! sees events exactly once and in log order. Handlers run on the appending
//! thread and must not block or append themselves.

use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use super::event::DialogEvent;

/// Callback invoked for every appended event.
pub type EventHandler =
    Arc<dyn Fn(&Arc<DialogEvent>, &DialogHistory) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct State {
    events: Vec<Arc<DialogEvent>>,
    handlers: Vec<(HandlerId, EventHandler)>,
    next_handler: u64,
    closed: bool,
}

#[derive(Default)]
pub struct DialogHistory {
    state: Mutex<State>,
    delivery: Mutex<()>,
}

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as delivering; cleared on drop, including unwinds.
struct DeliveryMark;

impl DeliveryMark {
    fn enter() -> Self {
        DELIVERING.with(|d| d.set(true));
        DeliveryMark
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(false));
    }
}

impl DialogHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `event` and deliver it to every current handler before returning.
    ///
    /// # Panics
    /// If the history is closed, or if called from inside a handler.
    pub fn append(&self, event: impl Into<DialogEvent>) -> Arc<DialogEvent> {
        if DELIVERING.with(Cell::get) {
            panic!("DialogHistory::append called from inside an event handler");
        }

        let _serial = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let (event, handlers) = {
            let mut state = self.state();
            if state.closed {
                panic!("append to a closed DialogHistory");
            }
            let event = Arc::new(event.into());
            state.events.push(Arc::clone(&event));
            (event, state.handlers.clone())
        };

        debug!(
            author = %event.author(),
            handlers = handlers.len(),
            "Dialog event appended"
        );

        let _mark = DeliveryMark::enter();
        for (id, handler) in handlers {
            if let Err(e) = handler(&event, self) {
                warn!(handler = id.0, error = %e, "Dialog event handler failed");
            }
        }

        event
    }

    /// Register `handler` for every event appended from now on.
    pub fn subscribe_handler(&self, handler: EventHandler) -> HandlerId {
        let mut state = self.state();
        let id = HandlerId(state.next_handler);
        state.next_handler += 1;
        state.handlers.push((id, handler));
        id
    }

    /// Register `handler`; it is removed when the returned guard is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&Arc<DialogEvent>, &DialogHistory) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.subscribe_handler(Arc::new(handler));
        Subscription {
            history: Arc::downgrade(self),
            id,
        }
    }

    /// Returns whether a handler was removed.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut state = self.state();
        let before = state.handlers.len();
        state.handlers.retain(|(h, _)| *h != id);
        state.handlers.len() != before
    }

    /// Copy of the full log, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<DialogEvent>> {
        self.state().events.clone()
    }

    /// Events appended before `event`; the whole log if it is not in it.
    pub fn events_before(&self, event: &Arc<DialogEvent>) -> Vec<Arc<DialogEvent>> {
        let state = self.state();
        match state.events.iter().position(|e| Arc::ptr_eq(e, event)) {
            Some(pos) => state.events[..pos].to_vec(),
            None => state.events.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handler_count(&self) -> usize {
        self.state().handlers.len()
    }

    /// Refuse further appends and drop every handler.
    pub fn close(&self) {
        let _serial = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state();
        state.closed = true;
        state.handlers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Unsubscribes its handler on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    history: Weak<DialogHistory>,
    id: HandlerId,
}

impl Subscription {
    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(history) = self.history.upgrade() {
            history.unsubscribe(self.id);
        }
    }
}
