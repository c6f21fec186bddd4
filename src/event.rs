//! Change-notification channel.
//!
//! A minimal many-listener fan-out primitive. Emission is synchronous and
//! strictly in registration order; every `emit` produces exactly one call per
//! listener, never batched or suppressed. Registration returns a
//! [`Subscription`] handle whose drop revokes the listener, so listener
//! lifetime is scoped to whatever owns the handle.
//!
//! A handler that panics aborts the remaining fan-out for that emission; no
//! error isolation is attempted.
//!
//! The channel is single-threaded by design (`Rc`, not `Arc`): the whole
//! engine runs on one logical thread of control.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

type Handler<T> = Box<dyn FnMut(&T)>;

struct Handlers<T> {
    next_id: u64,
    entries: Vec<(u64, Handler<T>)>,
    /// Ids revoked while `entries` was checked out by an in-flight emit.
    revoked: HashSet<u64>,
    emitting: bool,
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
            revoked: HashSet::new(),
            emitting: false,
        }
    }
}

/// A many-listener event channel carrying values of type `T`.
pub struct EventSource<T> {
    inner: Rc<RefCell<Handlers<T>>>,
}

impl<T: 'static> Default for EventSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> EventSource<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Handlers::default())),
        }
    }

    /// Register a handler for all future emissions.
    ///
    /// The handler stays registered for as long as the returned
    /// [`Subscription`] is alive (or until [`Subscription::forget`] pins it).
    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on(&self, handler: impl FnMut(&T) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, Box::new(handler)));

        Subscription {
            revoke: Some(Box::new(SourceRevoke {
                inner: Rc::downgrade(&self.inner),
                id,
            })),
        }
    }

    /// Synchronously invoke every registered handler, in registration order.
    ///
    /// A handler must not emit on the same source re-entrantly: the handler
    /// list is checked out for the duration of the fan-out, so a nested
    /// `emit` could only deliver to no one. Debug builds panic on it;
    /// release builds drop the nested emission. Handlers may freely
    /// register or revoke listeners, and may emit on *other* sources.
    pub fn emit(&self, value: &T) {
        // Check the handler list out of the cell so handlers may register
        // new listeners (delivered on the *next* emit) or revoke existing
        // ones without re-entrant borrows.
        let mut entries = {
            let mut inner = self.inner.borrow_mut();
            debug_assert!(!inner.emitting, "re-entrant emit on the same EventSource");
            inner.emitting = true;
            std::mem::take(&mut inner.entries)
        };

        for (_, handler) in entries.iter_mut() {
            handler(value);
        }

        let mut inner = self.inner.borrow_mut();
        inner.emitting = false;
        let registered_during_emit = std::mem::take(&mut inner.entries);
        entries.extend(registered_during_emit);
        if !inner.revoked.is_empty() {
            let revoked = std::mem::take(&mut inner.revoked);
            entries.retain(|(id, _)| !revoked.contains(id));
        }
        inner.entries = entries;
    }

    /// Number of currently-registered handlers.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

trait Revoke {
    fn revoke(&self);
}

struct SourceRevoke<T> {
    inner: Weak<RefCell<Handlers<T>>>,
    id: u64,
}

impl<T> Revoke for SourceRevoke<T> {
    fn revoke(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.borrow_mut();
            let before = inner.entries.len();
            inner.entries.retain(|(id, _)| *id != self.id);
            if inner.entries.len() == before {
                // Entry is checked out by an in-flight emit.
                let id = self.id;
                inner.revoked.insert(id);
            }
        }
    }
}

/// Handle scoping a listener registration; drop revokes the listener.
pub struct Subscription {
    revoke: Option<Box<dyn Revoke>>,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of the channel.
    pub fn forget(mut self) {
        self.revoke = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke.revoke();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn emit_reaches_every_listener_in_order() {
        let source: EventSource<i32> = EventSource::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = Rc::clone(&seen);
        let _a = source.on(move |v| seen_a.borrow_mut().push(("a", *v)));
        let seen_b = Rc::clone(&seen);
        let _b = source.on(move |v| seen_b.borrow_mut().push(("b", *v)));

        source.emit(&1);
        source.emit(&2);

        assert_eq!(
            *seen.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn dropping_subscription_revokes_listener() {
        let source: EventSource<()> = EventSource::new();
        let calls = Rc::new(Cell::new(0));

        let calls_clone = Rc::clone(&calls);
        let sub = source.on(move |_| calls_clone.set(calls_clone.get() + 1));

        source.emit(&());
        assert_eq!(calls.get(), 1);

        drop(sub);
        source.emit(&());
        assert_eq!(calls.get(), 1);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn forget_pins_listener_for_channel_lifetime() {
        let source: EventSource<()> = EventSource::new();
        let calls = Rc::new(Cell::new(0));

        let calls_clone = Rc::clone(&calls);
        source
            .on(move |_| calls_clone.set(calls_clone.get() + 1))
            .forget();

        source.emit(&());
        source.emit(&());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn listener_registered_during_emit_sees_next_emit_only() {
        let source: EventSource<i32> = EventSource::new();
        let late_calls = Rc::new(Cell::new(0));

        let source_clone = source.clone();
        let late_calls_clone = Rc::clone(&late_calls);
        let registered = Rc::new(Cell::new(false));
        let registered_clone = Rc::clone(&registered);
        source
            .on(move |_| {
                if !registered_clone.get() {
                    registered_clone.set(true);
                    let late_calls = Rc::clone(&late_calls_clone);
                    source_clone
                        .on(move |_| late_calls.set(late_calls.get() + 1))
                        .forget();
                }
            })
            .forget();

        source.emit(&1);
        assert_eq!(late_calls.get(), 0);

        source.emit(&2);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    #[should_panic(expected = "re-entrant emit")]
    fn reentrant_emit_on_same_source_is_rejected() {
        let source: EventSource<i32> = EventSource::new();

        let source_clone = source.clone();
        source
            .on(move |v| {
                if *v == 1 {
                    source_clone.emit(&2);
                }
            })
            .forget();

        source.emit(&1);
    }

    #[test]
    fn panicking_handler_aborts_remaining_fanout() {
        let source: EventSource<()> = EventSource::new();
        let reached = Rc::new(Cell::new(false));

        source.on(|_| panic!("boom")).forget();
        let reached_clone = Rc::clone(&reached);
        source.on(move |_| reached_clone.set(true)).forget();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            source.emit(&());
        }));

        assert!(result.is_err());
        assert!(!reached.get());
    }
}
