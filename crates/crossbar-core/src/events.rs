//! Observability callbacks shared by every resilience pattern.
//!
//! Each pattern defines its own event enum and exposes `on_*` builder hooks;
//! this module supplies the listener plumbing underneath them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by a resilience pattern instance.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Stable event kind, e.g. `"state_transition"`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Name of the pattern instance (usually the service name).
    fn pattern_name(&self) -> &str;
}

/// A consumer of pattern events.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// An ordered collection of listeners.
///
/// A listener that panics is isolated: the panic is caught, logged, and the
/// remaining listeners still run.
#[derive(Clone)]
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: ResilienceEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L: EventListener<E> + 'static>(&mut self, listener: L) {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if outcome.is_err() {
                tracing::warn!(
                    pattern = event.pattern_name(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
                metrics::counter!(
                    "crossbar_event_listener_panics_total",
                    "event_type" => event.event_type()
                )
                .increment(1);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a closure into an [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Tick {
        at: Instant,
    }

    impl ResilienceEvent for Tick {
        fn event_type(&self) -> &'static str {
            "tick"
        }
        fn timestamp(&self) -> Instant {
            self.at
        }
        fn pattern_name(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn all_listeners_receive_events() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&hits), Arc::clone(&hits));

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_: &Tick| {
            a.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.add(FnListener::new(move |_: &Tick| {
            b.fetch_add(10, Ordering::SeqCst);
        }));

        listeners.emit(&Tick { at: Instant::now() });
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let survivor = Arc::clone(&hits);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &Tick| panic!("boom")));
        listeners.add(FnListener::new(move |_: &Tick| {
            survivor.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&Tick { at: Instant::now() });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
