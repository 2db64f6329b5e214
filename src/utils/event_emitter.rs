//! Fan-out of typed events to their subscribers.

use std::{cell::RefCell, fmt, rc::Rc};

use futures::{channel::mpsc, stream::LocalBoxStream};

/// Synchronous listener of emitted events.
type Listener<E> = Rc<dyn Fn(&E)>;

/// Emitter of events of type `E`.
///
/// Events are delivered to every live [`EventEmitter::subscribe`] stream and
/// to every listener registered with [`EventEmitter::on`]. Nothing is
/// buffered for future subscribers: a subscriber receives only the events
/// emitted after it subscribed.
pub struct EventEmitter<E> {
    /// Senders of the [`EventEmitter::subscribe`] streams. Closed ones are
    /// dropped on the next emit.
    senders: RefCell<Vec<mpsc::UnboundedSender<E>>>,

    /// Listeners invoked synchronously on every emit.
    listeners: RefCell<Vec<Listener<E>>>,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            senders: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.senders.borrow().len())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E: Clone + 'static> EventEmitter<E> {
    /// Creates new [`EventEmitter`] without subscribers.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns [`LocalBoxStream`] of all events emitted from now on.
    pub fn subscribe(&self) -> LocalBoxStream<'static, E> {
        let (tx, rx) = mpsc::unbounded();
        self.senders.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Registers `listener` to be called synchronously on every emitted event.
    ///
    /// The listener may emit into this [`EventEmitter`] again and may
    /// register other listeners: no borrow is held while it runs.
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&E) + 'static,
    {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Emits `event` to all subscribers and listeners.
    pub fn emit(&self, event: E) {
        let listeners: Vec<_> =
            self.listeners.borrow().iter().cloned().collect();
        for listener in listeners {
            (listener)(&event);
        }
        self.senders
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    /// Indicates whether anyone listens to this [`EventEmitter`].
    pub fn has_subscribers(&self) -> bool {
        !self.listeners.borrow().is_empty()
            || self.senders.borrow().iter().any(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::Cell, rc::Rc};

    use futures::{executor, StreamExt as _};

    use super::EventEmitter;

    #[test]
    fn delivers_to_every_subscriber() {
        let emitter = EventEmitter::new();
        let first = emitter.subscribe();
        let second = emitter.subscribe();

        emitter.emit(1);
        emitter.emit(2);
        drop(emitter);

        assert_eq!(executor::block_on(first.collect::<Vec<_>>()), vec![1, 2]);
        assert_eq!(executor::block_on(second.collect::<Vec<_>>()), vec![1, 2]);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let emitter = EventEmitter::new();
        emitter.emit("early");
        let stream = emitter.subscribe();
        emitter.emit("late");
        drop(emitter);

        assert_eq!(
            executor::block_on(stream.collect::<Vec<_>>()),
            vec!["late"],
        );
    }

    #[test]
    fn drops_closed_subscribers() {
        let emitter = EventEmitter::new();
        let stream = emitter.subscribe();
        assert!(emitter.has_subscribers());

        drop(stream);
        emitter.emit(());

        assert!(!emitter.has_subscribers());
        assert!(emitter.senders.borrow().is_empty());
    }

    #[test]
    fn listeners_may_reenter() {
        let emitter = Rc::new(EventEmitter::new());
        let calls = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&emitter);
        let counter = Rc::clone(&calls);
        emitter.on(move |n: &u8| {
            counter.set(counter.get() + 1);
            if *n == 0 {
                if let Some(emitter) = weak.upgrade() {
                    emitter.emit(1);
                }
            }
        });
        emitter.emit(0);

        assert_eq!(calls.get(), 2);
    }
}
