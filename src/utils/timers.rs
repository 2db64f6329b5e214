//! Explicit timer table driven by an injected [`Clock`].

use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

/// Source of the current time.
pub trait Clock {
    /// Returns the current [`Instant`].
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now()`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// [`Clock`] which moves only when told to.
#[derive(Debug)]
pub struct ManualClock(Cell<Instant>);

impl ManualClock {
    /// Creates new [`ManualClock`] starting at the current [`Instant`].
    #[inline]
    pub fn new() -> Self {
        Self(Cell::new(Instant::now()))
    }

    /// Moves this [`ManualClock`] forward by the provided [`Duration`].
    #[inline]
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Default for ManualClock {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Instant {
        self.0.get()
    }
}

/// ID of a timer scheduled in [`Timers`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimerId(u64);

/// Table of one-shot timers, each carrying a key of type `K`.
///
/// Timers don't fire by themselves: owner calls [`Timers::expired`] whenever
/// the [`Clock`] may have passed some deadline (see
/// [`Timers::next_deadline`]).
pub struct Timers<K> {
    /// [`Clock`] deadlines are measured with.
    clock: Rc<dyn Clock>,

    /// Last issued [`TimerId`].
    last_id: u64,

    /// Scheduled timers ordered by their deadlines.
    queue: BTreeMap<(Instant, TimerId), K>,

    /// Deadlines of the scheduled timers.
    deadlines: HashMap<TimerId, Instant>,
}

impl<K> fmt::Debug for Timers<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("pending", &self.queue.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

impl<K> Timers<K> {
    /// Creates new empty [`Timers`] measuring time with the provided
    /// [`Clock`].
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            last_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Returns current time of the underlying [`Clock`].
    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Schedules new timer firing after the provided `delay`.
    pub fn schedule(&mut self, delay: Duration, key: K) -> TimerId {
        self.last_id += 1;
        let id = TimerId(self.last_id);
        let deadline = self.clock.now() + delay;
        self.queue.insert((deadline, id), key);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancels the timer with the provided [`TimerId`] returning its key.
    ///
    /// Returns [`None`] if it has already fired or been cancelled.
    pub fn cancel(&mut self, id: TimerId) -> Option<K> {
        let deadline = self.deadlines.remove(&id)?;
        self.queue.remove(&(deadline, id))
    }

    /// Indicates whether the timer with the provided [`TimerId`] is still
    /// pending.
    #[inline]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Removes the earliest timer which deadline has passed, returning its
    /// key.
    pub fn pop_expired(&mut self) -> Option<K> {
        let (deadline, id) = *self.queue.keys().next()?;
        if deadline > self.clock.now() {
            return None;
        }
        self.deadlines.remove(&id);
        self.queue.remove(&(deadline, id))
    }

    /// Removes all the timers which deadline has passed, returning their keys
    /// in the order of their deadlines.
    pub fn expired(&mut self) -> Vec<K> {
        let mut fired = Vec::new();
        while let Some(key) = self.pop_expired() {
            fired.push(key);
        }
        fired
    }

    /// Returns the earliest deadline among the pending timers.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Returns count of the pending timers.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Indicates whether there are no pending timers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Cancels all the pending timers.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }
}
