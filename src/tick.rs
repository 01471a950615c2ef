//! Change-tick clock and per-component tick pairs.
//!
//! Every mutation step advances a world-wide counter. Component insertions
//! and writes are stamped with the tick at which they happened, and systems
//! compare those stamps against a `(last_run, this_run)` window to answer
//! "was this added / changed / removed since I last looked?".

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Ticks older than this relative to `this_run` are clamped, which keeps
/// comparisons meaningful across counter wraparound.
pub const MAX_TICK_AGE: u32 = u32::MAX / 2;

/// A point on the change clock.
///
/// The value `0` is reserved as "never" and compares older than everything.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Tick(u32);

impl Tick {
    /// The reserved "never happened" tick.
    pub const NEVER: Tick = Tick(0);

    /// Creates a tick from a raw counter value.
    pub fn new(value: u32) -> Self {
        Tick(value)
    }

    /// The raw counter value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` for the reserved "never" tick.
    #[inline]
    pub fn is_never(self) -> bool {
        self.0 == 0
    }

    /// Age of this tick relative to `current`, clamped to [`MAX_TICK_AGE`].
    #[inline]
    fn age(self, current: Tick) -> u32 {
        current.0.wrapping_sub(self.0).min(MAX_TICK_AGE)
    }

    /// Returns `true` iff this tick happened after `last_run`, as observed
    /// at `this_run`.
    ///
    /// A "never" tick is newer than nothing. Ages beyond [`MAX_TICK_AGE`]
    /// are clamped on both sides of the comparison, so the answer stays
    /// correct for up to half the counter space after wraparound.
    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        !self.is_never() && self.age(this_run) < last_run.age(this_run)
    }
}

/// The `(last_run, this_run)` snapshot a system compares ticks against.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickWindow {
    /// The tick at which the consumer last observed the world.
    pub last_run: Tick,
    /// The tick of the current observation.
    pub this_run: Tick,
}

impl TickWindow {
    /// Creates a window from both endpoints.
    pub fn new(last_run: Tick, this_run: Tick) -> Self {
        TickWindow { last_run, this_run }
    }

    /// A window covering everything that ever happened up to `this_run`.
    pub fn since_start(this_run: Tick) -> Self {
        TickWindow {
            last_run: Tick::NEVER,
            this_run,
        }
    }

    /// Whether `tick` falls inside this window.
    #[inline]
    pub fn contains(self, tick: Tick) -> bool {
        tick.is_newer_than(self.last_run, self.this_run)
    }
}

/// The world's monotone mutation counter.
///
/// Atomic so that parallel query workers may read it and the occasional
/// collaborator may advance it without holding a world lock.
#[derive(Debug, Default)]
pub struct ChangeClock {
    counter: AtomicU32,
}

impl ChangeClock {
    /// Creates a clock at tick zero (nothing has happened yet).
    pub fn new() -> Self {
        ChangeClock {
            counter: AtomicU32::new(0),
        }
    }

    /// Advances the clock and returns the new tick.
    ///
    /// The reserved "never" value is skipped on wraparound.
    pub fn next(&self) -> Tick {
        loop {
            let tick = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if tick != 0 {
                return Tick(tick);
            }
        }
    }

    /// The most recently issued tick.
    pub fn current(&self) -> Tick {
        Tick(self.counter.load(Ordering::Relaxed))
    }
}

/// The `(added, changed)` tick pair of one component instance.
///
/// Both halves live in a single 64-bit atomic cell: the `added` tick in the
/// high half, the `changed` tick in the low half. Writers stamp the changed
/// half with a compare-and-swap loop, so parallel iteration can mark
/// mutations through a shared reference without locks.
#[derive(Debug)]
pub struct ComponentTicks {
    cell: AtomicU64,
}

#[inline]
fn pack(added: Tick, changed: Tick) -> u64 {
    (u64::from(added.get()) << 32) | u64::from(changed.get())
}

impl ComponentTicks {
    /// Ticks of a freshly inserted component: `added == changed`.
    pub fn inserted(tick: Tick) -> Self {
        ComponentTicks {
            cell: AtomicU64::new(pack(tick, tick)),
        }
    }

    /// The tick at which the component was inserted.
    #[inline]
    pub fn added(&self) -> Tick {
        Tick((self.cell.load(Ordering::Relaxed) >> 32) as u32)
    }

    /// The tick of the most recent mutation (or the insertion).
    #[inline]
    pub fn changed(&self) -> Tick {
        Tick(self.cell.load(Ordering::Relaxed) as u32)
    }

    /// Stamps the changed half with `tick`, leaving `added` untouched.
    #[inline]
    pub fn set_changed(&self, tick: Tick) {
        let mut current = self.cell.load(Ordering::Relaxed);
        loop {
            let next = (current & 0xFFFF_FFFF_0000_0000) | u64::from(tick.get());
            match self
                .cell
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Clone for ComponentTicks {
    fn clone(&self) -> Self {
        ComponentTicks {
            cell: AtomicU64::new(self.cell.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_is_never_newer() {
        assert!(!Tick::NEVER.is_newer_than(Tick::NEVER, Tick::new(100)));
        assert!(!Tick::NEVER.is_newer_than(Tick::new(5), Tick::new(100)));
    }

    #[test]
    fn window_comparisons() {
        // Added at 5, changed at 8; a system that last ran at 0 and runs at
        // 10 sees both, a later system window (10, 20) sees neither.
        let added = Tick::new(5);
        let changed = Tick::new(8);

        let first = TickWindow::new(Tick::NEVER, Tick::new(10));
        assert!(first.contains(added));
        assert!(first.contains(changed));

        let second = TickWindow::new(Tick::new(10), Tick::new(20));
        assert!(!second.contains(added));
        assert!(!second.contains(changed));
    }

    #[test]
    fn boundary_is_exclusive() {
        // A tick equal to last_run is not newer than last_run.
        let window = TickWindow::new(Tick::new(5), Tick::new(10));
        assert!(!window.contains(Tick::new(5)));
        assert!(window.contains(Tick::new(6)));
    }

    #[test]
    fn wraparound_is_clamped() {
        // this_run has wrapped past zero; a tick from just before the wrap
        // must still count as recent.
        let this_run = Tick::new(10);
        let recent = Tick::new(u32::MAX - 5);
        let last_run = Tick::new(u32::MAX - 50);
        assert!(recent.is_newer_than(last_run, this_run));

        // An ancient tick is clamped and no longer compares as newer once
        // the window itself is clamped too.
        let ancient = Tick::new(this_run.get().wrapping_sub(MAX_TICK_AGE).wrapping_sub(17));
        assert!(!ancient.is_newer_than(ancient, this_run));
    }

    #[test]
    fn clock_advances_and_skips_never() {
        let clock = ChangeClock::new();
        assert_eq!(clock.current(), Tick::NEVER);
        assert_eq!(clock.next(), Tick::new(1));
        assert_eq!(clock.next(), Tick::new(2));
        assert_eq!(clock.current(), Tick::new(2));
    }

    #[test]
    fn component_ticks_pack() {
        let ticks = ComponentTicks::inserted(Tick::new(7));
        assert_eq!(ticks.added(), Tick::new(7));
        assert_eq!(ticks.changed(), Tick::new(7));

        ticks.set_changed(Tick::new(12));
        assert_eq!(ticks.added(), Tick::new(7));
        assert_eq!(ticks.changed(), Tick::new(12));
    }
}
