//! Periodic measurement bookkeeping shared by all drivers.
//!
//! A driver owns a [`Periodic`] and exposes it through [`PeriodicMeasurement`].
//! Measurements are kept in a fixed capacity ring buffer; once it is full the
//! oldest entry is dropped.

use heapless::Deque;

#[derive(Debug, Clone)]
pub struct Periodic<T, const N: usize> {
    data: Deque<T, N>,
    running: bool,
    updated: bool,
    interval: u32,
    latest: Option<u64>,
}

impl<T, const N: usize> Default for Periodic<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Periodic<T, N> {
    pub const fn new() -> Self {
        Self {
            data: Deque::new(),
            running: false,
            updated: false,
            interval: 0,
            latest: None,
        }
    }

    pub fn in_periodic(&self) -> bool {
        self.running
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    /// Timestamp (ms) of the latest stored measurement.
    pub fn updated_millis(&self) -> Option<u64> {
        self.latest
    }

    pub(crate) fn start(&mut self, interval: u32) {
        self.running = true;
        self.interval = interval;
        self.latest = None;
    }

    pub(crate) fn stop(&mut self) {
        self.running = false;
    }

    pub(crate) fn set_interval(&mut self, interval: u32) {
        self.interval = interval;
    }

    pub(crate) fn begin_update(&mut self) {
        self.updated = false;
    }

    /// Whether a periodic update should poll the device at `now`.
    pub(crate) fn due(&self, now: u64, force: bool) -> bool {
        self.running
            && match self.latest {
                None => true,
                Some(latest) => force || now >= latest.saturating_add(self.interval as u64),
            }
    }

    pub(crate) fn store(&mut self, now: u64, value: T) {
        if self.data.is_full() {
            self.data.pop_front();
        }
        // Cannot fail, a slot was freed above.
        let _ = self.data.push_back(value);
        self.latest = Some(now);
        self.updated = true;
    }

    pub fn available(&self) -> usize {
        self.data.len()
    }

    pub fn empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn full(&self) -> bool {
        self.data.is_full()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.data.front()
    }

    pub fn latest(&self) -> Option<&T> {
        self.data.back()
    }

    pub fn discard(&mut self) {
        self.data.pop_front();
    }

    pub fn flush(&mut self) {
        self.data.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

/// Periodic measurement capability of a driver. Drivers hand out their
/// [`Periodic`] state; everything else is provided.
pub trait PeriodicMeasurement<const N: usize> {
    type Data;

    fn periodic(&self) -> &Periodic<Self::Data, N>;
    fn periodic_mut(&mut self) -> &mut Periodic<Self::Data, N>;

    fn in_periodic(&self) -> bool {
        self.periodic().in_periodic()
    }

    /// Measurement interval in milliseconds.
    fn interval(&self) -> u32 {
        self.periodic().interval()
    }

    /// Whether the last `update` stored a measurement.
    fn updated(&self) -> bool {
        self.periodic().updated()
    }

    fn updated_millis(&self) -> Option<u64> {
        self.periodic().updated_millis()
    }

    fn available(&self) -> usize {
        self.periodic().available()
    }

    fn empty(&self) -> bool {
        self.periodic().empty()
    }

    fn full(&self) -> bool {
        self.periodic().full()
    }

    fn oldest(&self) -> Option<&Self::Data> {
        self.periodic().oldest()
    }

    fn latest(&self) -> Option<&Self::Data> {
        self.periodic().latest()
    }

    fn discard(&mut self) {
        self.periodic_mut().discard()
    }

    fn flush(&mut self) {
        self.periodic_mut().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::Periodic;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut p: Periodic<u32, 2> = Periodic::new();
        p.start(1000);
        p.store(0, 1);
        p.store(1000, 2);
        assert!(p.full());
        p.store(2000, 3);
        assert_eq!(p.available(), 2);
        assert_eq!(p.oldest(), Some(&2));
        assert_eq!(p.latest(), Some(&3));
        p.discard();
        assert_eq!(p.oldest(), Some(&3));
        p.flush();
        assert!(p.empty());
        assert_eq!(p.latest(), None);
    }

    #[test]
    fn test_due() {
        let mut p: Periodic<u32, 1> = Periodic::new();
        assert!(!p.due(0, true));

        p.start(5000);
        assert!(p.due(10, false));
        p.store(10, 1);
        assert!(p.updated());
        assert!(!p.due(5009, false));
        assert!(p.due(5009, true));
        assert!(p.due(5010, false));

        p.begin_update();
        assert!(!p.updated());
        assert_eq!(p.updated_millis(), Some(10));

        p.stop();
        assert!(!p.due(99999, true));
        assert!(!p.in_periodic());
    }

    #[test]
    fn test_due_near_clock_limit() {
        let mut p: Periodic<u32, 1> = Periodic::new();
        p.start(1000);
        p.store(u64::MAX - 10, 1);
        assert!(!p.due(u64::MAX - 5, false));
        assert!(p.due(u64::MAX, true));
    }
}
