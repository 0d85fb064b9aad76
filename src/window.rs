use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent samples.
///
/// `mean()` and `max()` cover only the samples still in the window and
/// return `0.0` when the window is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RollingWindow {
    /// A zero capacity is bumped to one so `add` always retains the newest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, samples: VecDeque::with_capacity(capacity) }
    }

    pub fn add(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Recomputed over the live samples so an evicted peak no longer counts.
    pub fn max(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first.
    #[cfg(test)]
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero() {
        let w = RollingWindow::new(3);
        assert!(w.is_empty());
        assert_eq!(w.mean(), 0.0);
        assert_eq!(w.max(), 0.0);
    }

    #[test]
    fn keeps_only_most_recent_samples() {
        let mut w = RollingWindow::new(3);
        for v in 1..=5 {
            w.add(v as f64);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.samples().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.mean(), 4.0);
    }

    #[test]
    fn max_decays_when_peak_is_evicted() {
        let mut w = RollingWindow::new(2);
        w.add(5.0);
        w.add(1.0);
        assert_eq!(w.max(), 5.0);
        w.add(1.0);
        assert_eq!(w.samples().collect::<Vec<_>>(), vec![1.0, 1.0]);
        assert_eq!(w.max(), 1.0);
    }

    #[test]
    fn partially_filled_window_averages_what_it_has() {
        let mut w = RollingWindow::new(10);
        w.add(2.0);
        w.add(4.0);
        assert_eq!(w.len(), 2);
        assert_eq!(w.mean(), 3.0);
        assert_eq!(w.max(), 4.0);
    }

    #[test]
    fn zero_capacity_still_holds_latest() {
        let mut w = RollingWindow::new(0);
        w.add(7.0);
        w.add(9.0);
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.samples().collect::<Vec<_>>(), vec![9.0]);
    }
}
