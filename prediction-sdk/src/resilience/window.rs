//! Fixed-capacity window of recent call results

use std::collections::VecDeque;

/// Ring buffer of success/failure flags used to compute a rolling failure ratio.
///
/// Capacity is fixed at construction; pushing into a full window evicts the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct FailureWindow {
    capacity: usize,
    results: VecDeque<bool>,
    failures: usize,
}

impl FailureWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: VecDeque::with_capacity(capacity),
            failures: 0,
        }
    }

    /// Record one result; `true` means success
    pub fn push(&mut self, success: bool) {
        if self.results.len() == self.capacity {
            if let Some(evicted) = self.results.pop_front() {
                if !evicted {
                    self.failures -= 1;
                }
            }
        }

        self.results.push_back(success);
        if !success {
            self.failures += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Failures over recorded samples, 0.0 when empty
    pub fn failure_ratio(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.results.len() as f64
        }
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_over_recorded_samples() {
        let mut window = FailureWindow::new(10);
        assert_eq!(window.failure_ratio(), 0.0);

        window.push(false);
        window.push(true);
        window.push(false);
        window.push(true);

        assert_eq!(window.len(), 4);
        assert_eq!(window.failures(), 2);
        assert!((window.failure_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let mut window = FailureWindow::new(3);
        window.push(false);
        window.push(false);
        window.push(false);
        assert_eq!(window.failures(), 3);

        window.push(true);
        window.push(true);

        assert_eq!(window.len(), 3);
        assert_eq!(window.failures(), 1);
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut window = FailureWindow::new(4);
        window.push(false);
        window.clear();

        assert!(window.is_empty());
        assert_eq!(window.failures(), 0);
        assert_eq!(window.capacity(), 4);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = FailureWindow::new(0);
        window.push(false);
        window.push(true);
        assert_eq!(window.len(), 1);
        assert_eq!(window.failures(), 0);
    }
}
