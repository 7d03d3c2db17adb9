//! Rolling Sample Window
//!
//! Fixed-capacity ring buffer; once full, each push overwrites the oldest
//! sample.

/// Ring buffer of the most recent `capacity` samples
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    samples: Vec<T>,
    capacity: usize,
    /// Slot the next push writes to once the buffer is full
    head: usize,
}

impl<T: Copy> RollingWindow<T> {
    /// Create an empty window (capacity minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append a sample, dropping the oldest when full
    pub fn push(&mut self, sample: T) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.samples.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if no samples were recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl RollingWindow<f64> {
    /// Arithmetic mean, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_fills_then_overwrites_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), 2.0);

        window.push(10.0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 10.0]);
        assert_eq!(window.mean(), 5.0);

        window.push(20.0);
        window.push(30.0);
        window.push(40.0);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_empty_window_mean_is_zero() {
        let window: RollingWindow<f64> = RollingWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut window = RollingWindow::new(0);
        assert_eq!(window.capacity(), 1);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.mean(), 2.0);
    }
}
