//! Weighted moving average of a statistics time series.

use std::{collections::VecDeque, fmt};

/// Kind of values added to an [`AverageStatValue`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatValueKind {
    /// Every value is a running total, and its difference with the previous
    /// one is averaged.
    Cumulative,

    /// Every value is averaged as is.
    Instantaneous,
}

/// Fixed window weighted moving average of a statistics value.
///
/// More recent values weigh more: the oldest retained value has weight `1`,
/// the newest one has the configured last value weight, and the weights in
/// between grow linearly.
#[derive(Clone, Debug)]
pub struct AverageStatValue {
    /// Maximum count of retained values.
    window: usize,

    /// Kind of the added values.
    kind: StatValueKind,

    /// Weight added to every next value, relative to the previous one.
    extra_weight: f64,

    /// Values as they were added.
    raw: VecDeque<f64>,

    /// Values being averaged.
    relative: VecDeque<f64>,
}

impl AverageStatValue {
    /// Creates new empty [`AverageStatValue`].
    ///
    /// `window` is clamped to at least `1` value.
    pub fn new(window: usize, kind: StatValueKind, last_weight: f64) -> Self {
        let window = window.max(1);
        let extra_weight = if window > 1 {
            (last_weight - 1.0) / (window - 1) as f64
        } else {
            0.0
        };
        Self {
            window,
            kind,
            extra_weight,
            raw: VecDeque::with_capacity(window),
            relative: VecDeque::with_capacity(window),
        }
    }

    /// Forgets all the added values.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.relative.clear();
    }

    /// Adds new value evicting the oldest one if the window is full.
    ///
    /// The first [`StatValueKind::Cumulative`] value after a reset is only
    /// a base for the next ones, so it's averaged as `0`.
    pub fn add(&mut self, value: f64) {
        if self.raw.len() == self.window {
            self.raw.pop_front();
            self.relative.pop_front();
        }

        let relative = match self.kind {
            StatValueKind::Instantaneous => value,
            StatValueKind::Cumulative => {
                value - self.raw.back().copied().unwrap_or(value)
            }
        };
        self.raw.push_back(value);
        self.relative.push_back(relative);
    }

    /// Returns the last added value.
    #[inline]
    pub fn last_raw_value(&self) -> Option<f64> {
        self.raw.back().copied()
    }

    /// Returns the last averaged value.
    #[inline]
    pub fn last_relative_value(&self) -> Option<f64> {
        self.relative.back().copied()
    }

    /// Indicates whether the window is full, so the average can be trusted.
    #[inline]
    pub fn has_enough_data(&self) -> bool {
        self.raw.len() == self.window
    }

    /// Returns the weighted average of the retained values.
    ///
    /// [`None`] if no values were added.
    pub fn weighted_average(&self) -> Option<f64> {
        if self.relative.is_empty() {
            return None;
        }
        let (values, weights) = self.relative.iter().enumerate().fold(
            (0.0, 0.0),
            |(values, weights), (i, value)| {
                let weight = 1.0 + i as f64 * self.extra_weight;
                (values + value * weight, weights + weight)
            },
        );
        Some(values / weights)
    }
}

impl fmt::Display for AverageStatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.relative.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod spec {
    use super::{AverageStatValue, StatValueKind};

    fn assert_approx(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!(
            (actual - expected).abs() < 1e-9,
            "{} != {}",
            actual,
            expected,
        );
    }

    #[test]
    fn weighs_recent_values_more() {
        let mut avg =
            AverageStatValue::new(3, StatValueKind::Instantaneous, 3.0);
        for v in &[10.0, 20.0, 30.0] {
            avg.add(*v);
        }

        assert_approx(avg.weighted_average(), 140.0 / 6.0);
    }

    #[test]
    fn has_enough_data_once_window_is_full() {
        let mut avg = AverageStatValue::new(4, StatValueKind::Cumulative, 3.0);
        for i in 0..3 {
            avg.add(f64::from(i));
            assert!(!avg.has_enough_data());
        }
        avg.add(3.0);
        assert!(avg.has_enough_data());
        avg.add(4.0);
        assert!(avg.has_enough_data());

        avg.reset();
        assert!(!avg.has_enough_data());
        assert_eq!(avg.weighted_average(), None);
    }

    #[test]
    fn first_cumulative_value_is_base() {
        let mut avg = AverageStatValue::new(3, StatValueKind::Cumulative, 3.0);
        avg.add(100.0);

        assert_eq!(avg.last_relative_value(), Some(0.0));
        assert_eq!(avg.last_raw_value(), Some(100.0));

        avg.add(110.0);
        avg.add(130.0);

        assert_eq!(avg.to_string(), "[0, 10, 20]");
        assert_approx(avg.weighted_average(), (0.0 + 20.0 + 60.0) / 6.0);
    }

    #[test]
    fn evicts_oldest_values() {
        let mut avg = AverageStatValue::new(2, StatValueKind::Cumulative, 3.0);
        for v in &[1.0, 2.0, 4.0, 8.0] {
            avg.add(*v);
        }

        assert_eq!(avg.to_string(), "[2, 4]");
        assert_eq!(avg.last_raw_value(), Some(8.0));
    }

    #[test]
    fn empty_display() {
        let avg = AverageStatValue::new(3, StatValueKind::Cumulative, 3.0);

        assert_eq!(avg.to_string(), "[]");
        assert_eq!(avg.last_raw_value(), None);
    }
}
