//! Learning-rate schedules over training epochs.

use serde::{Deserialize, Serialize};

/// Learning-rate scheduling strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LearningRateSchedule {
    /// Constant learning rate.
    Constant(f64),
    /// Linear interpolation between `(epoch, rate)` knots, constant outside
    /// them. Knots must be sorted by epoch.
    PiecewiseLinear(Vec<(usize, f64)>),
}

impl Default for LearningRateSchedule {
    fn default() -> Self {
        Self::PiecewiseLinear(vec![(0, 2e-4), (100, 1e-4), (200, 1e-5), (300, 1e-6)])
    }
}

impl LearningRateSchedule {
    /// Create a constant learning rate schedule.
    pub fn constant(lr: f64) -> Self {
        Self::Constant(lr)
    }

    /// Create a piecewise-linear schedule.
    pub fn piecewise_linear(knots: Vec<(usize, f64)>) -> Self {
        Self::PiecewiseLinear(knots)
    }

    /// Get the learning rate for a given epoch.
    pub fn get_learning_rate(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant(lr) => *lr,
            Self::PiecewiseLinear(knots) => {
                let (Some(first), Some(last)) = (knots.first(), knots.last()) else {
                    return 0.0;
                };
                if epoch <= first.0 {
                    return first.1;
                }
                if epoch >= last.0 {
                    return last.1;
                }
                for pair in knots.windows(2) {
                    let ((e0, lr0), (e1, lr1)) = (pair[0], pair[1]);
                    if epoch >= e0 && epoch < e1 {
                        let t = (epoch - e0) as f64 / (e1 - e0) as f64;
                        return lr0 + (lr1 - lr0) * t;
                    }
                }
                last.1
            }
        }
    }

    /// Get the initial learning rate.
    pub fn initial_lr(&self) -> f64 {
        self.get_learning_rate(0)
    }

    /// Knots must be non-empty, strictly increasing in epoch and non-negative.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Constant(lr) => lr.is_finite() && *lr >= 0.0,
            Self::PiecewiseLinear(knots) => {
                !knots.is_empty()
                    && knots.windows(2).all(|w| w[0].0 < w[1].0)
                    && knots.iter().all(|(_, lr)| lr.is_finite() && *lr >= 0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_constant_schedule() {
        let schedule = LearningRateSchedule::constant(0.01);
        assert_eq!(schedule.get_learning_rate(0), 0.01);
        assert_eq!(schedule.get_learning_rate(100), 0.01);
    }

    #[test]
    fn test_default_knots() {
        let schedule = LearningRateSchedule::default();
        assert_eq!(schedule.initial_lr(), 2e-4);
        assert!(close(schedule.get_learning_rate(50), 1.5e-4));
        assert!(close(schedule.get_learning_rate(100), 1e-4));
        assert!(close(schedule.get_learning_rate(150), 5.5e-5));
        assert!(close(schedule.get_learning_rate(300), 1e-6));
        assert!(close(schedule.get_learning_rate(499), 1e-6));
    }

    #[test]
    fn test_before_first_knot() {
        let schedule = LearningRateSchedule::piecewise_linear(vec![(10, 1.0), (20, 0.0)]);
        assert_eq!(schedule.get_learning_rate(0), 1.0);
        assert!(close(schedule.get_learning_rate(15), 0.5));
    }

    #[test]
    fn test_validation() {
        assert!(LearningRateSchedule::default().is_valid());
        assert!(!LearningRateSchedule::piecewise_linear(vec![]).is_valid());
        assert!(!LearningRateSchedule::piecewise_linear(vec![(5, 1.0), (5, 0.5)]).is_valid());
        assert!(!LearningRateSchedule::constant(f64::NAN).is_valid());
    }
}
