use std::num::NonZeroUsize;

use crate::config::StudentDataConfig;

/// The loop bounds a trainable unit runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    pub epochs: usize,
    pub train_step: usize,
    pub valid_step: usize,
    pub test_step: usize,
    pub valid: ValidSchedule,
}

impl LoopPlan {
    pub fn from_student(cfg: &StudentDataConfig, valid_gap: NonZeroUsize) -> Self {
        Self {
            epochs: cfg.epochs,
            train_step: cfg.train_step,
            valid_step: cfg.valid_step,
            test_step: cfg.test_step,
            valid: ValidSchedule::new(valid_gap),
        }
    }

    /// Train batches the whole run consumes.
    pub fn train_batches(&self) -> usize {
        self.epochs * self.train_step
    }

    /// Valid batches the whole run consumes.
    pub fn valid_batches(&self) -> usize {
        self.epochs * self.valid.passes_per_epoch(self.train_step) * self.valid_step
    }

    pub fn test_batches(&self) -> usize {
        self.test_step
    }
}

/// Defines when to run a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidSchedule {
    pub valid_gap: NonZeroUsize,
}

impl ValidSchedule {
    pub fn new(valid_gap: NonZeroUsize) -> Self {
        Self { valid_gap }
    }

    /// Returns true if a validation pass runs before train step `step` of an epoch.
    #[inline]
    pub fn should_validate(&self, step: usize) -> bool {
        step % self.valid_gap.get() == 0
    }

    /// Returns the amount of validation passes in an epoch of `train_step` steps.
    #[inline]
    pub fn passes_per_epoch(&self, train_step: usize) -> usize {
        train_step.div_ceil(self.valid_gap.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gap(k: usize) -> NonZeroUsize {
        NonZeroUsize::new(k).unwrap()
    }

    #[test]
    fn valid_schedule() {
        let s = ValidSchedule::new(gap(3));
        assert!(s.should_validate(0));
        assert!(!s.should_validate(1));
        assert!(!s.should_validate(2));
        assert!(s.should_validate(3));
        assert!(s.should_validate(6));
        assert!(!s.should_validate(7));
    }

    #[test]
    fn passes_per_epoch_rounds_up() {
        let s = ValidSchedule::new(gap(3));
        assert_eq!(s.passes_per_epoch(1), 1);
        assert_eq!(s.passes_per_epoch(3), 1);
        assert_eq!(s.passes_per_epoch(4), 2);
        assert_eq!(s.passes_per_epoch(7), 3);
    }

    #[test]
    fn plan_counts_batches() {
        let plan = LoopPlan {
            epochs: 2,
            train_step: 5,
            valid_step: 2,
            test_step: 3,
            valid: ValidSchedule::new(gap(2)),
        };

        assert_eq!(plan.train_batches(), 10);
        assert_eq!(plan.valid_batches(), 2 * 3 * 2);
        assert_eq!(plan.test_batches(), 3);
    }
}
