//! Learning rate schedules for the embedding update

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum ScheduleType {
    Constant,
    /// Multiply by gamma every `step_size` iterations
    StepDecay,
    CosineAnnealing,
}

/// Pure mapping from iteration index to learning rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRateScheduler {
    schedule: ScheduleType,
    initial_lr: f64,
    min_lr: f64,
    step_size: usize,
    gamma: f64,
    total_steps: usize,
}

impl LearningRateScheduler {
    pub fn constant(lr: f64) -> Self {
        Self {
            schedule: ScheduleType::Constant,
            initial_lr: lr,
            min_lr: lr,
            step_size: 1,
            gamma: 1.0,
            total_steps: 1,
        }
    }

    pub fn step_decay(initial_lr: f64, step_size: usize, gamma: f64, min_lr: f64) -> Self {
        Self {
            schedule: ScheduleType::StepDecay,
            initial_lr,
            min_lr,
            step_size: step_size.max(1),
            gamma,
            total_steps: 1,
        }
    }

    pub fn cosine_annealing(initial_lr: f64, total_steps: usize, min_lr: f64) -> Self {
        Self {
            schedule: ScheduleType::CosineAnnealing,
            initial_lr,
            min_lr,
            step_size: 1,
            gamma: 1.0,
            total_steps: total_steps.max(1),
        }
    }

    /// Learning rate at the given iteration.
    pub fn step(&self, iteration: usize) -> f64 {
        let lr = match self.schedule {
            ScheduleType::Constant => self.initial_lr,
            ScheduleType::StepDecay => {
                let decays = (iteration / self.step_size) as i32;
                self.initial_lr * self.gamma.powi(decays)
            }
            ScheduleType::CosineAnnealing => {
                let progress = (iteration as f64 / self.total_steps as f64).min(1.0);
                self.min_lr
                    + 0.5 * (self.initial_lr - self.min_lr) * (1.0 + (std::f64::consts::PI * progress).cos())
            }
        };
        lr.max(self.min_lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant() {
        let s = LearningRateScheduler::constant(0.01);
        assert_relative_eq!(s.step(0), 0.01);
        assert_relative_eq!(s.step(1000), 0.01);
    }

    #[test]
    fn test_step_decay() {
        let s = LearningRateScheduler::step_decay(0.1, 10, 0.5, 0.001);
        assert_relative_eq!(s.step(0), 0.1);
        assert_relative_eq!(s.step(9), 0.1);
        assert_relative_eq!(s.step(10), 0.05);
        assert_relative_eq!(s.step(20), 0.025);
    }

    #[test]
    fn test_cosine_annealing_decreases() {
        let s = LearningRateScheduler::cosine_annealing(0.1, 100, 0.01);
        let (start, mid, end) = (s.step(0), s.step(50), s.step(100));
        assert!(start > mid && mid > end);
        assert!(end >= 0.01);
    }
}
