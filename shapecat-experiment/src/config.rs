use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExperimentError, Result};

/// Task parameters for the training and testing blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub training_trials: usize,
    pub testing_trials: usize,
    /// Training repeats until a block reaches this accuracy
    pub accuracy_threshold: f64,
    pub fixation_ms: u64,
    pub response_window_ms: u64,
    pub feedback_ms: u64,
    pub training_failed_ms: u64,
    /// Chance of a noise cue on each testing trial
    pub noise_probability: f64,
    /// Starting cue volume on the adjustment screen, 0.0 to 1.0
    pub noise_volume: f32,
    pub volume_step: f32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            training_trials: 10,
            testing_trials: 80,
            accuracy_threshold: 0.7,
            fixation_ms: 500,
            response_window_ms: 2000,
            feedback_ms: 1000,
            training_failed_ms: 3000,
            noise_probability: 0.5,
            noise_volume: 0.5,
            volume_step: 0.05,
        }
    }
}

impl ExperimentConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.training_trials == 0 {
            return Err(ExperimentError::config(
                "training_trials must be greater than 0",
            ));
        }
        if self.testing_trials == 0 {
            return Err(ExperimentError::config(
                "testing_trials must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(ExperimentError::config(format!(
                "accuracy_threshold ({}) must be within 0.0..=1.0",
                self.accuracy_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.noise_probability) {
            return Err(ExperimentError::config(format!(
                "noise_probability ({}) must be within 0.0..=1.0",
                self.noise_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.noise_volume) {
            return Err(ExperimentError::config(format!(
                "noise_volume ({}) must be within 0.0..=1.0",
                self.noise_volume
            )));
        }
        if self.response_window_ms == 0 {
            return Err(ExperimentError::config(
                "response_window_ms must be greater than 0",
            ));
        }
        if self.volume_step <= 0.0 || self.volume_step > 1.0 {
            return Err(ExperimentError::config(
                "volume_step must be within (0.0, 1.0]",
            ));
        }
        Ok(())
    }

    pub fn block_size(&self, testing: bool) -> usize {
        if testing {
            self.testing_trials
        } else {
            self.training_trials
        }
    }

    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_task() {
        let config = ExperimentConfig::default();
        assert_eq!(config.training_trials, 10);
        assert_eq!(config.testing_trials, 80);
        assert_eq!(config.accuracy_threshold, 0.7);
        assert_eq!(config.fixation_ms, 500);
        assert_eq!(config.response_window(), Duration::from_secs(2));
        assert_eq!(config.feedback_ms, 1000);
        assert_eq!(config.noise_probability, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_block_rejected() {
        let config = ExperimentConfig {
            training_trials: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("training_trials"));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = ExperimentConfig {
            accuracy_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("accuracy_threshold"));
    }

    #[test]
    fn test_probability_out_of_range() {
        let config = ExperimentConfig {
            noise_probability: -0.1,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("noise_probability"));
    }

    #[test]
    fn test_zero_response_window_rejected() {
        let config = ExperimentConfig {
            response_window_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_block_size() {
        let config = ExperimentConfig::default();
        assert_eq!(config.block_size(false), 10);
        assert_eq!(config.block_size(true), 80);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: ExperimentConfig = serde_json::from_str(r#"{"testing_trials": 20}"#).unwrap();
        assert_eq!(config.testing_trials, 20);
        assert_eq!(config.training_trials, 10);
    }
}
