use shapecat_core::{BlockKind, ResponseKey, Shape, Stimulus, TrialRecord, TrialState};

use crate::config::ExperimentConfig;

/// A trial in progress
#[derive(Debug, Clone)]
pub struct Trial<T> {
    pub kind: BlockKind,
    pub block: u32,
    pub index: u32,
    pub stimulus: Shape,
    pub with_noise: bool,
    pub durations: TrialDurations,
    pub timestamps: TrialTimestamps<T>,
    pub response: Option<ResponseKey>,
    pub state: TrialState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialDurations {
    pub fixation_ms: u64,
    pub response_window_ms: u64,
    pub feedback_ms: u64,
}

impl From<&ExperimentConfig> for TrialDurations {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            fixation_ms: config.fixation_ms,
            response_window_ms: config.response_window_ms,
            feedback_ms: config.feedback_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialTimestamps<T> {
    pub fixation_start: T,
    pub stimulus_onset: Option<T>,
    pub response: Option<T>,
    pub feedback_start: Option<T>,
}

impl Trial<u64> {
    pub fn is_correct(&self) -> bool {
        self.response == Some(self.stimulus.correct_key())
    }

    /// True once the stimulus has been presented and the window has run out
    pub fn window_elapsed(&self, now: u64) -> bool {
        let window_ns = self.durations.response_window_ms * 1_000_000;
        self.timestamps
            .stimulus_onset
            .is_some_and(|onset| now.saturating_sub(onset) >= window_ns)
    }

    pub fn reaction_time_ns(&self) -> Option<u64> {
        let onset = self.timestamps.stimulus_onset?;
        self.timestamps
            .response
            .map(|r| r.saturating_sub(onset))
    }

    /// Freezes the trial into its record
    pub fn to_record(&self) -> TrialRecord {
        TrialRecord {
            phase: self.kind,
            block: self.block,
            trial: self.index,
            stimulus: self.stimulus,
            correct_key: self.stimulus.correct_key(),
            response: self.response,
            correct: self.is_correct(),
            reaction_time_ns: self.reaction_time_ns(),
            with_noise: self.with_noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(stimulus: Shape) -> Trial<u64> {
        Trial {
            kind: BlockKind::Testing,
            block: 1,
            index: 3,
            stimulus,
            with_noise: true,
            durations: TrialDurations::from(&ExperimentConfig::default()),
            timestamps: TrialTimestamps {
                fixation_start: 0,
                stimulus_onset: Some(500_000_000),
                response: None,
                feedback_start: None,
            },
            response: None,
            state: TrialState::Response,
        }
    }

    #[test]
    fn test_correct_response_record() {
        let mut t = trial(Shape::Circle);
        t.response = Some(ResponseKey::M);
        t.timestamps.response = Some(850_000_000);
        let record = t.to_record();
        assert!(record.correct);
        assert_eq!(record.correct_key, ResponseKey::M);
        assert_eq!(record.reaction_time_ns, Some(350_000_000));
        assert_eq!(record.trial, 3);
        assert!(record.with_noise);
    }

    #[test]
    fn test_wrong_key_is_incorrect_with_rt() {
        let mut t = trial(Shape::Square);
        t.response = Some(ResponseKey::M);
        t.timestamps.response = Some(900_000_000);
        let record = t.to_record();
        assert!(!record.correct);
        assert_eq!(record.reaction_time_ns, Some(400_000_000));
    }

    #[test]
    fn test_no_response_has_no_rt() {
        let record = trial(Shape::Square).to_record();
        assert!(!record.correct);
        assert_eq!(record.response, None);
        assert_eq!(record.reaction_time_ns, None);
    }

    #[test]
    fn test_window_runs_from_onset() {
        let mut t = trial(Shape::Circle);
        assert!(!t.window_elapsed(2_499_999_999));
        assert!(t.window_elapsed(2_500_000_000));
        t.timestamps.stimulus_onset = None;
        assert!(!t.window_elapsed(u64::MAX));
    }

    #[test]
    fn test_durations_from_config() {
        let d = TrialDurations::from(&ExperimentConfig::default());
        assert_eq!(d.fixation_ms, 500);
        assert_eq!(d.response_window_ms, 2000);
        assert_eq!(d.feedback_ms, 1000);
    }
}
