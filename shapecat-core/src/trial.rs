use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::phase::BlockKind;
use crate::stimulus::{ResponseKey, Shape};

/// Trial state machine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fixation,
    /// Stimulus on screen, response window open
    Response,
    Feedback,
    Complete,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub phase: BlockKind,
    /// 1-based attempt number within the phase
    pub block: u32,
    /// 1-based position within the block
    pub trial: u32,
    pub stimulus: Shape,
    pub correct_key: ResponseKey,
    pub response: Option<ResponseKey>,
    pub correct: bool,
    pub reaction_time_ns: Option<u64>,
    pub with_noise: bool,
}

impl TrialRecord {
    pub fn reaction_time(&self) -> Option<Duration> {
        self.reaction_time_ns.map(Duration::from_nanos)
    }

    pub fn reaction_time_secs(&self) -> Option<f64> {
        self.reaction_time_ns.map(|ns| ns as f64 / 1e9)
    }
}

/// Outcome of one block of trials
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResult {
    pub kind: BlockKind,
    pub block: u32,
    pub accuracy: f64,
    pub trials: Vec<TrialRecord>,
}

impl BlockResult {
    pub fn from_trials(kind: BlockKind, block: u32, trials: Vec<TrialRecord>) -> Self {
        let accuracy = accuracy_of(&trials);
        Self {
            kind,
            block,
            accuracy,
            trials,
        }
    }

    pub fn correct_count(&self) -> usize {
        self.trials.iter().filter(|t| t.correct).count()
    }

    pub fn passed(&self, threshold: f64) -> bool {
        self.accuracy >= threshold
    }
}

fn accuracy_of<'a>(trials: impl IntoIterator<Item = &'a TrialRecord>) -> f64 {
    let (n, correct) = trials
        .into_iter()
        .fold((0usize, 0usize), |(n, c), t| (n + 1, c + usize::from(t.correct)));
    if n == 0 { 0.0 } else { correct as f64 / n as f64 }
}

/// Participant details collected at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant: String,
    pub session: String,
    pub gender: Option<String>,
    pub age: Option<String>,
}

/// Everything written out at the end of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub info: ParticipantInfo,
    pub experiment: String,
    pub date: String,
    pub completed: bool,
    pub noise_volume: f32,
    pub trials: Vec<TrialRecord>,
}

impl SessionData {
    pub fn new(info: ParticipantInfo, experiment: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            info,
            experiment: experiment.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    pub fn push_block(&mut self, block: &BlockResult) {
        self.trials.extend(block.trials.iter().cloned());
    }

    pub fn trials_in(&self, kind: BlockKind) -> impl Iterator<Item = &TrialRecord> {
        self.trials.iter().filter(move |t| t.phase == kind)
    }

    pub fn accuracy(&self, kind: BlockKind) -> f64 {
        accuracy_of(self.trials_in(kind))
    }

    /// Mean reaction time in milliseconds over trials with a response
    pub fn mean_rt_ms(&self, kind: BlockKind) -> Option<f64> {
        let times: Vec<f64> = self
            .trials_in(kind)
            .filter_map(|t| t.reaction_time_ns)
            .map(|ns| ns as f64 / 1_000_000.0)
            .collect();
        if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: BlockKind, correct: bool, rt_ms: Option<u64>) -> TrialRecord {
        TrialRecord {
            phase: kind,
            block: 1,
            trial: 1,
            stimulus: Shape::Square,
            correct_key: ResponseKey::Z,
            response: rt_ms.map(|_| if correct { ResponseKey::Z } else { ResponseKey::M }),
            correct,
            reaction_time_ns: rt_ms.map(|ms| ms * 1_000_000),
            with_noise: false,
        }
    }

    #[test]
    fn test_block_accuracy() {
        let trials: Vec<_> = (0..10)
            .map(|i| record(BlockKind::Training, i < 8, Some(400)))
            .collect();
        let block = BlockResult::from_trials(BlockKind::Training, 1, trials);
        assert_eq!(block.correct_count(), 8);
        assert!((block.accuracy - 0.8).abs() < 1e-9);
        assert!(block.passed(0.7));
    }

    #[test]
    fn test_block_below_threshold() {
        let trials: Vec<_> = (0..10)
            .map(|i| record(BlockKind::Training, i < 6, Some(400)))
            .collect();
        let block = BlockResult::from_trials(BlockKind::Training, 1, trials);
        assert!(!block.passed(0.7));
    }

    #[test]
    fn test_exact_threshold_passes() {
        let trials: Vec<_> = (0..10)
            .map(|i| record(BlockKind::Training, i < 7, Some(400)))
            .collect();
        assert!(BlockResult::from_trials(BlockKind::Training, 1, trials).passed(0.7));
    }

    #[test]
    fn test_empty_block_accuracy_is_zero() {
        let block = BlockResult::from_trials(BlockKind::Testing, 1, Vec::new());
        assert_eq!(block.accuracy, 0.0);
    }

    #[test]
    fn test_session_concatenates_blocks() {
        let mut session = SessionData::new(ParticipantInfo::default(), "task", "2024-01-01");
        let a = BlockResult::from_trials(
            BlockKind::Training,
            1,
            vec![record(BlockKind::Training, false, None)],
        );
        let b = BlockResult::from_trials(
            BlockKind::Testing,
            1,
            vec![record(BlockKind::Testing, true, Some(300))],
        );
        session.push_block(&a);
        session.push_block(&b);
        assert_eq!(session.trials.len(), 2);
        assert_eq!(session.trials[0].phase, BlockKind::Training);
        assert_eq!(session.trials_in(BlockKind::Testing).count(), 1);
        assert_eq!(session.accuracy(BlockKind::Testing), 1.0);
    }

    #[test]
    fn test_mean_rt_skips_missing() {
        let mut session = SessionData::default();
        session.trials = vec![
            record(BlockKind::Testing, true, Some(300)),
            record(BlockKind::Testing, true, Some(500)),
            record(BlockKind::Testing, false, None),
        ];
        assert_eq!(session.mean_rt_ms(BlockKind::Testing), Some(400.0));
        assert_eq!(session.mean_rt_ms(BlockKind::Training), None);
    }

    #[test]
    fn test_reaction_time_conversions() {
        let r = record(BlockKind::Testing, true, Some(250));
        assert_eq!(r.reaction_time(), Some(Duration::from_millis(250)));
        assert_eq!(r.reaction_time_secs(), Some(0.25));
        assert_eq!(record(BlockKind::Testing, false, None).reaction_time(), None);
    }
}
