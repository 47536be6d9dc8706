use serde::{Deserialize, Serialize};

use crate::stimulus::ResponseKey;

/// Which kind of trial block a phase runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Training,
    Testing,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Training => "training",
            BlockKind::Testing => "testing",
        }
    }
}

/// How a non-trial screen is left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A specific key confirms the screen
    Key(ResponseKey),
    /// Any key confirms the screen
    AnyKey,
    /// The screen leaves by itself after a delay
    Timed,
    /// Trials run until the block is complete
    BlockEnd,
}

/// Defines experiment phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;
    fn advance(&self) -> Advance;

    /// The block this phase runs, if it is a trial phase
    fn block_kind(&self) -> Option<BlockKind> {
        None
    }

    /// Phase entered when a gated block misses its accuracy threshold
    fn retry(&self) -> Option<Self> {
        None
    }

    fn is_block(&self) -> bool {
        self.block_kind().is_some()
    }

    fn is_training(&self) -> bool {
        self.block_kind() == Some(BlockKind::Training)
    }

    fn is_testing(&self) -> bool {
        self.block_kind() == Some(BlockKind::Testing)
    }

    fn is_volume_adjust(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        self.next().is_none()
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskPhase {
    #[default]
    Consent,
    Instructions,
    Training,
    TrainingFailed,
    VolumeAdjust,
    TestingInstructions,
    Testing,
    Complete,
}

impl Phase for TaskPhase {
    fn next(&self) -> Option<Self> {
        use TaskPhase::*;
        Some(match self {
            Consent => Instructions,
            Instructions => Training,
            Training => VolumeAdjust,
            TrainingFailed => Training,
            VolumeAdjust => TestingInstructions,
            TestingInstructions => Testing,
            Testing => Complete,
            Complete => return None,
        })
    }

    fn advance(&self) -> Advance {
        use TaskPhase::*;
        match self {
            Consent => Advance::Key(ResponseKey::Enter),
            Instructions | VolumeAdjust | TestingInstructions => Advance::Key(ResponseKey::Space),
            Training | Testing => Advance::BlockEnd,
            TrainingFailed => Advance::Timed,
            Complete => Advance::AnyKey,
        }
    }

    fn block_kind(&self) -> Option<BlockKind> {
        match self {
            TaskPhase::Training => Some(BlockKind::Training),
            TaskPhase::Testing => Some(BlockKind::Testing),
            _ => None,
        }
    }

    fn retry(&self) -> Option<Self> {
        match self {
            TaskPhase::Training => Some(TaskPhase::TrainingFailed),
            _ => None,
        }
    }

    fn is_volume_adjust(&self) -> bool {
        matches!(self, TaskPhase::VolumeAdjust)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = TaskPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                TaskPhase::Consent,
                TaskPhase::Instructions,
                TaskPhase::Training,
                TaskPhase::VolumeAdjust,
                TaskPhase::TestingInstructions,
                TaskPhase::Testing,
                TaskPhase::Complete,
            ]
        );
    }

    #[test]
    fn test_training_retry_loops_back() {
        let failed = TaskPhase::Training.retry().unwrap();
        assert_eq!(failed, TaskPhase::TrainingFailed);
        assert_eq!(failed.advance(), Advance::Timed);
        assert_eq!(failed.next(), Some(TaskPhase::Training));
        assert_eq!(TaskPhase::Testing.retry(), None);
    }

    #[test]
    fn test_block_kinds() {
        assert!(TaskPhase::Training.is_training());
        assert!(TaskPhase::Testing.is_testing());
        assert!(!TaskPhase::TrainingFailed.is_block());
        assert_eq!(TaskPhase::Instructions.block_kind(), None);
    }

    #[test]
    fn test_screen_keys() {
        assert_eq!(
            TaskPhase::Consent.advance(),
            Advance::Key(ResponseKey::Enter)
        );
        assert_eq!(
            TaskPhase::TestingInstructions.advance(),
            Advance::Key(ResponseKey::Space)
        );
        assert_eq!(TaskPhase::Complete.advance(), Advance::AnyKey);
        assert!(TaskPhase::Complete.is_complete());
    }

    #[test]
    fn test_block_kind_serializes_lowercase() {
        let json = serde_json::to_string(&BlockKind::Training).unwrap();
        assert_eq!(json, "\"training\"");
        assert_eq!(BlockKind::Testing.as_str(), "testing");
    }
}
