pub mod phase;
pub mod stimulus;
pub mod trial;

pub use phase::{Advance, BlockKind, Phase, TaskPhase};
pub use stimulus::{ResponseKey, Shape, Stimulus};
pub use trial::{BlockResult, ParticipantInfo, SessionData, TrialRecord, TrialState};
