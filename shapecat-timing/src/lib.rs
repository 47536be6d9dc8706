pub mod timer;

pub use timer::{FrameTimingStats, HighPrecisionTimer, Timer};
