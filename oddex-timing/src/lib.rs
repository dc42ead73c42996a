pub mod frame_clock;
pub mod timer;

pub use frame_clock::frames_for;
pub use timer::{FrameStats, HighPrecisionTimer, Timer};
