//! Frame sources: synthetic generation and raw-file replay.
pub mod mock;
pub mod replay;

pub use mock::MockFrameSource;
pub use replay::ReplayFrameSource;
