//! Fixpoint infrastructure: loop detection, transition providers, and the
//! soundness debug helper.

pub mod debug_helper;
pub mod loop_detector;
pub mod transition_provider;

pub use debug_helper::DebugHelper;
pub use loop_detector::LoopDetector;
pub use transition_provider::{ScopedProvider, WholeProgramProvider};
