//! Benchmark counters for one engine run.

use serde::{Deserialize, Serialize};

/// Counter set accumulated by the engine
///
/// Plain data: callers serialize or diff these between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisBenchmark {
    /// Worklist pops
    pub iterations: u64,

    /// Single-state post operator applications
    pub post_applications: u64,

    /// Multi-state merges at join points
    pub merges: u64,

    /// Widening applications at loop heads
    pub widenings: u64,

    /// Location states that actually changed
    pub locations_updated: u64,

    /// Largest pending-edge backlog observed
    pub peak_worklist: usize,

    /// Counterexamples recorded at error locations
    pub counterexamples_recorded: u64,

    /// Post-states the debug oracle rejected
    pub unsound_posts: u64,
}

impl AnalysisBenchmark {
    pub fn observe_worklist_len(&mut self, len: usize) {
        if len > self.peak_worklist {
            self.peak_worklist = len;
        }
    }
}
