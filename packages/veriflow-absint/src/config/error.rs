//! Configuration error types

use thiserror::Error;

/// Configuration error type
///
/// Unknown identifiers are fatal at construction time; there is no silent
/// fallback to a default domain or widening.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown domain identifier
    #[error("Unknown abstract domain '{0}'. Valid domains: interval, octagon, equality, dataflow, live-variables")]
    UnknownDomain(String),

    /// Unknown widening identifier
    #[error("Unknown widening operator '{0}'. Valid operators: simple, literal-guided, exponential-threshold")]
    UnknownWidening(String),

    /// Disjunction cap must admit at least one state
    #[error("max_parallel_states must be >= 1, got {0}")]
    InvalidMaxParallelStates(usize),
}
