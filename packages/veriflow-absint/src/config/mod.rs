/*
 * Analysis Configuration
 *
 * The configuration surface consumed by the fixpoint feature: domain and
 * widening selection, disjunction cap, deadline, library mode. Loading this
 * from files/CLI is a collaborator's job; this module only defines the types
 * and the fatal-on-unknown-identifier parsing.
 */

mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Known abstract domains, dispatched as a closed enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    /// Per-variable `[lo, hi]` bounds, booleans three-valued
    Interval,

    /// Weakly relational `±x ± y <= c` constraints (difference bound matrix)
    Octagon,

    /// Congruence closure over a term graph, with disequalities
    Equality,

    /// Flat constant lattice per variable
    Dataflow,

    /// Backward liveness (join-only, forces max_parallel_states = 1)
    LiveVariables,
}

impl DomainKind {
    pub const ALL: [DomainKind; 5] = [
        DomainKind::Interval,
        DomainKind::Octagon,
        DomainKind::Equality,
        DomainKind::Dataflow,
        DomainKind::LiveVariables,
    ];

    pub fn id(self) -> &'static str {
        match self {
            DomainKind::Interval => "interval",
            DomainKind::Octagon => "octagon",
            DomainKind::Equality => "equality",
            DomainKind::Dataflow => "dataflow",
            DomainKind::LiveVariables => "live-variables",
        }
    }

    /// Is this a backward analysis?
    pub fn is_backward(self) -> bool {
        matches!(self, DomainKind::LiveVariables)
    }
}

impl FromStr for DomainKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainKind::ALL
            .into_iter()
            .find(|k| k.id() == s)
            .ok_or_else(|| ConfigError::UnknownDomain(s.to_string()))
    }
}

/// Widening operator variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WideningKind {
    /// Componentwise top-out of unstable bounds
    Simple,

    /// Snap unstable bounds to the nearest syntactic program constant
    LiteralGuided,

    /// Snap unstable bounds to the next power-of-two-scaled threshold
    ExponentialThreshold,
}

impl WideningKind {
    pub const ALL: [WideningKind; 3] = [
        WideningKind::Simple,
        WideningKind::LiteralGuided,
        WideningKind::ExponentialThreshold,
    ];

    pub fn id(self) -> &'static str {
        match self {
            WideningKind::Simple => "simple",
            WideningKind::LiteralGuided => "literal-guided",
            WideningKind::ExponentialThreshold => "exponential-threshold",
        }
    }
}

impl FromStr for WideningKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WideningKind::ALL
            .into_iter()
            .find(|k| k.id() == s)
            .ok_or_else(|| ConfigError::UnknownWidening(s.to_string()))
    }
}

/// Settings for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Abstract domain to run
    pub domain: DomainKind,

    /// Disjunction cap per location (must be >= 1)
    pub max_parallel_states: usize,

    /// Widening operator variant
    pub widening: WideningKind,

    /// Wall-clock budget; `None` means unbounded
    pub timeout: Option<Duration>,

    /// Seed every procedure entry (library) instead of `main` only
    pub library_mode: bool,

    /// Cross-check every post-state against the Hoare oracle
    pub validate_posts: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            domain: DomainKind::Interval,
            max_parallel_states: 2,
            widening: WideningKind::Simple,
            timeout: None,
            library_mode: false,
            validate_posts: false,
        }
    }
}

impl AnalysisSettings {
    pub fn new(domain: DomainKind) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    pub fn with_max_parallel_states(mut self, max: usize) -> Self {
        self.max_parallel_states = max;
        self
    }

    pub fn with_widening(mut self, widening: WideningKind) -> Self {
        self.widening = widening;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_library_mode(mut self, library_mode: bool) -> Self {
        self.library_mode = library_mode;
        self
    }

    pub fn with_validation(mut self, validate_posts: bool) -> Self {
        self.validate_posts = validate_posts;
        self
    }

    /// Reject settings no engine can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_states == 0 {
            return Err(ConfigError::InvalidMaxParallelStates(
                self.max_parallel_states,
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation handle, polled once per worklist pop
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    deadline: Option<Instant>,
}

impl Deadline {
    /// A deadline that never fires
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    /// Fire after `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        match settings.timeout {
            Some(budget) => Self::after(budget),
            None => Self::unbounded(),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_ids_round_trip() {
        for kind in DomainKind::ALL {
            assert_eq!(kind.id().parse::<DomainKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_domain_is_fatal() {
        let err = "polyhedra".parse::<DomainKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDomain(name) if name == "polyhedra"));
    }

    #[test]
    fn test_unknown_widening_is_fatal() {
        let err = "delayed".parse::<WideningKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownWidening(name) if name == "delayed"));
    }

    #[test]
    fn test_zero_parallel_states_rejected() {
        let settings = AnalysisSettings::default().with_max_parallel_states(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unbounded_deadline_never_expires() {
        assert!(!Deadline::unbounded().is_expired());
    }

    #[test]
    fn test_zero_budget_deadline_expires() {
        assert!(Deadline::after(Duration::from_secs(0)).is_expired());
    }
}
