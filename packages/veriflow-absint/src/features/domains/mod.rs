//! Abstract Domains
//!
//! The domain contract (ports), the bounded disjunctive multi-state (domain),
//! and the concrete domain implementations (infrastructure):
//!
//! ```text
//! domains
//! ├── ports/            # AbstractState + AbstractDomain traits
//! ├── domain/           # MultiState, CallInfo renaming plans
//! └── infrastructure/   # interval, octagon, congruence, constprop, live_variables
//! ```
//!
//! Domains are interchangeable behind the `AbstractDomain` trait; the
//! fixpoint feature dispatches the closed `DomainKind` enum onto these
//! implementations.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{CallInfo, CallInfoCache, MultiState};
pub use infrastructure::{
    CongruenceDomain, CongruenceState, ConstPropDomain, ConstPropState, IntervalDomain,
    IntervalState, LiveVariablesDomain, LiveVariablesState, OctagonDomain, OctagonState,
};
pub use ports::{AbstractDomain, AbstractState, SubsetRelation};
