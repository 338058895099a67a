//! Concrete abstract domains.
//!
//! Each file implements the `AbstractDomain` contract for one domain. The
//! interval domain is the reference implementation and carries the three
//! widening policies; the others follow its structure.

pub mod congruence;
pub mod constprop;
pub mod interval;
pub mod live_variables;
pub mod octagon;

pub use congruence::{CongruenceDomain, CongruenceState};
pub use constprop::{ConstPropDomain, ConstPropState};
pub use interval::{Bound, Interval, IntervalDomain, IntervalState, Tvb};
pub use live_variables::{LiveVariablesDomain, LiveVariablesState};
pub use octagon::{OctagonDomain, OctagonState};
