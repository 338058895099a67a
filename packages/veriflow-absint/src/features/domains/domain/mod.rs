//! Domain-layer models for the domains feature.

pub mod call_info;
pub mod multi_state;

pub use call_info::{CallInfo, CallInfoCache};
pub use multi_state::MultiState;
