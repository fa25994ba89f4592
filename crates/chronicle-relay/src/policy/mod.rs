//! Event acceptance and the relay's reject chains.

mod acceptance;
mod gate;

pub use acceptance::{AcceptancePolicy, Admission, Counters, Decision, Origin, OwnerSet};
pub use gate::{
    ConnectionInfo, ConnectionRule, EventRule, FilterRule, NoComplexFilters, NoEmptyFilters,
    PolicyChain, RejectBase64Media,
};
