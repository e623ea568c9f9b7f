// Race orchestration — per-entity drive sessions, winner coordination, observable state.

pub mod coordinator;
pub mod session;
pub mod store;
