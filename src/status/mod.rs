//! Persisted onboarding status: the stage pointer and the data collected so far.

pub mod state;
pub mod store;

pub use state::{FlowStatus, Stage};
pub use store::StatusStore;
