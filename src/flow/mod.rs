//! The first-boot flow: stage handlers and the controller that sequences them.

pub mod controller;
pub mod params;
pub mod prompt;
pub mod scope;
pub mod stages;

pub use controller::FlowController;
pub use params::FlowParams;
pub use stages::{AfterCommit, StageContext, StageOutcome};
