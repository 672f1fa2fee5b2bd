//! firstboot: resumable first-boot onboarding for a fresh device.

pub mod account;
pub mod config;
pub mod error;
pub mod flow;
pub mod status;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;
