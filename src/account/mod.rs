//! OS account provisioning.

pub mod database;
pub mod provisioner;
pub mod unique;

pub use database::{
    AccountDatabase, FileAccountDatabase, GroupRecord, NssAccountDatabase, UserRecord,
};
pub use provisioner::Provisioner;
