//! Service layer modules for external integrations and the batch importer.

pub mod bio;
pub mod importer;
pub mod roster;
pub mod store;

pub use bio::BioClient;
pub use importer::{BatchImporter, DanglingRefPolicy};
pub use roster::RosterClient;
pub use store::PgPeopleStore;
