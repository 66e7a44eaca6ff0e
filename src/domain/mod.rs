//! Domain types and DTOs

pub mod access;
pub mod admin;
pub mod people;

// Re-export commonly used types
pub use access::*;
pub use admin::*;
pub use people::*;
