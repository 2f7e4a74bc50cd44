//! Shared, versioned, per-field-locked context the cooperating agents read
//! and write without stepping on each other: project structure (Context
//! agent), security/compliance findings, and retrieval summaries.

mod error;
mod persistence;
mod shared;
mod versioned;

pub use error::ContextError;
pub use persistence::{load_project_structure, save_project_structure};
pub use shared::{ContextSnapshot, SharedContext};
pub use versioned::{StateVersion, VersionedState};
