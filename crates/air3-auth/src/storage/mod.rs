//! Profile storage.
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `air3-auth-mongo` - MongoDB `users` collection
//!
//! [`memory::InMemoryProfileStore`] backs tests and local runs.

pub mod memory;
pub mod profile;

pub use memory::InMemoryProfileStore;
pub use profile::{CreateOutcome, ProfileStore, UserProfile, derive_username};
