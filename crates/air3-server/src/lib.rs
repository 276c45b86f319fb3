pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use observability::init_tracing;
pub use server::{Air3Server, ServerBuilder, build_app};
