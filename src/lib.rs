// ABOUTME: Root module for gather - completion coordination for async operations.
// ABOUTME: Re-exports the coordinator, payload and configuration types.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod payload;
pub mod prelude;

pub use config::BundleConfig;
pub use coordinator::Coordinator;
pub use error::GatherError;
