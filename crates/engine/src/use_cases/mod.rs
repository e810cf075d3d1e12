//! Use cases - User story orchestration.
//!
//! Use cases orchestrate the domain aggregates through repository ports.

pub mod arc;

pub use arc::ArcUseCases;
