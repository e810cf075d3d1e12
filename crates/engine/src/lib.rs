//! Visual DM Engine library.
//!
//! Server-side arc progression and quest integration.
//!
//! ## Structure
//!
//! - `use_cases/` - Arc lifecycle, generation, quest matching and analytics
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// End-to-end tests through the HTTP router with in-memory SQLite.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
