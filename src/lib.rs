// hub_database - multi-entity CRUD backend with a generic filter-criteria
// query engine, mirrored many-to-many associations and engagement-driven
// denormalized counters.

// Core query machinery: field specs, criteria, compiler, executor
pub mod core;

// Entity catalogue and field registry
pub mod entities;

// Storage seam and SQLite backend
pub mod storage;

// Writers: CRUD, relationship consistency, engagement aggregation
pub mod services;

// HTTP surface
pub mod api;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
