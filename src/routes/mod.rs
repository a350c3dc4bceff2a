//! HTTP route handlers
//!
//! Thin adapters only: parse the request, authenticate the caller, call
//! the service, map the result onto the JSON envelope. All invariants live
//! in the services.

pub mod auth_routes;
pub mod evaluations;
pub mod health;
pub mod helpers;
pub mod projects;
pub mod publications;
pub mod reports;
pub mod requests;
pub mod users;

pub use health::{health_check, version_info};
