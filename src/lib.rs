//! claustro - REST backend for institutional research management
//!
//! Projects, publications, evaluations, requests and users behind a
//! role/ownership authorization policy, with soft-delete lifecycles and
//! CSV report exports. MongoDB persistence, hyper HTTP adapter.

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;
pub mod update;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ClaustroError, Result};
