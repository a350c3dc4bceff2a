//! HTTP server for claustro

pub mod http;

pub use http::{run, AppState};
