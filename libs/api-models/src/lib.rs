//! Request and response bodies of the sitemesh HTTP API

pub mod models;

pub use models::*;
