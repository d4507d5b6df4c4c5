//! sitemesh
//!
//! Builds static sites from source repositories in isolated jobs, streams
//! their build logs to browsers over WebSockets and routes per-deployment
//! hostnames to the uploaded artifacts.

pub mod app;
pub mod bus;
pub mod compute;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod relay;
pub mod router;
pub mod server;
pub mod storage;
pub mod store;
pub mod tail;
pub mod utils;
