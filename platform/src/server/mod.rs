//! HTTP listeners: the deployment API and the site router

pub mod handlers;
pub mod serve;
pub mod state;
