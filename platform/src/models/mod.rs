//! Data model shared by the dispatcher, executor, relay and router

pub mod deployment;
pub mod event;
