pub mod advisor;
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod planner;
pub mod store;
