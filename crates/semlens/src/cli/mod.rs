//! Command implementations for the `semlens` binary.

pub mod batch;
pub mod check;
pub mod config;
pub mod interactive;
pub mod models;
pub mod report;
pub mod types;
