//! Core types: errors, configuration, path keys, logging.

pub mod config;
pub mod errors;
pub mod logging;
pub mod paths;
