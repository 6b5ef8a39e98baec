//! Core types shared by every ironcell crate: error taxonomy,
//! configuration and the logging bootstrap.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EmulatorError, Result};
