//! Configuration module for the gateway.
//!
//! Handles loading and validating configuration from TOML files.

mod settings;

pub use settings::*;
