//! Micropad CLI library
//!
//! Command-line front end over the Micropad session layer and BLE transport.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::MicropadApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
