//! avdkit Core - shared configuration and environment
//!
//! This crate provides the pieces every other avdkit crate depends on:
//! the TOML-backed application configuration, the read-only environment
//! surface used by tool discovery, and the core error type.

pub mod config;
pub mod env;
pub mod error;

pub use config::{AppConfig, EmulatorConfig, LoggingConfig};
pub use env::{EnvSource, MapEnv, SystemEnv};
pub use error::{CoreError, Result};

/// avdkit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "avdkit";

/// Default emulator console port
pub const DEFAULT_CONSOLE_PORT: u16 = 5554;
