//! avdkit - Android Virtual Device management
//!
//! Finds the Android SDK command-line tools, parses `avdmanager list`
//! output into typed records and drives virtual devices through their
//! lifecycle.
//!
//! ## Architecture
//!
//! avdkit is organized into specialized crates:
//!
//! - `avdkit-core`: configuration, environment access and shared errors
//! - `avdkit-toolchain`: locating `adb`, `emulator` and `avdmanager`
//! - `avdkit-emulator-bridge`: record parsing, the AVD catalog and lifecycle control

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;

// Re-export main components for library usage
pub use avdkit_core as core;
pub use avdkit_emulator_bridge as emulator;
pub use avdkit_toolchain as toolchain;

/// Prelude module for convenient imports
pub mod prelude {
    pub use avdkit_core::{AppConfig, EnvSource, SystemEnv};
    pub use avdkit_emulator_bridge::{
        AvdContext, AvdError, Catalog, CreateOptions, DeviceRef, Launch, StartOptions,
        VirtualDevice,
    };
    pub use avdkit_toolchain::{SdkTools, ToolKind, ToolLocator};
}
