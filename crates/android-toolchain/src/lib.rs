//! Android Toolchain Discovery
//!
//! Locates the Android SDK command-line tools avdkit drives:
//! - `adb` (platform-tools)
//! - `emulator`
//! - `avdmanager` (cmdline-tools, or the legacy tools/bin layout)

pub mod locator;
pub mod tools;

pub use locator::{default_sdk_roots, LocateError, ToolKind, ToolLocator};
pub use tools::SdkTools;
