//! Android Emulator Bridge
//!
//! Catalogs and manages Android Virtual Devices (AVDs) and the emulator
//! instances running them.

pub mod adb;
pub mod avd;
pub mod catalog;
pub mod device;
pub mod parser;
pub mod process;
pub mod records;

#[cfg(test)]
mod testing;

pub use adb::{AdbClient, AdbDevice, AdbError, DeviceBridge};
pub use avd::{
    AvdContext, AvdDetails, AvdError, ControllerSettings, CreateOptions, DeviceRef, Launch,
    LifecycleState, StartOptions, VirtualDevice,
};
pub use catalog::Catalog;
pub use device::{ConnectedDevice, DeviceState};
pub use parser::{parse_records, ParseError, Record, RecordParser};
pub use process::{CommandOutput, CommandRunner, ProcessError, ProcessHandle, TokioCommandRunner};
pub use records::{strip_annotation, AvdEntry, Device, Target};

pub use avdkit_core::DEFAULT_CONSOLE_PORT;

/// Serial prefix adb uses for emulator instances
pub const EMULATOR_SERIAL_PREFIX: &str = "emulator-";

/// adb serial of the emulator listening on console `port`
pub fn emulator_serial(port: u16) -> String {
    format!("{}{}", EMULATOR_SERIAL_PREFIX, port)
}
