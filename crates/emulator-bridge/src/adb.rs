//! ADB (Android Debug Bridge) Client
//!
//! The lifecycle controller reaches running devices through the
//! `DeviceBridge` trait; `AdbClient` implements it by driving the resolved
//! `adb` binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::device::{parse_devices, ConnectedDevice};
use crate::process::{render_command, CommandRunner, ProcessError};

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("ADB command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Remote-device collaborator
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// List connected devices; `extended` requests `key:value` tags
    async fn list_connected(&self, extended: bool) -> Result<Vec<ConnectedDevice>, AdbError>;

    /// Run a shell command on the device with this serial and return its stdout
    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String, AdbError>;
}

impl dyn DeviceBridge {
    /// Address a specific device by serial
    pub fn device(&self, serial: impl Into<String>) -> AdbDevice<'_> {
        AdbDevice {
            bridge: self,
            serial: serial.into(),
        }
    }
}

/// Handle to one device on a `DeviceBridge`
pub struct AdbDevice<'a> {
    bridge: &'a dyn DeviceBridge,
    serial: String,
}

impl AdbDevice<'_> {
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Run a shell command on this device
    pub async fn shell(&self, args: &[&str]) -> Result<String, AdbError> {
        self.bridge.shell(&self.serial, args).await
    }

    /// Read a system property
    pub async fn get_prop(&self, prop: &str) -> Result<String, AdbError> {
        let output = self.shell(&["getprop", prop]).await?;
        Ok(output.trim().to_string())
    }
}

/// ADB Client
pub struct AdbClient {
    adb: PathBuf,
    runner: Arc<dyn CommandRunner>,
    timeout: Option<Duration>,
}

impl AdbClient {
    /// Create a new ADB client for the given `adb` executable
    pub fn new(adb: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            adb: adb.into(),
            runner,
            timeout: None,
        }
    }

    /// Bound every adb invocation
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run an ADB command and return stdout; a non-zero exit is an error
    async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        let mut argv = vec![self.adb.to_string_lossy().into_owned()];
        argv.extend(args.iter().map(|a| a.to_string()));

        let output = self.runner.run(&argv, self.timeout).await?;
        if !output.success() {
            return Err(AdbError::CommandFailed {
                command: render_command(&argv),
                message: output.failure_message(),
            });
        }

        Ok(output.stdout_text())
    }
}

#[async_trait]
impl DeviceBridge for AdbClient {
    async fn list_connected(&self, extended: bool) -> Result<Vec<ConnectedDevice>, AdbError> {
        let output = if extended {
            self.run(&["devices", "-l"]).await?
        } else {
            self.run(&["devices"]).await?
        };
        let devices = parse_devices(&output);
        debug!("adb reports {} device(s)", devices.len());
        Ok(devices)
    }

    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", serial, "shell"];
        full_args.extend_from_slice(args);

        self.run(&full_args).await.map_err(|err| match err {
            AdbError::CommandFailed { message, .. } if message.contains("not found") => {
                AdbError::DeviceNotFound(serial.to_string())
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::FakeRunner;

    #[tokio::test]
    async fn test_list_connected_extended() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            &["devices"],
            CommandOutput::ok(
                "List of devices attached\nemulator-5554 device product:demo model:x transport_id:3\n",
            ),
        );
        let client = AdbClient::new("/sdk/platform-tools/adb", runner.clone());

        let devices = client.list_connected(true).await.unwrap();
        assert_eq!(devices[0].product(), Some("demo"));
        assert_eq!(
            runner.commands()[0],
            vec!["/sdk/platform-tools/adb", "devices", "-l"]
        );
    }

    #[tokio::test]
    async fn test_shell_addresses_serial() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(&["shell"], CommandOutput::ok("1\n"));
        let bridge: Arc<dyn DeviceBridge> =
            Arc::new(AdbClient::new("adb", runner.clone()));

        let value = bridge
            .device("emulator-5556")
            .get_prop("sys.boot_completed")
            .await
            .unwrap();
        assert_eq!(value, "1");
        assert_eq!(
            runner.commands()[0],
            vec!["adb", "-s", "emulator-5556", "shell", "getprop", "sys.boot_completed"]
        );
    }

    #[tokio::test]
    async fn test_missing_device() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            &["shell"],
            CommandOutput::failed(1, "adb: device 'emulator-5560' not found"),
        );
        let client = AdbClient::new("adb", runner);

        let err = client.shell("emulator-5560", &["emu", "kill"]).await.unwrap_err();
        assert!(matches!(err, AdbError::DeviceNotFound(serial) if serial == "emulator-5560"));
    }
}
