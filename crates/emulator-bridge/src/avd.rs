//! AVD (Android Virtual Device) Lifecycle
//!
//! A `VirtualDevice` mirrors one entry of `avdmanager list avd` and drives it
//! through create, start, stop, kill, boot-wait, rename and delete. The
//! on-disk AVD is owned by the SDK tools; re-query the catalog after a
//! mutation when the in-memory view must be authoritative.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use avdkit_core::EmulatorConfig;
use avdkit_toolchain::{LocateError, SdkTools};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::adb::{AdbClient, AdbError, DeviceBridge};
use crate::catalog::Catalog;
use crate::parser::ParseError;
use crate::process::{
    render_command, CommandOutput, CommandRunner, ProcessError, ProcessHandle, TokioCommandRunner,
};
use crate::records::{AvdEntry, Device};

/// Property reporting `1` once Android finished booting
pub const BOOT_COMPLETED_PROP: &str = "sys.boot_completed";

/// AVD errors
#[derive(Debug, thiserror::Error)]
pub enum AvdError {
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("avdmanager reported success but AVD {name:?} is not listed")]
    CreationUnconfirmed { name: String },
    #[error("Failed to parse avdmanager output: {0}")]
    Parse(#[from] ParseError),
    #[error("AVD {name:?} did not finish booting within {timeout:?}")]
    BootTimeout { name: String, timeout: Duration },
    #[error("AVD {name:?} is {state}")]
    InvalidState { name: String, state: LifecycleState },
    #[error("No running emulator reports product {0:?}")]
    NoMatchingDevice(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Adb(#[from] AdbError),
}

/// Where a `VirtualDevice` is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Named but never matched against the catalog
    Unbound,
    Bound,
    /// Bound with a live emulator process held by this instance
    Running,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unbound => "not bound",
            LifecycleState::Bound => "bound",
            LifecycleState::Running => "already running",
            LifecycleState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Timing knobs for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Interval between `sys.boot_completed` polls
    pub poll_interval: Duration,
    /// Upper bound for each avdmanager/adb invocation
    pub command_timeout: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&EmulatorConfig::default())
    }
}

impl From<&EmulatorConfig> for ControllerSettings {
    fn from(config: &EmulatorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            command_timeout: config.command_timeout(),
        }
    }
}

/// Shared collaborators of every catalog and lifecycle operation
pub struct AvdContext {
    pub tools: Arc<SdkTools>,
    pub runner: Arc<dyn CommandRunner>,
    pub bridge: Arc<dyn DeviceBridge>,
    pub settings: ControllerSettings,
}

impl AvdContext {
    pub fn new(
        tools: Arc<SdkTools>,
        runner: Arc<dyn CommandRunner>,
        bridge: Arc<dyn DeviceBridge>,
    ) -> Self {
        Self {
            tools,
            runner,
            bridge,
            settings: ControllerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Context backed by real processes and the resolved `adb`
    pub fn system(tools: Arc<SdkTools>, config: &EmulatorConfig) -> Self {
        let settings = ControllerSettings::from(config);
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
        let bridge = AdbClient::new(tools.adb(), runner.clone())
            .with_timeout(settings.command_timeout);

        Self::new(tools, runner, Arc::new(bridge)).with_settings(settings)
    }

    /// `avdmanager` followed by `args`
    pub(crate) fn avdmanager_argv<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut argv = vec![self.tools.avdmanager().to_string_lossy().into_owned()];
        argv.extend(args.iter().map(|a| a.as_ref().to_string()));
        argv
    }

    pub(crate) async fn run(&self, argv: &[String]) -> Result<CommandOutput, ProcessError> {
        self.runner.run(argv, self.settings.command_timeout).await
    }
}

/// How `create` names the hardware profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Profile(Device),
    Id(u32),
    /// Alias or display name, resolved against the current device listing
    Name(String),
}

impl From<Device> for DeviceRef {
    fn from(device: Device) -> Self {
        DeviceRef::Profile(device)
    }
}

impl From<u32> for DeviceRef {
    fn from(id: u32) -> Self {
        DeviceRef::Id(id)
    }
}

impl From<&str> for DeviceRef {
    fn from(name: &str) -> Self {
        DeviceRef::Name(name.to_string())
    }
}

impl From<String> for DeviceRef {
    fn from(name: String) -> Self {
        DeviceRef::Name(name)
    }
}

/// Options for `avdmanager create avd`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub name: String,
    /// System image package, e.g. `system-images;android-34;google_apis;x86_64`
    pub package: String,
    pub device: DeviceRef,
    pub sdcard: Option<String>,
    pub tag: Option<String>,
    pub abi: Option<String>,
    pub skin: Option<String>,
    pub path: Option<PathBuf>,
    pub force: bool,
    pub snapshot: bool,
    pub silent: bool,
    pub verbose: bool,
}

impl CreateOptions {
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        device: impl Into<DeviceRef>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            device: device.into(),
            sdcard: None,
            tag: None,
            abi: None,
            skin: None,
            path: None,
            force: false,
            snapshot: false,
            silent: false,
            verbose: false,
        }
    }

    pub fn sdcard(mut self, size: impl Into<String>) -> Self {
        self.sdcard = Some(size.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn abi(mut self, abi: impl Into<String>) -> Self {
        self.abi = Some(abi.into());
        self
    }

    pub fn skin(mut self, skin: impl Into<String>) -> Self {
        self.skin = Some(skin.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Arguments after `avdmanager`, with the device already resolved to an id
    fn to_args(&self, device_id: u32) -> Vec<String> {
        let mut args = Vec::new();
        if self.silent {
            args.push("--silent".to_string());
        } else if self.verbose {
            args.push("--verbose".to_string());
        }

        args.extend(
            [
                "create",
                "avd",
                "-n",
                self.name.as_str(),
                "--package",
                self.package.as_str(),
                "--device",
            ]
            .map(String::from),
        );
        args.push(device_id.to_string());

        let path = self.path.as_ref().map(|p| p.to_string_lossy().into_owned());
        let optional = [
            ("--sdcard", self.sdcard.as_ref()),
            ("--tag", self.tag.as_ref()),
            ("--abi", self.abi.as_ref()),
            ("--skin", self.skin.as_ref()),
            ("--path", path.as_ref()),
        ];
        for (flag, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }

        if self.force {
            args.push("--force".to_string());
        }
        if self.snapshot {
            args.push("--snapshot".to_string());
        }
        args
    }
}

/// Options for launching the emulator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Return right after spawning instead of waiting for the emulator to exit
    pub detach: bool,
    /// Extra emulator arguments, split with shell quoting rules
    pub extra_args: Option<String>,
}

impl StartOptions {
    pub fn detached() -> Self {
        Self {
            detach: true,
            extra_args: None,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.extra_args = Some(args.into());
        self
    }
}

/// Outcome of `VirtualDevice::start`
pub enum Launch<'a> {
    /// Detached emulator, held by the instance until it exits or is killed
    Running(&'a mut dyn ProcessHandle),
    /// Attached emulator that already exited, with its exit code
    Exited(Option<i32>),
}

impl Launch<'_> {
    /// Process id of a running emulator
    pub fn id(&self) -> Option<u32> {
        match self {
            Launch::Running(handle) => handle.id(),
            Launch::Exited(_) => None,
        }
    }
}

impl fmt::Debug for Launch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launch::Running(handle) => f.debug_tuple("Running").field(&handle.id()).finish(),
            Launch::Exited(code) => f.debug_tuple("Exited").field(code).finish(),
        }
    }
}

/// Catalog data of one AVD
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvdDetails {
    pub name: String,
    pub device: Option<Device>,
    pub path: Option<PathBuf>,
    pub target: Option<String>,
    pub skin: Option<String>,
    pub sdcard_size: Option<String>,
    pub based_on: Option<String>,
    pub abi: Option<String>,
}

impl AvdDetails {
    fn named(name: String) -> Self {
        Self {
            name,
            device: None,
            path: None,
            target: None,
            skin: None,
            sdcard_size: None,
            based_on: None,
            abi: None,
        }
    }

    /// Attach the device profile the entry's alias points at
    pub fn from_entry(entry: AvdEntry, devices: &[Device]) -> Self {
        let device = entry
            .device_alias
            .as_deref()
            .and_then(|alias| devices.iter().find(|d| d.alias == alias))
            .cloned();

        Self {
            name: entry.name,
            device,
            path: entry.path,
            target: entry.target,
            skin: entry.skin,
            sdcard_size: entry.sdcard_size,
            based_on: entry.based_on,
            abi: entry.abi,
        }
    }
}

/// A managed Android Virtual Device
pub struct VirtualDevice {
    ctx: Arc<AvdContext>,
    details: AvdDetails,
    /// `Unbound`, `Bound` or `Deleted`; `Running` is derived from `process`
    status: LifecycleState,
    process: Option<Box<dyn ProcessHandle>>,
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("details", &self.details)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VirtualDevice {
    /// An unbound instance; call `bind` to load it from the catalog
    pub fn new(ctx: Arc<AvdContext>, name: impl Into<String>) -> Self {
        Self {
            ctx,
            details: AvdDetails::named(name.into()),
            status: LifecycleState::Unbound,
            process: None,
        }
    }

    pub(crate) fn bound(ctx: Arc<AvdContext>, details: AvdDetails) -> Self {
        Self {
            ctx,
            details,
            status: LifecycleState::Bound,
            process: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn device(&self) -> Option<&Device> {
        self.details.device.as_ref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.details.path.as_deref()
    }

    pub fn details(&self) -> &AvdDetails {
        &self.details
    }

    pub fn state(&self) -> LifecycleState {
        match self.status {
            LifecycleState::Bound if self.process.is_some() => LifecycleState::Running,
            status => status,
        }
    }

    fn invalid_state(&self) -> AvdError {
        AvdError::InvalidState {
            name: self.details.name.clone(),
            state: self.state(),
        }
    }

    fn ensure_bound(&self) -> Result<(), AvdError> {
        match self.status {
            LifecycleState::Bound => Ok(()),
            _ => Err(self.invalid_state()),
        }
    }

    /// Load this instance's data from `avdmanager list avd`
    pub async fn bind(&mut self) -> Result<(), AvdError> {
        if self.status == LifecycleState::Deleted {
            return Err(self.invalid_state());
        }

        let catalog = Catalog::new(self.ctx.clone());
        match catalog.find_virtual_device(&self.details.name).await? {
            Some(found) => {
                debug!("Bound AVD {}", found.details.name);
                self.details = found.details;
                self.status = LifecycleState::Bound;
                Ok(())
            }
            None => Err(self.invalid_state()),
        }
    }

    /// Create a new AVD and return it bound to the fresh catalog entry
    pub async fn create(
        ctx: Arc<AvdContext>,
        options: CreateOptions,
    ) -> Result<VirtualDevice, AvdError> {
        if options.silent && options.verbose {
            return Err(AvdError::InvalidArgument(
                "'silent' and 'verbose' cannot both be set".to_string(),
            ));
        }
        if options.name.trim().is_empty() {
            return Err(AvdError::InvalidArgument("AVD name is empty".to_string()));
        }

        let catalog = Catalog::new(ctx.clone());
        let device_id = catalog.resolve_device(&options.device).await?;

        let argv = ctx.avdmanager_argv(&options.to_args(device_id));
        info!("Creating AVD: {}", options.name);
        let output = ctx.run(&argv).await?;
        if !output.success() {
            return Err(AvdError::CommandFailed {
                command: render_command(&argv),
                message: output.failure_message(),
            });
        }

        match catalog.find_virtual_device(&options.name).await? {
            Some(avd) => {
                info!("AVD created successfully: {}", avd.name());
                Ok(avd)
            }
            None => Err(AvdError::CreationUnconfirmed { name: options.name }),
        }
    }

    /// Delete the AVD; `false` when avdmanager refused
    pub async fn delete(&mut self) -> Result<bool, AvdError> {
        self.ensure_bound()?;

        let argv = self.ctx.avdmanager_argv(&["delete", "avd", "-n", self.details.name.as_str()]);
        info!("Deleting AVD: {}", self.details.name);
        let message = match self.ctx.run(&argv).await {
            Ok(output) if output.success() => {
                self.status = LifecycleState::Deleted;
                info!("AVD deleted: {}", self.details.name);
                return Ok(true);
            }
            Ok(output) => output.failure_message(),
            Err(err) => err.to_string(),
        };

        error!("Delete of AVD {} failed: {}", self.details.name, message);
        Ok(false)
    }

    /// Rename the AVD; the `.avd` directory follows the new name
    pub async fn rename(&mut self, new_name: &str) -> Result<bool, AvdError> {
        self.ensure_bound()?;
        if new_name.trim().is_empty() {
            return Err(AvdError::InvalidArgument("new AVD name is empty".to_string()));
        }

        let argv = self
            .ctx
            .avdmanager_argv(&["move", "avd", "-n", self.details.name.as_str(), "-r", new_name]);
        let output = self.ctx.run(&argv).await.map_err(|err| AvdError::CommandFailed {
            command: render_command(&argv),
            message: err.to_string(),
        })?;

        if !output.success() {
            error!(
                "Rename of AVD {} failed: {}",
                self.details.name,
                output.failure_message()
            );
            return Ok(false);
        }

        if let Some(path) = self.details.path.as_mut() {
            path.set_file_name(format!("{}.avd", new_name));
        }
        info!("AVD {} renamed to {}", self.details.name, new_name);
        self.details.name = new_name.to_string();
        Ok(true)
    }

    /// Launch the emulator for this AVD.
    ///
    /// Unless `detach` is set this returns only after the emulator exits,
    /// and no handle is kept.
    pub async fn start(&mut self, options: StartOptions) -> Result<Launch<'_>, AvdError> {
        self.ensure_bound()?;

        let exited = match self.process.as_mut() {
            Some(handle) => Some(handle.has_exited()?),
            None => None,
        };
        match exited {
            Some(false) => return Err(self.invalid_state()),
            Some(true) => {
                debug!("Discarding exited emulator process for {}", self.details.name);
                self.process = None;
            }
            None => {}
        }

        let mut argv = vec![
            self.ctx.tools.emulator().to_string_lossy().into_owned(),
            "-avd".to_string(),
            self.details.name.clone(),
        ];
        if let Some(extra) = options.extra_args.as_deref() {
            let split = shlex::split(extra).ok_or_else(|| {
                AvdError::InvalidArgument(format!("Unbalanced quoting in emulator arguments: {}", extra))
            })?;
            argv.extend(split);
        }

        info!("Starting emulator ({})", self.details.name);
        let mut handle = self.ctx.runner.spawn(&argv)?;
        if !options.detach {
            let code = handle.wait().await?;
            info!("Emulator for {} exited with {:?}", self.details.name, code);
            return Ok(Launch::Exited(code));
        }

        Ok(Launch::Running(&mut **self.process.insert(handle)))
    }

    /// Ask the emulator on `port` to shut down through its console
    pub async fn stop(&self, port: u16) -> Result<bool, AvdError> {
        self.ensure_bound()?;

        let serial = crate::emulator_serial(port);
        match self.ctx.bridge.device(serial.as_str()).shell(&["emu", "kill"]).await {
            Ok(_) => {
                info!("Stop signal sent to {}", serial);
                Ok(true)
            }
            Err(err) => {
                error!("Failed to stop emulator {}: {}", serial, err);
                Ok(false)
            }
        }
    }

    /// Kill the emulator process started by this instance
    pub async fn kill(&mut self) -> Result<bool, AvdError> {
        self.ensure_bound()?;

        let Some(mut handle) = self.process.take() else {
            debug!("No process to kill for {}", self.details.name);
            return Ok(false);
        };
        if let Err(err) = handle.kill().await {
            self.process = Some(handle);
            return Err(err.into());
        }
        info!("Process for {} killed", self.details.name);
        Ok(true)
    }

    /// Whether the emulator started by this instance is still alive
    pub fn is_running(&mut self) -> Result<bool, AvdError> {
        match self.process.as_mut() {
            Some(handle) => Ok(!handle.has_exited()?),
            None => Ok(false),
        }
    }

    /// Wait until the running emulator for this AVD reports boot completion
    pub async fn wait_boot_completed(&self, timeout: Duration) -> Result<(), AvdError> {
        self.ensure_bound()?;
        let deadline = Instant::now() + timeout;
        let name = &self.details.name;

        let serial = self
            .ctx
            .bridge
            .list_connected(true)
            .await?
            .into_iter()
            .find(|d| d.is_emulator() && d.product() == Some(name.as_str()))
            .map(|d| d.serial)
            .ok_or_else(|| AvdError::NoMatchingDevice(name.clone()))?;
        debug!("AVD {} is running as {}", name, serial);

        let device = self.ctx.bridge.device(serial);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match device.get_prop(BOOT_COMPLETED_PROP).await {
                Ok(value) if value == "1" => {
                    info!("Boot completed for {}", name);
                    return Ok(());
                }
                Ok(value) => debug!("{} = {:?} on {}", BOOT_COMPLETED_PROP, value, device.serial()),
                Err(err) => debug!("{} not reachable yet: {}", device.serial(), err),
            }
            tokio::time::sleep(self.ctx.settings.poll_interval.min(remaining)).await;
        }

        warn!("AVD {} did not boot within {:?}", name, timeout);
        Err(AvdError::BootTimeout {
            name: name.clone(),
            timeout,
        })
    }
}
