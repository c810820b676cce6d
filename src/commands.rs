//! CLI commands for avdkit
//!
//! Each command owns its parsed options and runs against a shared
//! `AvdContext`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use avdkit_emulator_bridge::{
    AvdContext, AvdError, Catalog, CreateOptions, DeviceRef, Launch, StartOptions, VirtualDevice,
};
use avdkit_toolchain::SdkTools;

/// Interpret a `--device` value: a number is a device id, anything else an alias or name
pub fn parse_device_ref(value: &str) -> DeviceRef {
    match value.parse::<u32>() {
        Ok(id) => DeviceRef::Id(id),
        Err(_) => DeviceRef::Name(value.to_string()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Bind `name` against the catalog
async fn bind(ctx: &Arc<AvdContext>, name: &str) -> Result<VirtualDevice> {
    let mut avd = VirtualDevice::new(ctx.clone(), name);
    avd.bind()
        .await
        .with_context(|| format!("AVD '{}' is not listed by avdmanager", name))?;
    Ok(avd)
}

/// Show the resolved SDK tools
pub struct ToolsCommand {
    /// Print JSON instead of text
    pub json: bool,
}

impl ToolsCommand {
    /// Print each tool path
    pub fn execute(&self, tools: &SdkTools) -> Result<()> {
        if self.json {
            return print_json(tools);
        }
        for (kind, path) in tools.iter() {
            println!("{:<11} {}", kind.name(), path.display());
        }
        Ok(())
    }
}

/// What a list command lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// `avdmanager list target`
    Targets,
    /// `avdmanager list device`
    Devices,
    /// `avdmanager list avd`
    VirtualDevices,
}

/// List catalog entries
pub struct ListCommand {
    /// Which listing
    pub listing: Listing,
    /// Print JSON instead of text
    pub json: bool,
}

impl ListCommand {
    /// Query avdmanager and print the result
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let catalog = Catalog::new(ctx);

        match self.listing {
            Listing::Targets => {
                let targets = catalog.list_targets().await?;
                if self.json {
                    return print_json(&targets);
                }
                if targets.is_empty() {
                    println!("No targets installed");
                }
                for target in &targets {
                    println!(
                        "{:>3}  {:<24} {:<24} API {}",
                        target.id,
                        target.alias,
                        or_dash(target.name.as_deref()),
                        target
                            .api_level
                            .map_or_else(|| "-".to_string(), |level| level.to_string())
                    );
                }
            }
            Listing::Devices => {
                let devices = catalog.list_devices().await?;
                if self.json {
                    return print_json(&devices);
                }
                for device in &devices {
                    println!(
                        "{:>3}  {:<24} {:<32} {}",
                        device.id,
                        device.alias,
                        or_dash(device.name.as_deref()),
                        or_dash(device.oem.as_deref())
                    );
                }
            }
            Listing::VirtualDevices => {
                let avds = catalog.list_virtual_devices().await?;
                if self.json {
                    let details: Vec<_> = avds.iter().map(VirtualDevice::details).collect();
                    return print_json(&details);
                }
                if avds.is_empty() {
                    println!("No AVDs configured");
                }
                for avd in &avds {
                    let details = avd.details();
                    println!(
                        "{:<28} {:<20} {}",
                        details.name,
                        or_dash(details.device.as_ref().map(|d| d.alias.as_str())),
                        or_dash(details.abi.as_deref())
                    );
                }
            }
        }

        Ok(())
    }
}

/// Create an AVD
pub struct CreateCommand {
    /// `avdmanager create avd` options
    pub options: CreateOptions,
}

impl CreateCommand {
    /// Create the AVD and print where it landed
    pub async fn execute(self, ctx: Arc<AvdContext>) -> Result<()> {
        let name = self.options.name.clone();
        let avd = VirtualDevice::create(ctx, self.options)
            .await
            .with_context(|| format!("Failed to create AVD '{}'", name))?;

        match avd.path() {
            Some(path) => println!("Created AVD {} at {}", avd.name(), path.display()),
            None => println!("Created AVD {}", avd.name()),
        }
        Ok(())
    }
}

/// Delete an AVD
pub struct DeleteCommand {
    /// AVD name
    pub name: String,
}

impl DeleteCommand {
    /// Delete through avdmanager
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let mut avd = bind(&ctx, &self.name).await?;
        if !avd.delete().await? {
            bail!("avdmanager could not delete AVD '{}'", self.name);
        }
        println!("Deleted AVD {}", self.name);
        Ok(())
    }
}

/// Rename an AVD
pub struct RenameCommand {
    /// Current AVD name
    pub name: String,
    /// New AVD name
    pub new_name: String,
}

impl RenameCommand {
    /// Rename through avdmanager
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let mut avd = bind(&ctx, &self.name).await?;
        if !avd.rename(&self.new_name).await? {
            bail!("avdmanager could not rename AVD '{}'", self.name);
        }
        println!("Renamed AVD {} to {}", self.name, self.new_name);
        Ok(())
    }
}

/// Launch the emulator
pub struct StartCommand {
    /// AVD name
    pub name: String,
    /// Return once the emulator is spawned
    pub detach: bool,
    /// Extra emulator arguments
    pub args: Option<String>,
    /// Wait for boot completion, killing the emulator when it does not boot in time
    pub wait_boot: Option<Duration>,
}

impl StartCommand {
    /// Start the emulator, optionally waiting for boot
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let mut avd = bind(&ctx, &self.name).await?;
        let options = StartOptions {
            detach: self.detach || self.wait_boot.is_some(),
            extra_args: self.args.clone(),
        };

        let pid = match avd.start(options).await? {
            Launch::Running(handle) => handle.id(),
            Launch::Exited(code) => {
                println!("Emulator {} exited with {:?}", self.name, code);
                return Ok(());
            }
        };
        let Some(timeout) = self.wait_boot else {
            match pid {
                Some(pid) => println!("Started emulator {} (pid {})", self.name, pid),
                None => println!("Started emulator {}", self.name),
            }
            return Ok(());
        };

        // A fresh emulator is listed by adb only once it has registered
        let deadline = Instant::now() + timeout;
        let booted = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match avd.wait_boot_completed(remaining).await {
                Err(AvdError::NoMatchingDevice(_)) if !remaining.is_zero() => {
                    tokio::time::sleep(ctx.settings.poll_interval.min(remaining)).await;
                }
                other => break other,
            }
        };

        if let Err(err) = booted {
            warn!("Killing emulator for {}", self.name);
            avd.kill().await?;
            return Err(err).context(format!("Emulator {} did not boot", self.name));
        }

        println!("Emulator {} booted", self.name);
        Ok(())
    }
}

/// Ask a running emulator to shut down
pub struct StopCommand {
    /// AVD name
    pub name: String,
    /// Emulator console port
    pub port: u16,
}

impl StopCommand {
    /// Send `emu kill` to the emulator on `port`
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let avd = bind(&ctx, &self.name).await?;
        if !avd.stop(self.port).await? {
            bail!("Could not stop the emulator on port {}", self.port);
        }
        println!("Stop signal sent to {}", self.name);
        Ok(())
    }
}

/// Wait for a running emulator to finish booting
pub struct WaitBootCommand {
    /// AVD name
    pub name: String,
    /// Give up after this long
    pub timeout: Duration,
}

impl WaitBootCommand {
    /// Poll `sys.boot_completed`
    pub async fn execute(&self, ctx: Arc<AvdContext>) -> Result<()> {
        let avd = bind(&ctx, &self.name).await?;
        info!("Waiting up to {:?} for {} to boot", self.timeout, self.name);
        avd.wait_boot_completed(self.timeout).await?;
        println!("Emulator {} booted", self.name);
        Ok(())
    }
}
