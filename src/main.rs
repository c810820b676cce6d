//! avdkit command-line entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use avdkit::commands::{
    parse_device_ref, CreateCommand, DeleteCommand, ListCommand, Listing, RenameCommand,
    StartCommand, StopCommand, ToolsCommand, WaitBootCommand,
};
use avdkit::core::{AppConfig, SystemEnv, APP_NAME, VERSION};
use avdkit::emulator::{AvdContext, CreateOptions};
use avdkit::toolchain::{SdkTools, ToolLocator};

#[derive(Parser)]
#[command(name = "avdkit", version, about = "Manage Android Virtual Devices")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbosity: u8,

    /// Configuration file (default: the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved adb, emulator and avdmanager paths
    Tools {
        #[arg(long)]
        json: bool,
    },
    /// List installed platform targets
    Targets {
        #[arg(long)]
        json: bool,
    },
    /// List hardware profiles
    Devices {
        #[arg(long)]
        json: bool,
    },
    /// List AVDs
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create an AVD
    Create {
        name: String,
        /// System image package, e.g. "system-images;android-34;google_apis;x86_64"
        #[arg(short = 'k', long)]
        package: String,
        /// Device profile id, alias or name
        #[arg(short, long)]
        device: String,
        #[arg(long)]
        sdcard: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        abi: Option<String>,
        #[arg(long)]
        skin: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing AVD
        #[arg(long)]
        force: bool,
        #[arg(long)]
        snapshot: bool,
        /// Run avdmanager with --silent
        #[arg(long, conflicts_with = "verbose")]
        silent: bool,
        /// Run avdmanager with --verbose
        #[arg(long)]
        verbose: bool,
    },
    /// Delete an AVD
    Delete { name: String },
    /// Rename an AVD
    Rename { name: String, new_name: String },
    /// Launch the emulator for an AVD
    Start {
        name: String,
        /// Return once the emulator is running
        #[arg(long)]
        detach: bool,
        /// Extra emulator arguments, e.g. "-no-window -gpu swiftshader_indirect"
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
        /// Wait for boot completion; the emulator is killed if it does not boot
        #[arg(long)]
        wait_boot: bool,
        /// Boot timeout in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Ask a running emulator to shut down
    Stop {
        name: String,
        /// Console port (default from config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Wait until a running emulator finished booting
    WaitBoot {
        name: String,
        /// Timeout in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path).await,
        None => AppConfig::load().await,
    }
    .map_err(|err| anyhow!(err.user_message()))?;

    init_logging(&config.logging.filter, cli.verbosity);
    debug!("{} v{}", APP_NAME, VERSION);

    let env = SystemEnv;
    let locator = ToolLocator::new(&env);
    let tools = SdkTools::resolve(&locator)
        .context("Android SDK tools not found; set ANDROID_SDK_ROOT or ANDROID_<TOOL>")?;
    let tools = Arc::new(tools);
    let ctx = Arc::new(AvdContext::system(tools.clone(), &config.emulator));

    let boot_timeout =
        |secs: Option<u64>| secs.map_or_else(|| config.emulator.boot_timeout(), Duration::from_secs);

    match cli.command {
        Command::Tools { json } => ToolsCommand { json }.execute(&tools),
        Command::Targets { json } => {
            ListCommand { listing: Listing::Targets, json }.execute(ctx).await
        }
        Command::Devices { json } => {
            ListCommand { listing: Listing::Devices, json }.execute(ctx).await
        }
        Command::List { json } => {
            ListCommand { listing: Listing::VirtualDevices, json }
                .execute(ctx)
                .await
        }
        Command::Create {
            name,
            package,
            device,
            sdcard,
            tag,
            abi,
            skin,
            path,
            force,
            snapshot,
            silent,
            verbose,
        } => {
            let options = CreateOptions {
                sdcard,
                tag,
                abi,
                skin,
                path,
                force,
                snapshot,
                silent,
                verbose,
                ..CreateOptions::new(name, package, parse_device_ref(&device))
            };
            CreateCommand { options }.execute(ctx).await
        }
        Command::Delete { name } => DeleteCommand { name }.execute(ctx).await,
        Command::Rename { name, new_name } => RenameCommand { name, new_name }.execute(ctx).await,
        Command::Start {
            name,
            detach,
            args,
            wait_boot,
            timeout,
        } => {
            StartCommand {
                name,
                detach,
                args,
                wait_boot: wait_boot.then(|| boot_timeout(timeout)),
            }
            .execute(ctx)
            .await
        }
        Command::Stop { name, port } => {
            let port = port.unwrap_or(config.emulator.console_port);
            StopCommand { name, port }.execute(ctx).await
        }
        Command::WaitBoot { name, timeout } => {
            WaitBootCommand {
                name,
                timeout: boot_timeout(timeout),
            }
            .execute(ctx)
            .await
        }
    }
}

/// Install the tracing subscriber; `RUST_LOG` wins over the configured filter
fn init_logging(configured: &str, verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
