//! Tool Locator
//!
//! Resolves the on-disk path of `adb`, `emulator` or `avdmanager`.
//!
//! Search order (first hit wins):
//!   1. Per-tool override: `ANDROID_<TOOL>` naming an existing file
//!   2. The executable search path (`PATH`)
//!   3. `ANDROID_SDK_ROOT`, then `ANDROID_HOME`
//!   4. Platform default SDK roots
//!   5. `FIND_ANDROID_EXTRA_DIRS`, scanned recursively

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use avdkit_core::env::{self, EnvSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Tool discovery errors
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("Unsupported tool: {0} (expected adb, emulator or avdmanager)")]
    InvalidArgument(String),
    #[error("Could not locate {tool}. Install Android SDK Platform-Tools / Emulator or set ANDROID_SDK_ROOT.")]
    ToolNotFound { tool: ToolKind },
}

/// The SDK tools avdkit drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Android Debug Bridge (`platform-tools/adb`)
    Adb,
    /// Emulator binary (`emulator/emulator`)
    Emulator,
    /// AVD manager script (`cmdline-tools/*/bin/avdmanager`)
    AvdManager,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::AvdManager, ToolKind::Emulator, ToolKind::Adb];

    /// Bare tool name
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Adb => "adb",
            ToolKind::Emulator => "emulator",
            ToolKind::AvdManager => "avdmanager",
        }
    }

    /// File name on the current platform.
    ///
    /// `avdmanager` ships as a batch script on Windows while the other two
    /// are native executables.
    pub fn file_name(&self) -> String {
        if cfg!(windows) {
            match self {
                ToolKind::AvdManager => format!("{}.bat", self.name()),
                _ => format!("{}.exe", self.name()),
            }
        } else {
            self.name().to_string()
        }
    }

    /// Environment key of the per-tool override
    pub fn override_key(&self) -> String {
        env::tool_override_key(self.name())
    }

    /// Conventional directories for this tool inside an SDK root
    fn sdk_dirs(&self, root: &Path) -> Vec<PathBuf> {
        match self {
            ToolKind::Adb => vec![root.join("platform-tools")],
            ToolKind::Emulator => vec![root.join("emulator")],
            ToolKind::AvdManager => {
                let mut dirs = cmdline_tools_bins(&root.join("cmdline-tools"));
                // Pre-cmdline-tools layout
                dirs.push(root.join("tools").join("bin"));
                dirs
            }
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adb" => Ok(ToolKind::Adb),
            "emulator" => Ok(ToolKind::Emulator),
            "avdmanager" => Ok(ToolKind::AvdManager),
            other => Err(LocateError::InvalidArgument(other.to_string())),
        }
    }
}

/// `cmdline-tools/<version>/bin` directories, `latest` first, then newest name first
fn cmdline_tools_bins(cmdline_tools: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(cmdline_tools) else {
        return Vec::new();
    };

    let mut versions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("bin").is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();

    versions.sort_by(|a, b| match (a == "latest", b == "latest") {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => b.cmp(a),
    });

    versions
        .into_iter()
        .map(|v| cmdline_tools.join(v).join("bin"))
        .collect()
}

/// Typical SDK install roots for the current platform
pub fn default_sdk_roots(env: &dyn EnvSource) -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

    if cfg!(target_os = "macos") {
        vec![
            home.join("Library").join("Android").join("sdk"),
            home.join("Android").join("Sdk"),
        ]
    } else if cfg!(windows) {
        let mut roots = Vec::new();
        if let Some(local) = env.non_empty(env::LOCAL_APP_DATA) {
            roots.push(PathBuf::from(local).join("Android").join("Sdk"));
        }
        roots.push(home.join("AppData").join("Local").join("Android").join("Sdk"));
        roots
    } else {
        vec![home.join("Android").join("Sdk"), PathBuf::from("/opt/android-sdk")]
    }
}

/// Multi-stage SDK tool locator
pub struct ToolLocator<'a> {
    env: &'a dyn EnvSource,
    default_roots: Vec<PathBuf>,
}

impl<'a> ToolLocator<'a> {
    /// Create a locator reading the given environment, with the platform default roots
    pub fn new(env: &'a dyn EnvSource) -> Self {
        Self {
            env,
            default_roots: default_sdk_roots(env),
        }
    }

    /// Replace the platform default roots probed in stage 4
    pub fn with_default_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.default_roots = roots;
        self
    }

    /// Locate a tool by name. Unsupported names fail before any filesystem access.
    pub fn locate_named(&self, tool: &str) -> Result<PathBuf, LocateError> {
        let kind: ToolKind = tool.parse()?;
        self.locate(kind)
    }

    /// Locate a tool
    pub fn locate(&self, kind: ToolKind) -> Result<PathBuf, LocateError> {
        debug!("Locating {}", kind);

        let found = self
            .from_override(kind)
            .or_else(|| self.from_search_path(kind))
            .or_else(|| self.from_sdk_env(kind))
            .or_else(|| self.from_default_roots(kind))
            .or_else(|| self.from_extra_dirs(kind));

        match found {
            Some(path) => {
                info!("Found {} at {:?}", kind, path);
                Ok(path)
            }
            None => Err(LocateError::ToolNotFound { tool: kind }),
        }
    }

    fn from_override(&self, kind: ToolKind) -> Option<PathBuf> {
        let raw = self.env.non_empty(&kind.override_key())?;
        let path = env::expand_home(&raw);
        if path.is_file() {
            trace!("{} resolved from {}", kind, kind.override_key());
            Some(path)
        } else {
            debug!("{}={:?} is not a file, ignoring", kind.override_key(), path);
            None
        }
    }

    fn from_search_path(&self, kind: ToolKind) -> Option<PathBuf> {
        let paths = self.env.var(env::PATH)?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        [kind.name().to_string(), kind.file_name()]
            .iter()
            .find_map(|name| which::which_in(name, Some(&paths), &cwd).ok())
    }

    fn from_sdk_env(&self, kind: ToolKind) -> Option<PathBuf> {
        let root = self
            .env
            .non_empty(env::ANDROID_SDK_ROOT)
            .or_else(|| self.env.non_empty(env::ANDROID_HOME))?;
        scan_sdk(&env::expand_home(&root), kind, false)
    }

    fn from_default_roots(&self, kind: ToolKind) -> Option<PathBuf> {
        self.default_roots
            .iter()
            .find_map(|root| scan_sdk(root, kind, false))
    }

    fn from_extra_dirs(&self, kind: ToolKind) -> Option<PathBuf> {
        let extra = self.env.var(env::FIND_ANDROID_EXTRA_DIRS)?;
        extra
            .split(',')
            .map(str::trim)
            .filter(|root| !root.is_empty())
            .find_map(|root| scan_sdk(&env::expand_home(root), kind, true))
    }
}

/// Probe an SDK tree for a tool; `deep` adds an exhaustive recursive search
fn scan_sdk(root: &Path, kind: ToolKind, deep: bool) -> Option<PathBuf> {
    let file_name = kind.file_name();
    trace!("Scanning {:?} for {}", root, file_name);

    let conventional = kind
        .sdk_dirs(root)
        .into_iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file());
    if conventional.is_some() || !deep {
        return conventional;
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name.as_str())
        .map(|entry| entry.into_path())
}
