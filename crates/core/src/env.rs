//! Environment Surface
//!
//! Read-only, string-keyed view of the environment variables that drive
//! SDK tool discovery. Components take an `&dyn EnvSource` instead of
//! reading `std::env` directly so lookups can be swapped out in tests.

use std::collections::HashMap;
use std::path::PathBuf;

/// Primary SDK root variable
pub const ANDROID_SDK_ROOT: &str = "ANDROID_SDK_ROOT";

/// Secondary SDK root variable
pub const ANDROID_HOME: &str = "ANDROID_HOME";

/// Comma-separated extra roots, searched recursively as a last resort
pub const FIND_ANDROID_EXTRA_DIRS: &str = "FIND_ANDROID_EXTRA_DIRS";

/// Executable search path
pub const PATH: &str = "PATH";

/// Windows per-user application data root
pub const LOCAL_APP_DATA: &str = "LOCALAPPDATA";

/// Prefix of the per-tool override keys (`ANDROID_ADB`, `ANDROID_EMULATOR`, ...)
pub const TOOL_OVERRIDE_PREFIX: &str = "ANDROID_";

/// Per-tool override key for a tool name
pub fn tool_override_key(tool: &str) -> String {
    format!("{}{}", TOOL_OVERRIDE_PREFIX, tool.to_uppercase())
}

/// A read-only string-keyed environment
pub trait EnvSource: Send + Sync {
    /// Look up a key. Unset and non-UTF-8 values are both `None`.
    fn var(&self, key: &str) -> Option<String>;

    /// Look up a key, treating empty values as unset
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.trim().is_empty())
    }
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl EnvSource for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An in-memory environment
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
