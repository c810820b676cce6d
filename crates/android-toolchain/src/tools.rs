//! Resolved SDK Tools
//!
//! Discovery probes the filesystem and can fall back to a recursive scan,
//! so the three tool paths are resolved once at startup into an `SdkTools`
//! value that is then shared read-only (usually behind an `Arc`). There is
//! no invalidation: if the SDK moves, restart the process.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::locator::{LocateError, ToolKind, ToolLocator};

/// Absolute paths of `avdmanager`, `emulator` and `adb`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkTools {
    avdmanager: PathBuf,
    emulator: PathBuf,
    adb: PathBuf,
}

impl SdkTools {
    /// Resolve all three tools, failing on the first one that cannot be found
    pub fn resolve(locator: &ToolLocator<'_>) -> Result<Self, LocateError> {
        let tools = Self {
            avdmanager: locator.locate(ToolKind::AvdManager)?,
            emulator: locator.locate(ToolKind::Emulator)?,
            adb: locator.locate(ToolKind::Adb)?,
        };
        info!("Android SDK tools resolved");
        Ok(tools)
    }

    /// Build from already known paths
    pub fn from_paths(
        avdmanager: impl Into<PathBuf>,
        emulator: impl Into<PathBuf>,
        adb: impl Into<PathBuf>,
    ) -> Self {
        Self {
            avdmanager: avdmanager.into(),
            emulator: emulator.into(),
            adb: adb.into(),
        }
    }

    pub fn path(&self, kind: ToolKind) -> &Path {
        match kind {
            ToolKind::AvdManager => &self.avdmanager,
            ToolKind::Emulator => &self.emulator,
            ToolKind::Adb => &self.adb,
        }
    }

    pub fn avdmanager(&self) -> &Path {
        &self.avdmanager
    }

    pub fn emulator(&self) -> &Path {
        &self.emulator
    }

    pub fn adb(&self) -> &Path {
        &self.adb
    }

    /// Iterate `(kind, path)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ToolKind, &Path)> {
        ToolKind::ALL.into_iter().map(move |kind| (kind, self.path(kind)))
    }
}
