//! Entity Catalog
//!
//! Lists targets, device profiles and AVDs through `avdmanager list`.
//! Nothing is cached: every call runs the tool again.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::avd::{AvdContext, AvdDetails, AvdError, DeviceRef, VirtualDevice};
use crate::parser::{parse_records, Record};
use crate::process::render_command;
use crate::records::{AvdEntry, Device, Target};

/// Read-only view over `avdmanager list`
#[derive(Clone)]
pub struct Catalog {
    ctx: Arc<AvdContext>,
}

impl Catalog {
    pub fn new(ctx: Arc<AvdContext>) -> Self {
        Self { ctx }
    }

    async fn list<R: Record>(&self, kind: &str) -> Result<Vec<R>, AvdError> {
        let argv = self.ctx.avdmanager_argv(&["list", kind]);
        let output = self.ctx.run(&argv).await?;
        if !output.success() {
            // stdout is still parsed; it normally holds nothing usable
            warn!(
                "`{}` exited with {:?}: {}",
                render_command(&argv),
                output.status,
                output.failure_message()
            );
        }

        let records = parse_records(&output.stdout_text())?;
        debug!("avdmanager listed {} {}(s)", records.len(), kind);
        Ok(records)
    }

    /// Installed platform targets
    pub async fn list_targets(&self) -> Result<Vec<Target>, AvdError> {
        self.list("target").await
    }

    /// Hardware profile definitions
    pub async fn list_devices(&self) -> Result<Vec<Device>, AvdError> {
        self.list("device").await
    }

    /// Every AVD, bound and with its device profile resolved.
    ///
    /// The device listing is captured once for the whole call.
    pub async fn list_virtual_devices(&self) -> Result<Vec<VirtualDevice>, AvdError> {
        let devices = self.list_devices().await?;
        let entries: Vec<AvdEntry> = self.list("avd").await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                VirtualDevice::bound(self.ctx.clone(), AvdDetails::from_entry(entry, &devices))
            })
            .collect())
    }

    /// First AVD listed under `name`
    pub async fn find_virtual_device(&self, name: &str) -> Result<Option<VirtualDevice>, AvdError> {
        Ok(self
            .list_virtual_devices()
            .await?
            .into_iter()
            .find(|avd| avd.name() == name))
    }

    /// Numeric device id for `avdmanager create avd --device`
    pub async fn resolve_device(&self, device: &DeviceRef) -> Result<u32, AvdError> {
        match device {
            DeviceRef::Profile(profile) => Ok(profile.id),
            DeviceRef::Id(id) => Ok(*id),
            DeviceRef::Name(name) => self
                .list_devices()
                .await?
                .into_iter()
                .find(|d| d.matches(name))
                .map(|d| d.id)
                .ok_or_else(|| AvdError::InvalidArgument(format!("Unknown device '{}'", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avd::LifecycleState;
    use crate::process::CommandOutput;
    use crate::testing::{FakeBridge, FakeRunner, AVD_LIST, DEVICE_LIST, TARGET_LIST};
    use avdkit_toolchain::SdkTools;

    fn catalog(runner: Arc<FakeRunner>) -> Catalog {
        let tools = SdkTools::from_paths("/sdk/cmdline-tools/latest/bin/avdmanager", "emulator", "adb");
        let ctx = AvdContext::new(Arc::new(tools), runner, Arc::new(FakeBridge::default()));
        Catalog::new(Arc::new(ctx))
    }

    fn listing_runner() -> Arc<FakeRunner> {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(&["list", "target"], CommandOutput::ok(TARGET_LIST));
        runner.respond(&["list", "device"], CommandOutput::ok(DEVICE_LIST));
        runner.respond(&["list", "avd"], CommandOutput::ok(AVD_LIST));
        runner
    }

    #[tokio::test]
    async fn test_list_targets() {
        let runner = listing_runner();
        let targets = catalog(runner.clone()).list_targets().await.unwrap();

        assert_eq!(
            targets.iter().map(|t| (t.id, t.api_level)).collect::<Vec<_>>(),
            vec![(1, Some(34)), (2, Some(33))]
        );
        assert_eq!(
            runner.commands(),
            vec![vec!["/sdk/cmdline-tools/latest/bin/avdmanager", "list", "target"]]
        );
    }

    #[tokio::test]
    async fn test_no_caching() {
        let runner = listing_runner();
        let catalog = catalog(runner.clone());

        let first = catalog.list_devices().await.unwrap();
        let second = catalog.list_devices().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_listing_is_tolerated() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(&["list"], CommandOutput::failed(1, "Error: java not found"));

        let targets = catalog(runner).list_targets().await.unwrap();
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn test_bad_number_is_fatal() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            &["list", "target"],
            CommandOutput::ok("----------\nid: 1 or \"android-V\"\n    API level: V\n"),
        );

        let err = catalog(runner).list_targets().await.unwrap_err();
        assert!(matches!(err, AvdError::Parse(_)));
    }

    #[tokio::test]
    async fn test_virtual_devices_resolve_aliases() {
        let runner = listing_runner();
        let avds = catalog(runner.clone()).list_virtual_devices().await.unwrap();

        let summary: Vec<_> = avds
            .iter()
            .map(|avd| (avd.name(), avd.device().map(|d| d.alias.as_str())))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("demo", Some("pixel")),
                ("Pixel_4_API_34", Some("Nexus_5X")),
                ("orphan", None),
            ]
        );
        assert!(avds.iter().all(|avd| avd.state() == LifecycleState::Bound));
        assert_eq!(avds[1].details().abi.as_deref(), Some("default/x86_64"));
        assert!(avds[1]
            .details()
            .based_on
            .as_deref()
            .is_some_and(|b| b.starts_with("Android 34")));

        // One device listing for the whole call
        let device_listings = runner
            .commands()
            .iter()
            .filter(|c| c.last().map(String::as_str) == Some("device"))
            .count();
        assert_eq!(device_listings, 1);
    }

    #[tokio::test]
    async fn test_find_virtual_device() {
        let catalog = catalog(listing_runner());

        let avd = catalog.find_virtual_device("Pixel_4_API_34").await.unwrap().unwrap();
        assert_eq!(avd.details().sdcard_size.as_deref(), Some("512M"));
        assert!(catalog.find_virtual_device("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_device() {
        let runner = listing_runner();
        let catalog = catalog(runner.clone());

        assert_eq!(catalog.resolve_device(&"Nexus_5X".into()).await.unwrap(), 1);
        assert_eq!(catalog.resolve_device(&"Google Pixel".into()).await.unwrap(), 0);
        assert_eq!(catalog.resolve_device(&DeviceRef::Id(7)).await.unwrap(), 7);
        assert!(matches!(
            catalog.resolve_device(&"watch".into()).await,
            Err(AvdError::InvalidArgument(_))
        ));
        assert_eq!(runner.commands().len(), 3);
    }
}
