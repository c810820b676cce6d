//! Catalog Records
//!
//! The three record kinds produced from `avdmanager list target|device|avd`,
//! each with its builder and field table.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::{parse_number, FieldSetter, ParseError, Record};

/// An installable platform image definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: u32,
    pub alias: String,
    pub name: Option<String>,
    pub target_type: Option<String>,
    pub api_level: Option<u32>,
    pub revision: Option<u32>,
}

#[derive(Debug, Default)]
pub struct TargetBuilder {
    id: Option<(u32, String)>,
    name: Option<String>,
    target_type: Option<String>,
    api_level: Option<u32>,
    revision: Option<u32>,
}

impl TargetBuilder {
    fn name(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.name, value)
    }

    fn target_type(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.target_type, value)
    }

    fn api_level(&mut self, value: &str) -> Result<(), ParseError> {
        self.api_level = Some(parse_number("API level", value)?);
        Ok(())
    }

    fn revision(&mut self, value: &str) -> Result<(), ParseError> {
        self.revision = Some(parse_number("Revision", value)?);
        Ok(())
    }
}

impl Record for Target {
    type Builder = TargetBuilder;

    const FIELDS: &'static [(&'static str, FieldSetter<TargetBuilder>)] = &[
        ("NAME", TargetBuilder::name),
        ("TYPE", TargetBuilder::target_type),
        ("API LEVEL", TargetBuilder::api_level),
        ("REVISION", TargetBuilder::revision),
    ];

    fn set_identifier(builder: &mut TargetBuilder, id: u32, alias: &str) {
        builder.id = Some((id, alias.to_string()));
    }

    fn finish(builder: TargetBuilder) -> Option<Self> {
        let (id, alias) = builder.id?;
        Some(Target {
            id,
            alias,
            name: builder.name,
            target_type: builder.target_type,
            api_level: builder.api_level,
            revision: builder.revision,
        })
    }
}

/// A hardware profile definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: u32,
    pub alias: String,
    pub name: Option<String>,
    pub oem: Option<String>,
    pub tag: String,
}

#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<(u32, String)>,
    name: Option<String>,
    oem: Option<String>,
    tag: String,
}

impl DeviceBuilder {
    fn name(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.name, value)
    }

    fn oem(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.oem, value)
    }

    fn tag(&mut self, value: &str) -> Result<(), ParseError> {
        self.tag = value.to_string();
        Ok(())
    }
}

impl Record for Device {
    type Builder = DeviceBuilder;

    const FIELDS: &'static [(&'static str, FieldSetter<DeviceBuilder>)] = &[
        ("NAME", DeviceBuilder::name),
        ("OEM", DeviceBuilder::oem),
        ("TAG", DeviceBuilder::tag),
    ];

    fn set_identifier(builder: &mut DeviceBuilder, id: u32, alias: &str) {
        builder.id = Some((id, alias.to_string()));
    }

    fn finish(builder: DeviceBuilder) -> Option<Self> {
        let (id, alias) = builder.id?;
        Some(Device {
            id,
            alias,
            name: builder.name,
            oem: builder.oem,
            tag: builder.tag,
        })
    }
}

impl Device {
    /// Whether `reference` names this device by alias or display name
    pub fn matches(&self, reference: &str) -> bool {
        self.alias == reference || self.name.as_deref() == Some(reference)
    }
}

/// One entry of `avdmanager list avd`, exactly as listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvdEntry {
    pub name: String,
    /// Device alias with its display annotation removed
    pub device_alias: Option<String>,
    pub path: Option<PathBuf>,
    pub target: Option<String>,
    pub skin: Option<String>,
    pub sdcard_size: Option<String>,
    /// Base image descriptor, e.g. `Android 14.0 ("UpsideDownCake")`
    pub based_on: Option<String>,
    /// `<tag>/<abi>`, e.g. `google_apis/x86_64`
    pub abi: Option<String>,
}

#[derive(Debug, Default)]
pub struct AvdEntryBuilder {
    name: Option<String>,
    device_alias: Option<String>,
    path: Option<PathBuf>,
    target: Option<String>,
    skin: Option<String>,
    sdcard_size: Option<String>,
    based_on: Option<String>,
    abi: Option<String>,
}

impl AvdEntryBuilder {
    fn name(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.name, value)
    }

    fn device(&mut self, value: &str) -> Result<(), ParseError> {
        let alias = strip_annotation(value);
        self.device_alias = (!alias.is_empty()).then_some(alias);
        Ok(())
    }

    fn path(&mut self, value: &str) -> Result<(), ParseError> {
        self.path = (!value.is_empty()).then(|| PathBuf::from(value));
        Ok(())
    }

    fn target(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.target, value)
    }

    fn skin(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.skin, value)
    }

    fn sdcard(&mut self, value: &str) -> Result<(), ParseError> {
        set_text(&mut self.sdcard_size, value)
    }

    /// `Android 14.0 Tag/ABI: google_apis/x86_64` carries two fields
    fn based_on(&mut self, value: &str) -> Result<(), ParseError> {
        if let Some(caps) = BASED_ON_RE.captures(value) {
            self.based_on = Some(caps["base"].trim().to_string());
            self.abi = Some(caps["abi"].trim().to_string());
        }
        Ok(())
    }
}

impl Record for AvdEntry {
    type Builder = AvdEntryBuilder;

    const FIELDS: &'static [(&'static str, FieldSetter<AvdEntryBuilder>)] = &[
        ("NAME", AvdEntryBuilder::name),
        ("DEVICE", AvdEntryBuilder::device),
        ("PATH", AvdEntryBuilder::path),
        ("TARGET", AvdEntryBuilder::target),
        ("SKIN", AvdEntryBuilder::skin),
        ("SDCARD", AvdEntryBuilder::sdcard),
        ("BASED ON", AvdEntryBuilder::based_on),
    ];

    fn set_identifier(_builder: &mut AvdEntryBuilder, _id: u32, _alias: &str) {}

    fn finish(builder: AvdEntryBuilder) -> Option<Self> {
        Some(AvdEntry {
            name: builder.name?,
            device_alias: builder.device_alias,
            path: builder.path,
            target: builder.target,
            skin: builder.skin,
            sdcard_size: builder.sdcard_size,
            based_on: builder.based_on,
            abi: builder.abi,
        })
    }
}

fn set_text(slot: &mut Option<String>, value: &str) -> Result<(), ParseError> {
    *slot = Some(value.to_string());
    Ok(())
}

static BASED_ON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>.+?)\s+Tag/ABI:\s+(?P<abi>.+)$").expect("valid regex"));

static ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[(][^\[\]()]*[\])]").expect("valid regex"));

/// Remove the first parenthetical or bracketed annotation from a device field.
///
/// `pixel (Google)` becomes `pixel`. Annotations are not nested.
pub fn strip_annotation(value: &str) -> String {
    ANNOTATION_RE.replace(value, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_records, RecordParser};

    const TARGET_LIST: &str = "
Available Android targets:
----------
id: 1 or \"android-34\"
    Name: Android 14
    Type: Platform
    API level: 34
    Revision: 1
----------
id: 2 or \"android-33\"
    Name: Android 13
    Type: Platform
    API level: 33
    Revision: 2
";

    const DEVICE_LIST: &str = "
Available devices definitions:
---------
id: 0 or \"pixel\"
    Name: Pixel 4
    OEM : Google
    Tag : google
---------
id: 1 or \"Nexus_5X\"
    Name: Nexus 5X
    OEM : Google
";

    const AVD_LIST: &str = "
Available Android Virtual Devices:
    Name: Pixel_4_API_34
  Device: pixel (Google Pixel 4)
    Path: /tmp/.android/avd/Pixel_4_API_34.avd
  Target: Google APIs (Google Inc.)
          Based on: Android 14.0 (\"UpsideDownCake\") Tag/ABI: google_apis/x86_64
    Skin: pixel_4
  Sdcard: 512M
---------
    Name: bare
    Path: /tmp/.android/avd/bare.avd
";

    #[test]
    fn test_target_parse_order() {
        let targets: Vec<Target> = parse_records(TARGET_LIST).unwrap();
        assert_eq!(
            targets.iter().map(|t| (t.id, t.api_level)).collect::<Vec<_>>(),
            vec![(1, Some(34)), (2, Some(33))]
        );
        assert_eq!(targets[0].alias, "android-34");
        assert_eq!(targets[0].name.as_deref(), Some("Android 14"));
        assert_eq!(targets[1].revision, Some(2));
        assert_eq!(targets[1].target_type.as_deref(), Some("Platform"));
    }

    #[test]
    fn test_target_bad_api_level() {
        let text = "----------\nid: 5 or \"android-Baklava\"\n    API level: Baklava\n";
        let err = parse_records::<Target>(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidNumber {
                field: "API level",
                value: "Baklava".into()
            }
        );
    }

    #[test]
    fn test_device_parse() {
        let devices: Vec<Device> = parse_records(DEVICE_LIST).unwrap();
        assert_eq!(
            devices.iter().map(|d| d.alias.as_str()).collect::<Vec<_>>(),
            vec!["pixel", "Nexus_5X"]
        );
        assert_eq!(devices[0].oem.as_deref(), Some("Google"));
        assert_eq!(devices[0].tag, "google");
        assert_eq!(devices[1].tag, "");
        assert!(devices[1].matches("Nexus 5X"));
        assert!(devices[1].matches("Nexus_5X"));
    }

    #[test]
    fn test_avd_parse() {
        let avds: Vec<AvdEntry> = parse_records(AVD_LIST).unwrap();
        assert_eq!(avds.len(), 2);

        let avd = &avds[0];
        assert_eq!(avd.name, "Pixel_4_API_34");
        assert_eq!(avd.device_alias.as_deref(), Some("pixel"));
        assert_eq!(
            avd.path.as_deref(),
            Some(std::path::Path::new("/tmp/.android/avd/Pixel_4_API_34.avd"))
        );
        assert_eq!(avd.based_on.as_deref(), Some("Android 14.0 (\"UpsideDownCake\")"));
        assert_eq!(avd.abi.as_deref(), Some("google_apis/x86_64"));
        assert_eq!(avd.sdcard_size.as_deref(), Some("512M"));
        assert_eq!(avd.skin.as_deref(), Some("pixel_4"));

        assert_eq!(avds[1].name, "bare");
        assert_eq!(avds[1].device_alias, None);
        assert_eq!(avds[1].abi, None);
    }

    #[test]
    fn test_avd_without_name_dropped() {
        let avds: Vec<AvdEntry> =
            parse_records("---------\n  Device: pixel\n  Path: /x.avd\n---------\n").unwrap();
        assert!(avds.is_empty());
    }

    #[test]
    fn test_based_on_without_separator() {
        let avds: Vec<AvdEntry> = parse_records("Name: a\nBased on: Android 14.0\n").unwrap();
        assert_eq!(avds[0].based_on, None);
        assert_eq!(avds[0].abi, None);
    }

    #[test]
    fn test_strip_annotation() {
        assert_eq!(strip_annotation("pixel (Google Pixel 4)"), "pixel");
        assert_eq!(strip_annotation("pixel_7 [custom]"), "pixel_7");
        assert_eq!(strip_annotation("tv_1080p (Google) (extra)"), "tv_1080p  (extra)");
        assert_eq!(strip_annotation("plain"), "plain");
    }

    #[test]
    fn test_lazy_iteration_stops_early() {
        let mut parser = RecordParser::<_, Target>::new(TARGET_LIST.lines());
        let first = parser.next().unwrap().unwrap();
        assert_eq!(first.id, 1);
    }
}
