//! Scripted collaborators for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::adb::{AdbError, DeviceBridge};
use crate::device::ConnectedDevice;
use crate::process::{CommandOutput, CommandRunner, ProcessError, ProcessHandle};

pub const TARGET_LIST: &str = "\
Available Android targets:
----------
id: 1 or \"android-34\"
     Name: Android API 34
     Type: Platform
     API level: 34
     Revision: 2
----------
id: 2 or \"android-33\"
     Name: Android API 33
     Type: Platform
     API level: 33
     Revision: 3
";

pub const DEVICE_LIST: &str = "\
Available devices definitions:
---------
id: 0 or \"pixel\"
    Name: Google Pixel
    OEM : Google
    Tag : google
---------
id: 1 or \"Nexus_5X\"
    Name: Nexus 5X
    OEM : Google
";

pub const AVD_LIST: &str = "\
Available Android Virtual Devices:
    Name: demo
  Device: pixel (Google)
    Path: /home/me/.android/avd/demo.avd
  Target: Google APIs (Google Inc.)
          Based on: Android 14.0 (\"UpsideDownCake\") Tag/ABI: google_apis/x86_64
---------
    Name: Pixel_4_API_34
  Device: Nexus_5X (Google)
    Path: /home/me/.android/avd/Pixel_4_API_34.avd
  Target: Default Android System Image
          Based on: Android 34.0.0 Tag/ABI: default/x86_64
  Sdcard: 512M
---------
    Name: orphan
  Device: tv_4k [custom]
    Path: /home/me/.android/avd/orphan.avd
";

enum Reply {
    Output(CommandOutput),
    Timeout,
}

/// Records every command and answers from a table of argument patterns
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<Vec<(Vec<String>, Reply)>>,
    commands: Mutex<Vec<Vec<String>>>,
    spawned: Mutex<Vec<Vec<String>>>,
    kills: Arc<AtomicUsize>,
    kill_fails: Arc<AtomicBool>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` as a contiguous run of arguments
    pub fn respond(&self, pattern: &[&str], output: CommandOutput) {
        self.replies
            .lock()
            .unwrap()
            .push((pattern.iter().map(|s| s.to_string()).collect(), Reply::Output(output)));
    }

    /// Make commands containing `pattern` time out
    pub fn time_out(&self, pattern: &[&str]) {
        self.replies
            .lock()
            .unwrap()
            .push((pattern.iter().map(|s| s.to_string()).collect(), Reply::Timeout));
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.spawned.lock().unwrap().clone()
    }

    /// Make every `kill` on spawned processes fail
    pub fn fail_kills(&self) {
        self.kill_fails.store(true, Ordering::SeqCst);
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

fn contains_run(argv: &[String], pattern: &[String]) -> bool {
    pattern.is_empty() || argv[1..].windows(pattern.len()).any(|w| w == pattern)
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError> {
        self.commands.lock().unwrap().push(argv.to_vec());

        let replies = self.replies.lock().unwrap();
        match replies.iter().find(|(pattern, _)| contains_run(argv, pattern)) {
            Some((_, Reply::Output(output))) => Ok(output.clone()),
            Some((_, Reply::Timeout)) => Err(ProcessError::Timeout {
                command: argv.join(" "),
                timeout: timeout.unwrap_or_default(),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        self.spawned.lock().unwrap().push(argv.to_vec());
        Ok(Box::new(FakeProcess {
            exited: false,
            kills: self.kills.clone(),
            kill_fails: self.kill_fails.clone(),
        }))
    }
}

struct FakeProcess {
    exited: bool,
    kills: Arc<AtomicUsize>,
    kill_fails: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        (!self.exited).then_some(4242)
    }

    fn has_exited(&mut self) -> Result<bool, ProcessError> {
        Ok(self.exited)
    }

    async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        self.exited = true;
        Ok(Some(0))
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        if self.kill_fails.load(Ordering::SeqCst) {
            return Err(ProcessError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.exited = true;
        Ok(())
    }
}

/// Serves a fixed device list and a script of `getprop` answers.
///
/// `None` entries in the script are transient shell errors; once the
/// script runs out the last entry repeats.
#[derive(Default)]
pub struct FakeBridge {
    devices: Vec<ConnectedDevice>,
    script: Mutex<VecDeque<Option<String>>>,
    last: Mutex<Option<String>>,
}

impl FakeBridge {
    pub fn new(devices: Vec<ConnectedDevice>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn with_script(self, script: &[Option<&str>]) -> Self {
        *self.script.lock().unwrap() = script.iter().map(|s| s.map(str::to_string)).collect();
        self
    }
}

#[async_trait]
impl DeviceBridge for FakeBridge {
    async fn list_connected(&self, _extended: bool) -> Result<Vec<ConnectedDevice>, AdbError> {
        Ok(self.devices.clone())
    }

    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        if !self.devices.iter().any(|d| d.serial == serial) {
            return Err(AdbError::DeviceNotFound(serial.to_string()));
        }

        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(entry) = script.pop_front() {
                *last = entry.clone();
            }
            last.clone()
        };
        next.ok_or_else(|| AdbError::CommandFailed {
            command: format!("adb -s {} shell {}", serial, args.join(" ")),
            message: "device offline".to_string(),
        })
    }
}
