#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use agent_bridge::TurnId;
use agent_bridge_mock::{MockStep, ScriptedBridge};
use embedr_session::{GuiHost, SessionConfig, StreamController, UiEvent};
use tempfile::TempDir;

pub const THREAD: &str = "thread-1";

#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<(TurnId, UiEvent)>>,
    credential_requests: AtomicUsize,
}

impl RecordingHost {
    pub fn events(&self) -> Vec<(TurnId, UiEvent)> {
        lock_unpoisoned(&self.events).clone()
    }

    pub fn events_for(&self, turn_id: TurnId) -> Vec<UiEvent> {
        self.events()
            .into_iter()
            .filter(|(id, _)| *id == turn_id)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn terminal_events(&self) -> Vec<(TurnId, UiEvent)> {
        self.events()
            .into_iter()
            .filter(|(_, event)| event.is_terminal())
            .collect()
    }

    pub fn credential_requests(&self) -> usize {
        self.credential_requests.load(Ordering::SeqCst)
    }
}

impl GuiHost for RecordingHost {
    fn emit(&self, turn_id: TurnId, event: UiEvent) {
        lock_unpoisoned(&self.events).push((turn_id, event));
    }

    fn request_credential(&self) {
        self.credential_requests.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub project: PathBuf,
    pub bridge: Arc<ScriptedBridge>,
    pub host: Arc<RecordingHost>,
    pub controller: Arc<StreamController>,
}

impl Harness {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self::with_bridge(ScriptedBridge::new(steps), test_config())
    }

    pub fn with_bridge(bridge: ScriptedBridge, config: SessionConfig) -> Self {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let project = temp.path().join("blink");
        fs::create_dir_all(&project).expect("project dir should be created");
        fs::write(project.join("blink.ino"), "void setup() {}\nvoid loop() {}\n")
            .expect("sketch should be written");

        let bridge = Arc::new(bridge);
        let host = Arc::new(RecordingHost::default());
        let controller = StreamController::new(config, bridge.clone(), host.clone());
        Self {
            temp,
            project,
            bridge,
            host,
            controller,
        }
    }

    pub fn with_credential(self) -> Self {
        self.controller
            .set_credential("test-token", SystemTime::now() + Duration::from_secs(3600))
            .expect("credential should be accepted");
        self
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.project.join(".versions")
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        credential_timeout: Duration::from_millis(200),
        supersede_wait: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

pub fn snapshot_files(versions_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(versions_dir)
        .expect("versions dir should be readable")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.file_name().is_some_and(|name| name != "index.json"))
        .collect();
    files.sort();
    files
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
