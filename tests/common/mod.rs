//! Shared helpers for integration tests: on-disk archive fixtures and
//! recording host collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use semver::Version;
use zip::write::{SimpleFileOptions, ZipWriter};

use strobe_addons::core::{HostInfo, ModuleId};
use strobe_addons::registry::{
    ActiveRuleRegistry, ActiveScanRule, Extension, ExtensionRegistry, HostCollaborators,
    PassiveRuleRegistry, PassiveScanRule,
};

/// Initialize test logging once; `RUST_LOG` controls the filter.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The host every integration test runs under: version 2.4.0, runtime 17.
pub fn host() -> HostInfo {
    HostInfo::new(Version::new(2, 4, 0), 17)
}

/// Write a module archive with the given metadata document and extra
/// entries. Returns the archive path.
pub fn write_module_archive(
    dir: &Path,
    file_name: &str,
    metadata: &str,
    entries: &[(&str, &str)],
) -> PathBuf {
    let path = dir.join(file_name);
    let file = File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    writer.start_file("addon.toml", SimpleFileOptions::default()).unwrap();
    writer.write_all(metadata.as_bytes()).unwrap();
    for (entry_name, content) in entries {
        writer.start_file(*entry_name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// An event log shared between the test and the recording collaborators.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record(events: &EventLog, event: impl Into<String>) {
    events.lock().unwrap_or_else(PoisonError::into_inner).push(event.into());
}

pub fn events_of(events: &EventLog) -> Vec<String> {
    events.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

pub struct RecordingExtensions {
    events: EventLog,
    held: Mutex<HashMap<ModuleId, Vec<Arc<dyn Extension>>>>,
}

impl ExtensionRegistry for RecordingExtensions {
    fn add_extension(&self, module: &ModuleId, extension: Arc<dyn Extension>) {
        record(&self.events, format!("add-ext:{}:{}", module, extension.name()));
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(module.clone())
            .or_default()
            .push(extension);
    }

    fn remove_extensions(&self, module: &ModuleId) -> Vec<Arc<dyn Extension>> {
        record(&self.events, format!("remove-exts:{module}"));
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module)
            .unwrap_or_default()
    }
}

pub struct RecordingActiveRules {
    events: EventLog,
    names: Mutex<Vec<String>>,
}

impl ActiveRuleRegistry for RecordingActiveRules {
    fn add_rule(&self, name: &str, _rule: Arc<dyn ActiveScanRule>) {
        record(&self.events, format!("add-active:{name}"));
        self.names.lock().unwrap_or_else(PoisonError::into_inner).push(name.to_string());
    }

    fn remove_rule(&self, name: &str) -> bool {
        record(&self.events, format!("remove-active:{name}"));
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        names.iter().position(|n| n == name).map(|i| names.remove(i)).is_some()
    }
}

pub struct RecordingPassiveRules {
    events: EventLog,
    names: Mutex<Vec<String>>,
}

impl PassiveRuleRegistry for RecordingPassiveRules {
    fn add_rule(&self, name: &str, _rule: Arc<dyn PassiveScanRule>) {
        record(&self.events, format!("add-passive:{name}"));
        self.names.lock().unwrap_or_else(PoisonError::into_inner).push(name.to_string());
    }

    fn remove_rule(&self, name: &str) -> bool {
        record(&self.events, format!("remove-passive:{name}"));
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        names.iter().position(|n| n == name).map(|i| names.remove(i)).is_some()
    }
}

/// Collaborators whose calls land in the shared event log.
pub fn recording_collaborators(events: &EventLog) -> HostCollaborators {
    HostCollaborators {
        extensions: Arc::new(RecordingExtensions {
            events: Arc::clone(events),
            held: Mutex::new(HashMap::new()),
        }),
        active_rules: Arc::new(RecordingActiveRules {
            events: Arc::clone(events),
            names: Mutex::new(Vec::new()),
        }),
        passive_rules: Arc::new(RecordingPassiveRules {
            events: Arc::clone(events),
            names: Mutex::new(Vec::new()),
        }),
        ui: None,
    }
}

/// A minimal extension for factory registration in tests.
pub struct StubExtension(pub &'static str);

impl Extension for StubExtension {
    fn name(&self) -> &str {
        self.0
    }
}

/// A minimal scan rule for factory registration in tests.
pub struct StubRule(pub &'static str);

impl ActiveScanRule for StubRule {
    fn name(&self) -> &str {
        self.0
    }
}

impl PassiveScanRule for StubRule {
    fn name(&self) -> &str {
        self.0
    }
}
