//! Full lifecycle integration tests: startup scan, dynamic add and remove,
//! the loader delegation graph, and the persisted block list.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{
    events_of, host, new_event_log, recording_collaborators, write_module_archive, StubExtension,
    StubRule,
};
use strobe_addons::catalog::InstallStatus;
use strobe_addons::core::{ModuleId, RuntimeError};
use strobe_addons::loader::{DefinitionOrigin, HostLoader};
use strobe_addons::registry::FactoryRegistry;
use strobe_addons::runtime::ModuleRuntime;

struct TestBed {
    _root: tempfile::TempDir,
    home: PathBuf,
    addons: PathBuf,
    events: common::EventLog,
}

impl TestBed {
    fn new() -> Self {
        common::init_logging();
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let addons = root.path().join("addons");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&addons).unwrap();
        Self {
            _root: root,
            home,
            addons,
            events: new_event_log(),
        }
    }

    fn start(&self, factories: FactoryRegistry) -> ModuleRuntime {
        self.start_with_host_loader(factories, HostLoader::new())
    }

    fn start_with_host_loader(
        &self,
        factories: FactoryRegistry,
        host_loader: HostLoader,
    ) -> ModuleRuntime {
        ModuleRuntime::start(
            host(),
            self.home.clone(),
            vec![self.addons.clone()],
            Arc::new(host_loader),
            Arc::new(factories),
            recording_collaborators(&self.events),
            false,
        )
        .unwrap()
    }
}

#[test]
fn startup_scans_builds_loaders_and_installs_missing_files() {
    let bed = TestBed::new();
    write_module_archive(
        &bed.addons,
        "wordlists-release-2.sap",
        r#"files = ["payloads/common.txt"]"#,
        &[("payloads/common.txt", "admin\nroot\n")],
    );

    let runtime = bed.start(FactoryRegistry::new());

    assert_eq!(runtime.catalog().len(), 1);
    assert!(runtime.loader(&ModuleId::new("wordlists")).is_some());
    assert_eq!(
        std::fs::read(bed.home.join("payloads/common.txt")).unwrap(),
        b"admin\nroot\n"
    );

    let module = runtime.catalog().module("wordlists").unwrap();
    assert_eq!(module.install_status(), InstallStatus::Installed);
}

#[test]
fn startup_never_overwrites_existing_shipped_files() {
    let bed = TestBed::new();
    write_module_archive(
        &bed.addons,
        "wordlists-release-2.sap",
        r#"files = ["payloads/common.txt"]"#,
        &[("payloads/common.txt", "from archive")],
    );
    std::fs::create_dir_all(bed.home.join("payloads")).unwrap();
    std::fs::write(bed.home.join("payloads/common.txt"), b"user edited").unwrap();

    let _runtime = bed.start(FactoryRegistry::new());

    assert_eq!(
        std::fs::read(bed.home.join("payloads/common.txt")).unwrap(),
        b"user edited"
    );
}

#[test]
fn module_archive_copy_shadows_host_component() {
    let bed = TestBed::new();
    write_module_archive(
        &bed.addons,
        "shadower-release-1.sap",
        r#"extensions = ["ext.Shared"]"#,
        &[("ext/Shared.def", "module copy")],
    );

    let mut host_loader = HostLoader::new();
    host_loader.register_component("ext.Shared", b"host copy".to_vec());
    let runtime = bed.start_with_host_loader(FactoryRegistry::new(), host_loader);

    let loader = runtime.loader(&ModuleId::new("shadower")).unwrap();
    let def = loader.find_component("ext.Shared").unwrap();
    assert_eq!(def.bytes(), b"module copy");
    assert_eq!(def.origin(), &DefinitionOrigin::Module(ModuleId::new("shadower")));
}

#[test]
fn dependency_loaders_are_wired_across_the_scan() {
    let bed = TestBed::new();
    write_module_archive(
        &bed.addons,
        "consumer-release-1.sap",
        "[[dependencies.addons]]\nid = \"provider\"",
        &[],
    );
    write_module_archive(
        &bed.addons,
        "provider-release-1.sap",
        "",
        &[("provider/Util.def", "util definition")],
    );

    let runtime = bed.start(FactoryRegistry::new());
    let consumer = runtime.loader(&ModuleId::new("consumer")).unwrap();
    let def = consumer.find_component("provider.Util").unwrap();
    assert_eq!(def.origin(), &DefinitionOrigin::Module(ModuleId::new("provider")));
}

#[test]
fn cyclic_modules_are_pruned_at_startup() {
    let bed = TestBed::new();
    write_module_archive(&bed.addons, "a-release-1.sap", "[[dependencies.addons]]\nid = \"b\"", &[]);
    write_module_archive(&bed.addons, "b-release-1.sap", "[[dependencies.addons]]\nid = \"c\"", &[]);
    write_module_archive(&bed.addons, "c-release-1.sap", "[[dependencies.addons]]\nid = \"a\"", &[]);
    write_module_archive(&bed.addons, "clean-release-1.sap", "", &[]);

    let runtime = bed.start(FactoryRegistry::new());

    assert_eq!(runtime.catalog().len(), 1);
    assert!(runtime.catalog().contains("clean"));
    assert_eq!(runtime.pruned_modules().len(), 3);
    for id in ["a", "b", "c"] {
        assert!(runtime.loader(&ModuleId::new(id)).is_none());
    }
}

#[test]
fn legacy_flat_archives_join_the_host_aggregate_path() {
    let bed = TestBed::new();
    common::write_module_archive(&bed.addons, "old-plugin.zip", "", &[("legacy/Probe.def", "legacy")]);

    let runtime = bed.start(FactoryRegistry::new());
    assert_eq!(runtime.host_loader().legacy_archive_count(), 1);
    let def = runtime.host_loader().find_component("legacy.Probe").unwrap();
    assert!(matches!(def.origin(), DefinitionOrigin::LegacyArchive(_)));
}

#[test]
fn add_module_rejects_incompatible_archives() {
    let bed = TestBed::new();
    let mut runtime = bed.start(FactoryRegistry::new());

    let archive = write_module_archive(
        &bed.addons,
        "futuristic-release-1.sap",
        "not-before-version = \"9.0.0\"",
        &[],
    );
    let err = runtime.add_module(&archive).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::VersionIncompatible { .. })
    ));
    assert!(!runtime.catalog().contains("futuristic"));
}

#[test]
fn add_module_is_a_noop_for_present_ids() {
    let bed = TestBed::new();
    write_module_archive(&bed.addons, "dup-release-1.sap", r#"files = ["a.txt"]"#, &[("a.txt", "x")]);
    let mut runtime = bed.start(FactoryRegistry::new());

    let again = write_module_archive(
        &bed.addons,
        "dup-release-2.sap",
        r#"files = ["a.txt"]"#,
        &[("a.txt", "x")],
    );
    assert!(!runtime.add_module(&again).unwrap());
    assert_eq!(runtime.catalog().module("dup").unwrap().descriptor().package_version(), 1);
}

#[test]
fn add_module_installs_artifacts() {
    let bed = TestBed::new();
    let mut factories = FactoryRegistry::new();
    factories.register_extension("ext.Logger", || Arc::new(StubExtension("logger")));
    factories.register_active_rule("rules.Probe", || Arc::new(StubRule("probe")));
    let mut runtime = bed.start(factories);

    let archive = write_module_archive(
        &bed.addons,
        "logger-release-1.sap",
        r#"
        extensions = ["ext.Logger"]
        ascanrules = ["rules.Probe"]
        "#,
        &[("ext/Logger.def", "d"), ("rules/Probe.def", "d")],
    );
    assert!(runtime.add_module(&archive).unwrap());

    let events = events_of(&bed.events);
    assert!(events.contains(&"add-ext:logger:logger".to_string()));
    assert!(events.contains(&"add-active:rules.Probe".to_string()));
    assert_eq!(
        runtime.catalog().module("logger").unwrap().install_status(),
        InstallStatus::Installed
    );
    assert!(runtime.loader(&ModuleId::new("logger")).is_some());
}

#[test]
fn static_modules_are_added_without_a_loader() {
    let bed = TestBed::new();
    let mut runtime = bed.start(FactoryRegistry::new());

    let archive = write_module_archive(&bed.addons, "static-release-1.sap", "", &[]);
    assert!(runtime.add_module(&archive).unwrap());
    assert!(runtime.catalog().contains("static"));
    assert!(runtime.loader(&ModuleId::new("static")).is_none());
}

#[test]
fn remove_module_uninstalls_and_deletes_the_archive() {
    let bed = TestBed::new();
    let mut factories = FactoryRegistry::new();
    factories.register_active_rule("rules.Probe", || Arc::new(StubRule("probe")));
    let archive = write_module_archive(
        &bed.addons,
        "probes-release-1.sap",
        r#"
        ascanrules = ["rules.Probe"]
        files = ["payloads/p.txt"]
        "#,
        &[("rules/Probe.def", "d"), ("payloads/p.txt", "payload")],
    );
    let mut runtime = bed.start(factories);
    assert!(bed.home.join("payloads/p.txt").exists());

    assert!(runtime.remove_module(&ModuleId::new("probes"), false).unwrap());

    let events = events_of(&bed.events);
    assert!(events.contains(&"remove-active:rules.Probe".to_string()));
    assert!(!bed.home.join("payloads/p.txt").exists());
    assert!(!archive.exists());
    assert!(!runtime.catalog().contains("probes"));
    assert!(runtime.loader(&ModuleId::new("probes")).is_none());
    assert!(runtime.blocked_ids().is_empty());
}

#[test]
fn remove_module_rejects_absent_and_static_modules() {
    let bed = TestBed::new();
    write_module_archive(&bed.addons, "static-release-1.sap", "", &[]);
    let mut runtime = bed.start(FactoryRegistry::new());

    let err = runtime.remove_module(&ModuleId::new("ghost"), false).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::ModuleNotPresent { .. })
    ));

    let err = runtime.remove_module(&ModuleId::new("static"), false).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::ModuleNotDynamic { .. })
    ));
}

#[test]
fn removing_a_dependency_closes_dependent_loaders_first() {
    let bed = TestBed::new();
    write_module_archive(
        &bed.addons,
        "consumer-release-1.sap",
        "[[dependencies.addons]]\nid = \"provider\"\n\nfiles = [\"c.txt\"]",
        &[("c.txt", "x")],
    );
    write_module_archive(
        &bed.addons,
        "provider-release-1.sap",
        r#"files = ["p.txt"]"#,
        &[("p.txt", "x")],
    );
    let mut runtime = bed.start(FactoryRegistry::new());

    let consumer_loader = Arc::clone(runtime.loader(&ModuleId::new("consumer")).unwrap());
    assert!(runtime.remove_module(&ModuleId::new("provider"), false).unwrap());

    assert!(consumer_loader.is_closed());
    assert!(runtime.loader(&ModuleId::new("consumer")).is_none());
    assert!(!bed.addons.join("provider-release-1.sap").exists());
}

#[test]
fn undeletable_archive_lands_on_the_block_list_and_stays_excluded() {
    let bed = TestBed::new();
    let archive = write_module_archive(
        &bed.addons,
        "locked-release-1.sap",
        r#"files = ["l.txt"]"#,
        &[("l.txt", "x")],
    );
    let mut runtime = bed.start(FactoryRegistry::new());
    let id = ModuleId::new("locked");

    // Make the backing path undeletable by replacing the file with a
    // non-empty directory of the same name.
    std::fs::remove_file(&archive).unwrap();
    std::fs::create_dir(&archive).unwrap();
    std::fs::write(archive.join("occupant"), b"x").unwrap();

    assert!(!runtime.remove_module(&id, false).unwrap());
    assert_eq!(runtime.blocked_ids(), vec![id.clone()]);
    drop(runtime);

    // Restore a real archive file at the same path; the id must still be
    // excluded from the rescan because it is blocked.
    std::fs::remove_file(archive.join("occupant")).unwrap();
    std::fs::remove_dir(&archive).unwrap();
    let archive = write_module_archive(
        &bed.addons,
        "locked-release-1.sap",
        r#"files = ["l.txt"]"#,
        &[("l.txt", "x")],
    );
    let mut runtime = bed.start(FactoryRegistry::new());
    assert!(!runtime.catalog().contains("locked"));
    assert_eq!(runtime.blocked_ids(), vec![id.clone()]);

    // An explicit add reinstates the module and clears the block list entry.
    assert!(runtime.add_module(&archive).unwrap());
    assert!(runtime.catalog().contains("locked"));
    assert!(runtime.blocked_ids().is_empty());
}

#[test]
fn upgrade_removal_does_not_block_undeletable_archives() {
    let bed = TestBed::new();
    let archive = write_module_archive(
        &bed.addons,
        "upgraded-release-1.sap",
        r#"files = ["u.txt"]"#,
        &[("u.txt", "x")],
    );
    let mut runtime = bed.start(FactoryRegistry::new());

    std::fs::remove_file(&archive).unwrap();
    std::fs::create_dir(&archive).unwrap();
    std::fs::write(archive.join("occupant"), b"x").unwrap();

    assert!(!runtime.remove_module(&ModuleId::new("upgraded"), true).unwrap());
    assert!(runtime.blocked_ids().is_empty());
}

#[test]
fn shutdown_closes_all_loaders() {
    let bed = TestBed::new();
    write_module_archive(&bed.addons, "one-release-1.sap", "", &[]);
    write_module_archive(&bed.addons, "two-release-1.sap", "", &[]);
    let mut runtime = bed.start(FactoryRegistry::new());

    let one = Arc::clone(runtime.loader(&ModuleId::new("one")).unwrap());
    let two = Arc::clone(runtime.loader(&ModuleId::new("two")).unwrap());

    let closed = runtime.shutdown();
    assert_eq!(closed.len(), 2);
    assert!(one.is_closed());
    assert!(two.is_closed());
    assert!(runtime.loader(&ModuleId::new("one")).is_none());
}
