//! Integration tests for scanning, labelling, selection, bootstrap and export
//!
//! Every test drives a real `Switcher` over a temporary snapshot directory
//! with in-memory collaborators (see `helpers::fakes`).

mod helpers;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use helpers::fakes::{CountingDisplay, Fixture, MemoryPrefs, RecordingLive, ScriptedHost};
use snapshot_switcher::host::ChangeEvent;
use snapshot_switcher::snapshot::SnapshotKind;
use snapshot_switcher::{Collaborators, ExportOutcome, Switcher, SwitcherError};

// 2018-01-01, 2019-01-01, 2020-01-01
const JAN_2018: i64 = 1_514_764_800;
const JAN_2019: i64 = 1_546_300_800;
const JAN_2020: i64 = 1_577_836_800;

#[test]
fn test_labels_for_auto_saved_nested_and_plain() {
    let fx = Fixture::with_auto_save("a.settings");
    fx.write("a.settings", "A");
    fx.write("sub/a.settings", "SUB A");
    fx.write("b.settings", "B");
    fx.write("notes.txt", "not a snapshot");

    fx.switcher.rescan().unwrap();

    assert_eq!(
        fx.sorted_labels(),
        vec!["a (sub)", "auto-saved(a)", "b"],
        "auto-save file wins its template, the nested twin shows its folder"
    );
}

#[test]
fn test_labels_are_unique() {
    let fx = Fixture::new();
    fx.write("team/Dark.settings", "");
    fx.write("home/deep/dark.settings", "");
    fx.write("Dark.settings", "");
    fx.write("Light.settings", "");

    fx.switcher.rescan().unwrap();

    let labels = fx.labels();
    let mut unique = labels.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), labels.len(), "labels collide: {:?}", labels);
    assert!(labels.contains(&"Dark (team)".to_string()));
    assert!(labels.contains(&"dark (home/deep)".to_string()));
    assert!(labels.contains(&"Dark (.)".to_string()));
    assert!(labels.contains(&"Light".to_string()));
}

#[test]
fn test_case_duplicate_paths_share_one_plain_label() {
    let fx = Fixture::new();
    fx.write("Foo.settings", "UPPER");
    fx.write("foo.settings", "LOWER");

    fx.switcher.rescan().unwrap();

    let labels = fx.labels();
    assert_eq!(labels.len(), 1, "one snapshot per case-folded path: {:?}", labels);
    assert!(
        labels[0] == "Foo" || labels[0] == "foo",
        "dropped twin still collides: {:?}",
        labels
    );
    assert!(fx.switcher.select_label(&labels[0]).unwrap());
}

#[test]
fn test_rescan_is_idempotent() {
    let fx = Fixture::new();
    fx.write("one.settings", "");
    fx.write("nested/two.settings", "");
    fx.write("nested/deeper/three.settings", "");

    fx.switcher.rescan().unwrap();
    let first = fx.labels();
    fx.switcher.rescan().unwrap();
    let second = fx.labels();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[test]
fn test_most_recently_used_first() {
    let fx = Fixture::new();
    let x = fx.write("x.settings", "X");
    let y = fx.write("y.settings", "Y");
    let z = fx.write("z.settings", "Z");
    fx.set_os_access_time(&x, JAN_2018);
    fx.set_os_access_time(&y, JAN_2019);
    fx.set_os_access_time(&z, JAN_2020);

    fx.switcher.rescan().unwrap();
    assert_eq!(fx.labels(), vec!["z", "y", "x"]);

    // Selecting records the access in the preference store, which wins over the OS time
    assert!(fx.switcher.select_path(&x).unwrap());
    fx.switcher.rescan().unwrap();
    assert_eq!(fx.labels(), vec!["x", "z", "y"]);
}

#[test]
fn test_every_label_selects_its_own_snapshot() {
    let fx = Fixture::new();
    fx.write("Dark.settings", "");
    fx.write("team/Dark.settings", "");
    fx.write("Light.settings", "");
    fx.switcher.rescan().unwrap();

    for label in fx.labels() {
        assert!(fx.switcher.select_label(&label).unwrap(), "{} not found", label);
        assert_eq!(fx.switcher.selected_label().as_deref(), Some(label.as_str()));
        assert_eq!(fx.live.last_applied(), fx.switcher.selected_path());
    }
}

#[test]
fn test_selection_survives_rescan_only_while_file_exists() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.write("c.settings", "C");

    assert!(fx.switcher.select_path(&b).unwrap());
    fx.switcher.rescan().unwrap();
    assert_eq!(fx.switcher.selected_path(), Some(b.clone()));

    fs::remove_file(&b).unwrap();
    fx.switcher.rescan().unwrap();
    assert_eq!(fx.switcher.selected_path(), None);
    assert_eq!(fx.labels(), vec!["c"]);
}

#[test]
fn test_select_applies_and_saves_default() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.switcher.rescan().unwrap();
    let refreshes = fx.display.count();

    assert!(fx.switcher.select_label("b").unwrap());

    assert_eq!(fx.live.applied(), vec![b.clone()]);
    assert_eq!(*fx.live.content.lock().unwrap(), "B");
    assert_eq!(
        fx.prefs.selected_file.lock().unwrap().as_deref(),
        Some(b.to_string_lossy().as_ref())
    );
    assert!(fx
        .prefs
        .access_times
        .lock()
        .unwrap()
        .contains_key(b.to_string_lossy().as_ref()));
    assert!(fx.display.count() > refreshes);
}

#[test]
fn test_select_rescans_once_for_unknown_snapshot() {
    let fx = Fixture::new();
    fx.switcher.initialize().unwrap();

    // Created without any change notification
    let late = fx.write("late.settings", "LATE");
    assert!(fx.switcher.select_label("late").unwrap());
    assert_eq!(fx.live.last_applied(), Some(late));
}

#[test]
fn test_select_missing_label_changes_nothing() {
    let fx = Fixture::new();
    fx.write("b.settings", "B");
    fx.switcher.initialize().unwrap();
    let before = fx.switcher.selected_path();

    assert!(!fx.switcher.select_label("nope").unwrap());
    assert_eq!(fx.switcher.selected_path(), before);
    assert!(fx.live.applied().is_empty());
}

#[test]
fn test_select_path_requires_absolute_path() {
    let fx = Fixture::new();
    let err = fx
        .switcher
        .select_path(Path::new("relative/b.settings"))
        .unwrap_err();
    assert!(matches!(err, SwitcherError::InvalidPath { .. }));
}

#[test]
fn test_failed_apply_does_not_save_default() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.switcher.rescan().unwrap();
    fs::remove_file(&b).unwrap();

    let err = fx.switcher.select_path(&b).unwrap_err();
    assert!(matches!(err, SwitcherError::Apply { .. }));
    assert!(fx.prefs.selected_file.lock().unwrap().is_none());
}

#[test]
fn test_initialize_exports_first_run_snapshot() {
    let fx = Fixture::new();
    *fx.live.content.lock().unwrap() = "LIVE".to_string();

    fx.switcher.initialize().unwrap();

    let first_run = fx.settings_dir.join("OriginalSettings.settings");
    assert_eq!(fx.live.exported(), vec![first_run.clone()]);
    assert_eq!(fs::read_to_string(&first_run).unwrap(), "LIVE");
    assert!(fx.live.applied().is_empty(), "exported snapshot is not re-applied");
    assert_eq!(
        fx.switcher.selected_label().as_deref(),
        Some("auto-saved(OriginalSettings)")
    );
}

#[test]
fn test_initialize_imports_existing_first_run_snapshot() {
    let fx = Fixture::new();
    let first_run = fx.write("OriginalSettings.settings", "ORIGINAL");

    fx.switcher.initialize().unwrap();

    assert_eq!(fx.live.applied(), vec![first_run.clone()]);
    assert!(fx.live.exported().is_empty());
    assert_eq!(fx.switcher.selected_path(), Some(first_run));
    assert!(fx.prefs.selected_file.lock().unwrap().is_none());
}

#[test]
fn test_initialize_restores_default_without_applying() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.write("c.settings", "C");
    fx.set_default(&b);

    fx.switcher.initialize().unwrap();

    assert_eq!(fx.switcher.selected_path(), Some(b));
    assert!(fx.live.applied().is_empty());
    assert!(fx.live.exported().is_empty());
}

#[test]
fn test_initialize_ignores_default_outside_snapshot_dir() {
    let fx = Fixture::new();
    let outside = fx.temp_dir.path().join("outside.settings");
    fs::write(&outside, "OUT").unwrap();
    fx.set_default(&outside);

    fx.switcher.initialize().unwrap();

    let first_run = fx.settings_dir.join("OriginalSettings.settings");
    assert_eq!(fx.switcher.selected_path(), Some(first_run));
}

#[test]
fn test_initialize_ignores_missing_default() {
    let fx = Fixture::new();
    fx.set_default(&fx.settings_dir.join("gone.settings"));

    fx.switcher.initialize().unwrap();

    assert_eq!(fx.live.exported().len(), 1);
}

#[test]
fn test_unconfigured_switcher_is_inert() {
    let live = Arc::new(RecordingLive::default());
    let switcher = Switcher::new(Collaborators {
        live: live.clone(),
        prefs: Arc::new(MemoryPrefs::default()),
        host: Arc::new(ScriptedHost::default()),
        display: Arc::new(CountingDisplay::default()),
    });

    assert!(!switcher.configure(None, "settings").unwrap());
    assert!(!switcher.is_configured());
    switcher.initialize().unwrap();
    switcher.rescan().unwrap();

    assert!(switcher.display_labels().is_empty());
    assert!(!switcher.select_label("anything").unwrap());
    assert_eq!(
        switcher.export_current(None).unwrap(),
        ExportOutcome::Unconfigured
    );
    assert_eq!(switcher.export_project().unwrap(), None);
    assert!(!switcher.can_export_project());
    assert!(live.applied().is_empty());
}

#[test]
fn test_relative_auto_save_file_is_rejected() {
    let switcher = Switcher::new(Collaborators {
        live: Arc::new(RecordingLive::default()),
        prefs: Arc::new(MemoryPrefs::default()),
        host: Arc::new(ScriptedHost::default()),
        display: Arc::new(CountingDisplay::default()),
    });

    let err = switcher
        .configure(Some(Path::new("Settings/Current.settings")), "settings")
        .unwrap_err();
    assert!(matches!(err, SwitcherError::InvalidPath { .. }));
    assert!(!switcher.is_configured());
}

#[test]
fn test_scan_failure_keeps_previous_state() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.switcher.select_path(&b).unwrap();
    let labels = fx.labels();

    fs::remove_dir_all(&fx.settings_dir).unwrap();
    let err = fx.switcher.rescan().unwrap_err();

    assert!(matches!(err, SwitcherError::ScanFailure { .. }));
    assert_eq!(fx.labels(), labels);
    assert_eq!(fx.switcher.selected_path(), Some(b));
}

#[test]
fn test_change_event_rescans_and_refreshes() {
    let fx = Fixture::new();
    fx.switcher.initialize().unwrap();
    let refreshes = fx.display.count();

    let fresh = fx.write("fresh.settings", "");
    fx.switcher.handle_change(&ChangeEvent::Created(fresh.clone()));
    assert!(fx.labels().contains(&"fresh".to_string()));
    assert!(fx.display.count() > refreshes);

    fs::remove_file(&fresh).unwrap();
    fx.switcher.handle_change(&ChangeEvent::Deleted(fresh));
    assert!(!fx.labels().contains(&"fresh".to_string()));
}

#[test]
fn test_concurrent_change_events_converge() {
    let fx = Fixture::new();
    fx.switcher.initialize().unwrap();

    thread::scope(|scope| {
        for i in 0..8 {
            let fx = &fx;
            scope.spawn(move || {
                let path = fx.write(&format!("n{}.settings", i), "");
                fx.switcher.handle_change(&ChangeEvent::Created(path));
            });
        }
    });

    let labels = fx.labels();
    for i in 0..8 {
        let label = format!("n{}", i);
        assert!(labels.contains(&label), "{} missing from {:?}", label, labels);
    }
}

#[test]
fn test_display_refresh_may_query_the_switcher() {
    let fx = Fixture::new();
    let a = fx.write("a.settings", "A");

    // Display that reads the selection back, like a host toolbar would
    let handle: Arc<OnceLock<Weak<Switcher>>> = Arc::default();
    let queries = Arc::new(AtomicUsize::new(0));
    let display = {
        let handle = handle.clone();
        let queries = queries.clone();
        move || {
            if let Some(switcher) = handle.get().and_then(Weak::upgrade) {
                let _ = switcher.selected_label();
                let _ = switcher.display_labels();
                queries.fetch_add(1, Ordering::SeqCst);
            }
        }
    };
    let switcher = Arc::new(Switcher::new(Collaborators {
        live: Arc::new(RecordingLive::default()),
        prefs: Arc::new(MemoryPrefs::default()),
        host: Arc::new(ScriptedHost::default()),
        display: Arc::new(display),
    }));
    switcher
        .configure(Some(&fx.settings_dir.join("Current.settings")), "settings")
        .unwrap();
    handle.set(Arc::downgrade(&switcher)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let worker = {
        let switcher = switcher.clone();
        let b = fx.write("b.settings", "B");
        thread::spawn(move || {
            switcher.initialize().unwrap();
            switcher.select_path(&a).unwrap();
            switcher.rescan().unwrap();
            switcher.handle_change(&ChangeEvent::Created(b));
            done_tx.send(()).unwrap();
        })
    };

    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("switcher deadlocked while the display queried it");
    worker.join().unwrap();
    assert!(queries.load(Ordering::SeqCst) > 0);
    assert_eq!(switcher.selected_label().as_deref(), Some("a"));
}

#[test]
fn test_rename_event_keeps_selection_when_path_survives() {
    let fx = Fixture::new();
    let keep = fx.write("keep.settings", "");
    let old = fx.write("old.settings", "");
    fx.switcher.select_path(&keep).unwrap();

    let new = fx.settings_dir.join("new.settings");
    fs::rename(&old, &new).unwrap();
    fx.switcher
        .handle_change(&ChangeEvent::Renamed { from: old, to: new });

    assert_eq!(fx.sorted_labels(), vec!["keep", "new"]);
    assert_eq!(fx.switcher.selected_path(), Some(keep));
}

#[test]
fn test_snapshot_listing_marks_selection() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.write("c.settings", "C");
    fx.switcher.select_path(&b).unwrap();

    let listing = fx.switcher.snapshots();
    assert_eq!(listing.len(), 2);
    let selected: Vec<_> = listing.iter().filter(|s| s.selected).collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].path, b);
    assert_eq!(selected[0].label, "b");
    assert!(listing.iter().all(|s| s.kind == SnapshotKind::Plain));

    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json[0]["kind"], "plain");
}

#[test]
fn test_export_overwrites_selected_snapshot() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    *fx.prefs.export_overwrites_selected.lock().unwrap() = true;
    fx.switcher.select_path(&b).unwrap();

    *fx.live.content.lock().unwrap() = "EDITED".to_string();
    let outcome = fx.switcher.export_current(None).unwrap();

    assert_eq!(outcome, ExportOutcome::Exported(b.clone()));
    assert_eq!(fs::read_to_string(&b).unwrap(), "EDITED");
    assert_eq!(fx.switcher.selected_path(), Some(b));
}

#[test]
fn test_export_never_overwrites_auto_saved_file() {
    let fx = Fixture::new();
    let current = fx.write("Current.settings", "AUTO");
    *fx.prefs.export_overwrites_selected.lock().unwrap() = true;
    fx.switcher.select_path(&current).unwrap();
    assert_eq!(
        fx.switcher.selected_label().as_deref(),
        Some("auto-saved(Current)")
    );

    let outcome = fx.switcher.export_current(None).unwrap();
    assert_eq!(outcome, ExportOutcome::TargetRequired);
    assert!(fx.live.exported().is_empty());
}

#[test]
fn test_export_to_target_selects_new_snapshot() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.switcher.select_path(&b).unwrap();
    *fx.live.content.lock().unwrap() = "PRESENTING".to_string();

    let target = fx.settings_dir.join("talks/Presenting.settings");
    let outcome = fx.switcher.export_current(Some(&target)).unwrap();

    assert_eq!(outcome, ExportOutcome::Exported(target.clone()));
    assert_eq!(fs::read_to_string(&target).unwrap(), "PRESENTING");
    assert_eq!(fx.switcher.selected_path(), Some(target));
    assert_eq!(fx.live.applied(), vec![b], "export does not apply");
}

#[test]
fn test_export_outside_snapshot_dir_keeps_selection() {
    let fx = Fixture::new();
    let b = fx.write("b.settings", "B");
    fx.switcher.select_path(&b).unwrap();

    let target = fx.temp_dir.path().join("backup/b-copy.settings");
    let outcome = fx.switcher.export_current(Some(&target)).unwrap();

    assert_eq!(outcome, ExportOutcome::Exported(target.clone()));
    assert!(target.is_file());
    assert_eq!(fx.switcher.selected_path(), Some(b));
}

#[test]
fn test_export_requires_target_without_overwrite() {
    let fx = Fixture::new();
    fx.switcher.initialize().unwrap();

    assert_eq!(
        fx.switcher.export_current(None).unwrap(),
        ExportOutcome::TargetRequired
    );
    let err = fx
        .switcher
        .export_current(Some(Path::new("relative.settings")))
        .unwrap_err();
    assert!(matches!(err, SwitcherError::InvalidPath { .. }));
}
