use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::debouncer::{DEBOUNCE_MS, Debouncer};
use super::mapping::map_event;
use super::subscriptions::walk;
use super::{FsActor, IgnoreList};
use crate::actor::messages::RouterMsg;
use crate::core::{FileEventKind, Shutdown};

fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths: paths.into_iter().map(PathBuf::from).collect(),
        attrs: Default::default(),
    }
}

fn modify_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Any,
    ))
}

fn rename_kind(mode: notify::event::RenameMode) -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Name(mode))
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =============================================================================
// Debouncer
// =============================================================================

#[test]
fn test_debouncer_holds_until_quiet() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    d.add(PathBuf::from("/p/a.go"), FileEventKind::Write, t0);

    assert!(d.take_ready(t0 + ms(DEBOUNCE_MS - 1)).is_empty());
    let ready = d.take_ready(t0 + ms(DEBOUNCE_MS));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].kind, FileEventKind::Write);
    assert!(d.is_empty());
}

#[test]
fn test_debouncer_burst_collapses_to_last() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    let path = PathBuf::from("/p/web/app.js");
    d.add(path.clone(), FileEventKind::Create, t0);
    d.add(path.clone(), FileEventKind::Write, t0 + ms(40));
    d.add(path.clone(), FileEventKind::Write, t0 + ms(80));

    // Window restarts on each event.
    assert!(d.take_ready(t0 + ms(150)).is_empty());
    let ready = d.take_ready(t0 + ms(180));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].path, path);
    assert_eq!(ready[0].kind, FileEventKind::Write);
    assert_eq!(ready[0].at, t0 + ms(80));
}

#[test]
fn test_debouncer_remove_then_create_is_write() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    let path = PathBuf::from("/p/web/style.css");
    d.add(path.clone(), FileEventKind::Remove, t0);
    d.add(path.clone(), FileEventKind::Create, t0 + ms(5));

    let ready = d.take_ready(t0 + ms(200));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].kind, FileEventKind::Write);
}

#[test]
fn test_debouncer_spaced_writes_are_separate() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    let path = PathBuf::from("/p/pkg/lib.go");
    let mut seen = 0;

    for i in 0..5 {
        let at = t0 + ms(300 * i);
        seen += d.take_ready(at).len();
        d.add(path.clone(), FileEventKind::Write, at);
    }
    seen += d.take_ready(t0 + ms(1500)).len();
    assert_eq!(seen, 5);
}

#[test]
fn test_debouncer_orders_by_time() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    d.add(PathBuf::from("/p/b"), FileEventKind::Write, t0 + ms(10));
    d.add(PathBuf::from("/p/a"), FileEventKind::Write, t0);

    let ready = d.take_ready(t0 + ms(500));
    let names: Vec<_> = ready.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn test_debouncer_sleep_duration() {
    let mut d = Debouncer::new();
    let t0 = Instant::now();
    assert!(d.sleep_duration(t0) > Duration::from_secs(3600));

    d.add(PathBuf::from("/p/a"), FileEventKind::Write, t0);
    assert_eq!(d.sleep_duration(t0 + ms(30)), ms(DEBOUNCE_MS - 30));
    // Never a zero-length spin.
    assert_eq!(d.sleep_duration(t0 + ms(500)), ms(1));
}

// =============================================================================
// notify mapping
// =============================================================================

#[test]
fn test_map_metadata_dropped() {
    let event = make_event(
        vec!["/p/a.go"],
        notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
            notify::event::MetadataKind::WriteTime,
        )),
    );
    assert!(map_event(&event).is_empty());
}

#[test]
fn test_map_data_change_is_write() {
    let event = make_event(vec!["/p/a.go"], modify_kind());
    assert_eq!(
        map_event(&event),
        vec![(PathBuf::from("/p/a.go"), FileEventKind::Write)]
    );
}

#[test]
fn test_map_rename_both() {
    use notify::event::RenameMode;

    let event = make_event(vec!["/p/old.js", "/p/new.js"], rename_kind(RenameMode::Both));
    assert_eq!(
        map_event(&event),
        vec![
            (PathBuf::from("/p/old.js"), FileEventKind::RenameOut),
            (PathBuf::from("/p/new.js"), FileEventKind::RenameIn),
        ]
    );
}

#[test]
fn test_map_rename_any_checks_existence() {
    use notify::event::RenameMode;

    let dir = TempDir::new().unwrap();
    let here = dir.path().join("here.css");
    std::fs::write(&here, "a{}").unwrap();
    let gone = dir.path().join("gone.css");

    let event = notify::Event {
        kind: rename_kind(RenameMode::Any),
        paths: vec![here.clone(), gone.clone()],
        attrs: Default::default(),
    };
    assert_eq!(
        map_event(&event),
        vec![
            (here, FileEventKind::RenameIn),
            (gone, FileEventKind::RenameOut)
        ]
    );
}

#[test]
fn test_map_access_dropped() {
    let event = make_event(
        vec!["/p/a.go"],
        notify::EventKind::Access(notify::event::AccessKind::Read),
    );
    assert!(map_event(&event).is_empty());
}

// =============================================================================
// Tree walk
// =============================================================================

#[test]
fn test_walk_prunes_ignored() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    for sub in ["web/public", ".git/objects", "pkg/.cache"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }
    std::fs::write(root.join("go.mod"), "module m\n").unwrap();
    std::fs::write(root.join("web/client.go"), "package main\n").unwrap();
    std::fs::write(root.join("web/client_test.go"), "package main\n").unwrap();
    std::fs::write(root.join(".git/objects/x"), "").unwrap();
    std::fs::write(root.join("web/public/client.wasm"), "").unwrap();

    let ignore = IgnoreList::new();
    ignore.declare([root.join("web/public/client.wasm")]);
    let tree = walk(&root, &ignore).unwrap();

    assert!(tree.dirs.contains(&root));
    assert!(tree.dirs.contains(&root.join("web/public")));
    assert!(tree.dirs.iter().all(|d| !d.starts_with(root.join(".git"))));
    assert!(!tree.dirs.contains(&root.join("pkg/.cache")));

    assert!(tree.files.contains(&root.join("go.mod")));
    assert!(tree.files.contains(&root.join("web/client.go")));
    assert!(!tree.files.contains(&root.join("web/client_test.go")));
    assert!(!tree.files.contains(&root.join("web/public/client.wasm")));
}

#[test]
fn test_walk_dot_named_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap().join(".project");
    std::fs::create_dir_all(root.join("web")).unwrap();
    std::fs::create_dir_all(root.join(".git")).unwrap();
    std::fs::write(root.join("web/client.go"), "package main\n").unwrap();

    let tree = walk(&root, &IgnoreList::new()).unwrap();

    assert_eq!(tree.dirs, vec![root.clone(), root.join("web")]);
    assert_eq!(tree.files, vec![root.join("web/client.go")]);
}

#[test]
fn test_walk_missing_root_is_error() {
    let dir = TempDir::new().unwrap();
    assert!(walk(&dir.path().join("nope"), &IgnoreList::new()).is_err());
}

// =============================================================================
// Actor
// =============================================================================

async fn next_file(rx: &mut mpsc::Receiver<RouterMsg>) -> Option<(PathBuf, FileEventKind)> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(RouterMsg::File(e))) => return Some((e.path, e.kind)),
            Ok(Some(_)) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_actor_initial_scan_then_changes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("web/public")).unwrap();
    std::fs::write(root.join("go.mod"), "module m\n").unwrap();

    let wasm = root.join("web/public/client.wasm");
    let ignore = IgnoreList::new();
    ignore.declare([wasm.clone()]);

    let (tx, mut rx) = mpsc::channel(64);
    let shutdown = Shutdown::new();
    let actor = FsActor::start(&root, ignore, tx, shutdown.clone()).unwrap();
    let handle = tokio::spawn(actor.run());

    // Initial walk, then the scan marker.
    match rx.recv().await {
        Some(RouterMsg::File(e)) => {
            assert_eq!(e.path, root.join("go.mod"));
            assert_eq!(e.kind, FileEventKind::Create);
        }
        _ => panic!("expected synthetic create for go.mod"),
    }
    assert!(matches!(rx.recv().await, Some(RouterMsg::ScanComplete)));

    // Builder output is never reported; a real source file is.
    std::fs::write(&wasm, b"\0asm").unwrap();
    std::fs::write(root.join("web/public/app.js"), "1").unwrap();

    let (path, _) = next_file(&mut rx).await.expect("event for app.js");
    assert_eq!(path, root.join("web/public/app.js"));

    // A new directory is picked up with its contents.
    std::fs::create_dir_all(root.join("pkg/greet")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(root.join("pkg/greet/greet.go"), "package greet\n").unwrap();
    let mut seen = Vec::new();
    while let Some((path, _)) = next_file(&mut rx).await {
        if path == root.join("pkg/greet/greet.go") {
            seen.push(path);
            break;
        }
        assert_ne!(path, wasm);
    }
    assert_eq!(seen.len(), 1);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
