use couponidx::{CouponValidator, IndexBuilder, WatchingIndex};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Build an index at `out` that contains exactly `codes`
fn rebuild(dir: &Path, out: &Path, codes: &[&str]) {
    let source = dir.join("source.txt");
    let mut contents = codes.join("\n");
    contents.push('\n');
    fs::write(&source, contents).unwrap();
    IndexBuilder::new([&source, &source]).build(out).unwrap();
}

fn wait_for_generation(index: &WatchingIndex, above: u64) -> bool {
    for _ in 0..30 {
        thread::sleep(Duration::from_millis(100));
        if index.generation() > above {
            return true;
        }
    }
    false
}

#[test]
fn test_auto_reload_after_rebuild() {
    // System temp dirs may not be watchable on macOS
    let temp_dir = tempfile::Builder::new()
        .prefix("test_couponidx_")
        .tempdir_in(".")
        .unwrap();
    let out = temp_dir.path().join("valid_codes.txt");
    rebuild(temp_dir.path(), &out, &["OVER9000"]);

    let index = WatchingIndex::from(&out).open().unwrap();

    // Give watcher thread time to start watching
    thread::sleep(Duration::from_millis(500));
    assert!(index.is_valid("OVER9000"));
    assert!(!index.is_valid("GNULINUX"));

    let initial_generation = index.generation();
    rebuild(temp_dir.path(), &out, &["GNULINUX"]);

    assert!(
        wait_for_generation(&index, initial_generation),
        "Index should have reloaded (generation should have increased)"
    );
    assert!(index.is_valid("GNULINUX"));
    assert!(!index.is_valid("OVER9000"));
}

#[test]
fn test_reload_events_reported() {
    let temp_dir = tempfile::Builder::new()
        .prefix("test_couponidx_")
        .tempdir_in(".")
        .unwrap();
    let out = temp_dir.path().join("valid_codes.txt");
    rebuild(temp_dir.path(), &out, &["OVER9000"]);

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let index = WatchingIndex::from(&out)
        .strict()
        .on_reload(move |event| events_clone.lock().unwrap().push(event))
        .open()
        .unwrap();

    // Duplicates: strict reload refuses the file and keeps the old index
    fs::write(temp_dir.path().join("bad.txt"), "SIXTYOFF\nSIXTYOFF\n").unwrap();
    fs::rename(temp_dir.path().join("bad.txt"), &out).unwrap();
    assert!(index.reload().is_err());
    assert!(index.is_valid("OVER9000"));
    assert_eq!(index.generation(), 1);

    rebuild(temp_dir.path(), &out, &["SIXTYOFF"]);
    let generation = index.reload().unwrap();
    assert!(generation >= 2);
    assert!(index.is_valid("SIXTYOFF"));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| !e.success && e.error.is_some()));
    assert!(events.iter().any(|e| e.success && e.error.is_none()));
}

#[test]
fn test_queries_during_reload_stay_consistent() {
    let temp_dir = tempfile::Builder::new()
        .prefix("test_couponidx_")
        .tempdir_in(".")
        .unwrap();
    let out = temp_dir.path().join("valid_codes.txt");
    rebuild(temp_dir.path(), &out, &["AAAAAAAA", "BBBBBBBB"]);

    let index = Arc::new(WatchingIndex::from(&out).open().unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                // Both versions hold both codes or neither, never one of them
                let snapshot = index.snapshot();
                assert_eq!(snapshot.is_valid("AAAAAAAA"), snapshot.is_valid("BBBBBBBB"));
                let _ = CouponValidator::is_valid(&*index, "CCCCCCCC");
            }
        })
    };

    for round in 0..5 {
        if round % 2 == 0 {
            rebuild(temp_dir.path(), &out, &["CCCCCCCC"]);
        } else {
            rebuild(temp_dir.path(), &out, &["AAAAAAAA", "BBBBBBBB"]);
        }
        index.reload().unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
}

#[test]
fn test_concurrent_reloads_end_on_newest_file() {
    let temp_dir = tempfile::Builder::new()
        .prefix("test_couponidx_")
        .tempdir_in(".")
        .unwrap();
    let out = temp_dir.path().join("valid_codes.txt");
    let replace = |version: usize| {
        let staged = temp_dir.path().join("staged.txt");
        fs::write(&staged, format!("VER{:06}\n", version)).unwrap();
        fs::rename(&staged, &out).unwrap();
    };
    replace(0);

    let index = Arc::new(WatchingIndex::from(&out).open().unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let reloader = {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let _ = index.reload();
            }
        })
    };

    let mut last_generation = index.generation();
    for version in 1..=50 {
        replace(version);
        let generation = index.reload().unwrap();
        assert!(generation > last_generation, "generations must increase");
        last_generation = generation;
    }

    stop.store(true, Ordering::Relaxed);
    reloader.join().unwrap();

    let snapshot = index.snapshot();
    assert!(snapshot.is_valid("VER000050"), "serving a stale index");
    assert_eq!(snapshot.len(), 1);
}
