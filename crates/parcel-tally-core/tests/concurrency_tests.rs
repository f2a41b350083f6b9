use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tempfile::tempdir;

use parcel_tally_core::storage::models::{ItemStatus, ItemUpdate};
use parcel_tally_core::{
    ActivitySink, AppConfig, ManifestRecord, ScanActivity, ScanEngine, ScanStatus,
};

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<ScanActivity>>,
}

impl ActivitySink for RecordingSink {
    fn on_scan(&self, activity: &ScanActivity) {
        self.seen.lock().unwrap().push(activity.clone());
    }
}

fn make_test_manifest(ids: &[String]) -> Vec<ManifestRecord> {
    ids.iter().map(|id| ManifestRecord::new(id.as_str())).collect()
}

#[test]
fn test_concurrent_scans_of_same_code_yield_one_success() {
    const THREADS: usize = 16;
    let engine = ScanEngine::open_in_memory().unwrap();
    let session = engine
        .create_session(
            "Rush",
            &make_test_manifest(&["HOT".to_string(), "COLD".to_string()]),
            "admin-1",
        )
        .unwrap();
    let barrier = Barrier::new(THREADS);

    let statuses: Vec<ScanStatus> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|n| {
                let engine = &engine;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    engine
                        .scan(session.id, "HOT", &format!("op-{}", n))
                        .unwrap()
                        .status
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = statuses.iter().filter(|s| **s == ScanStatus::Success).count();
    let duplicates = statuses.iter().filter(|s| **s == ScanStatus::Duplicate).count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, THREADS - 1);

    let stats = engine.session_stats(session.id).unwrap();
    assert_eq!(stats.scanned_count, 1);
    assert_eq!(stats.missing_count, 1);
    assert_eq!(engine.reconcile_stats(session.id).unwrap(), stats);
}

#[test]
fn test_concurrent_scans_of_different_codes_all_succeed() {
    const THREADS: usize = 12;
    let ids: Vec<String> = (0..THREADS).map(|n| format!("PKG-{:03}", n)).collect();
    let engine = ScanEngine::open_in_memory().unwrap();
    let session = engine
        .create_session("Spread", &make_test_manifest(&ids), "admin-1")
        .unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for id in &ids {
            let engine = &engine;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                let outcome = engine.scan(session.id, id, "op-1").unwrap();
                assert_eq!(outcome.status, ScanStatus::Success);
            });
        }
    });

    let stats = engine.session_stats(session.id).unwrap();
    assert_eq!(stats.scanned_count, THREADS as i64);
    assert_eq!(stats.progress, 100);
}

#[test]
fn test_mixed_concurrent_traffic_conserves_counts() {
    const ROUNDS: usize = 4;
    let ids: Vec<String> = (0..6).map(|n| format!("BOX-{}", n)).collect();
    let engine = ScanEngine::open_in_memory().unwrap();
    let session = engine
        .create_session("Mixed", &make_test_manifest(&ids), "admin-1")
        .unwrap();

    thread::scope(|s| {
        for round in 0..ROUNDS {
            let engine = &engine;
            let ids = &ids;
            s.spawn(move || {
                for id in ids {
                    engine.scan(session.id, id, &format!("op-{}", round)).unwrap();
                    engine.scan(session.id, "GHOST", "op-x").unwrap();
                }
            });
        }
    });

    let cached = engine.session_stats(session.id).unwrap();
    let derived = engine.reconcile_stats(session.id).unwrap();
    assert_eq!(cached, derived);
    assert_eq!(cached.scanned_count, ids.len() as i64);
    assert_eq!(cached.scanned_count + cached.missing_count, cached.total);
}

#[test]
fn test_activity_sink_sees_success_and_duplicate_only() {
    let sink = Arc::new(RecordingSink::default());
    let engine = ScanEngine::open_in_memory()
        .unwrap()
        .with_activity_sink(sink.clone());
    let session = engine
        .create_session(
            "Audit",
            &[ManifestRecord::new("A").with_product_name("Kettle")],
            "admin-1",
        )
        .unwrap();

    engine.scan(session.id, "A", "op-1").unwrap();
    engine.scan(session.id, "A", "op-2").unwrap();
    engine.scan(session.id, "NOT-THERE", "op-3").unwrap();

    let seen = sink.seen.lock().unwrap();
    let statuses: Vec<ScanStatus> = seen.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![ScanStatus::Success, ScanStatus::Duplicate]);
    assert_eq!(seen[0].operator_id, "op-1");
    assert_eq!(seen[0].product_name.as_deref(), Some("Kettle"));
    assert_eq!(seen[1].operator_id, "op-2");
}

#[test]
fn test_reconcile_during_scans_keeps_counters_exact() {
    const SCANNERS: usize = 8;
    let ids: Vec<String> = (0..200).map(|n| format!("RC-{:04}", n)).collect();
    let engine = ScanEngine::open_in_memory().unwrap();
    let session = engine
        .create_session("Reconcile", &make_test_manifest(&ids), "admin-1")
        .unwrap();
    let scanning = AtomicBool::new(true);

    thread::scope(|s| {
        let reconciler = s.spawn(|| {
            let mut runs = 0;
            while scanning.load(Ordering::SeqCst) {
                engine.reconcile_stats(session.id).unwrap();
                runs += 1;
            }
            runs
        });

        let scanners: Vec<_> = (0..SCANNERS)
            .map(|n| {
                let engine = &engine;
                let ids = &ids;
                s.spawn(move || {
                    for id in ids.iter().skip(n).step_by(SCANNERS) {
                        engine.scan(session.id, id, "op-1").unwrap();
                    }
                })
            })
            .collect();
        for scanner in scanners {
            scanner.join().unwrap();
        }
        scanning.store(false, Ordering::SeqCst);
        assert!(reconciler.join().unwrap() > 0);
    });

    let db = engine.database();
    assert_eq!(db.cached_counts(session.id).unwrap(), (200, 200));
    assert_eq!(db.count_items(session.id).unwrap(), (200, 200));
}

fn shared_file_config(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        database_path: dir.join("shared.db").to_string_lossy().to_string(),
        ..AppConfig::default()
    }
}

#[test]
fn test_two_handles_on_one_file_record_one_success_per_code() {
    const THREADS_PER_HANDLE: usize = 4;
    let dir = tempdir().unwrap();
    let config = shared_file_config(dir.path());
    let first = ScanEngine::open(&config).unwrap();
    let second = ScanEngine::open(&config).unwrap();
    let ids: Vec<String> = (0..40).map(|n| format!("FX-{:03}", n)).collect();
    let session = first
        .create_session("Shared", &make_test_manifest(&ids), "admin-1")
        .unwrap();

    let outcomes: Vec<(String, ScanStatus)> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS_PER_HANDLE * 2)
            .map(|n| {
                let engine = if n % 2 == 0 { &first } else { &second };
                let ids = &ids;
                s.spawn(move || {
                    ids.iter()
                        .map(|id| {
                            let outcome = engine.scan(session.id, id, "op-1").unwrap();
                            (id.clone(), outcome.status)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert!(outcomes.iter().all(|(_, status)| *status != ScanStatus::Invalid));
    for id in &ids {
        let successes = outcomes
            .iter()
            .filter(|(code, status)| code == id && *status == ScanStatus::Success)
            .count();
        assert_eq!(successes, 1, "{} recorded {} successes", id, successes);
    }
    assert_eq!(
        second.session_stats(session.id).unwrap().scanned_count,
        ids.len() as i64
    );
}

#[test]
fn test_admin_resets_on_other_handle_never_turn_scans_invalid() {
    let dir = tempdir().unwrap();
    let config = shared_file_config(dir.path());
    let scanner = ScanEngine::open(&config).unwrap();
    let admin = ScanEngine::open(&config).unwrap();
    let ids: Vec<String> = (0..10).map(|n| format!("RS-{}", n)).collect();
    let session = scanner
        .create_session("Resets", &make_test_manifest(&ids), "admin-1")
        .unwrap();
    let item_ids: Vec<i64> = ids
        .iter()
        .map(|id| {
            admin
                .database()
                .find_item_by_tracking_id(session.id, id)
                .unwrap()
                .unwrap()
                .id
        })
        .collect();
    let scanning = AtomicBool::new(true);

    let statuses: Vec<ScanStatus> = thread::scope(|s| {
        s.spawn(|| {
            while scanning.load(Ordering::SeqCst) {
                for item_id in &item_ids {
                    let reset = ItemUpdate {
                        status: Some(ItemStatus::Unscanned),
                        ..Default::default()
                    };
                    admin.update_item(*item_id, reset, "admin-1").unwrap();
                }
            }
        });

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let scanner = &scanner;
                let ids = &ids;
                s.spawn(move || {
                    let mut seen = Vec::new();
                    for _ in 0..20 {
                        for id in ids {
                            seen.push(scanner.scan(session.id, id, "op-1").unwrap().status);
                        }
                    }
                    seen
                })
            })
            .collect();
        let statuses = workers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        scanning.store(false, Ordering::SeqCst);
        statuses
    });

    assert!(statuses.iter().all(|status| *status != ScanStatus::Invalid));
    let cached = scanner.session_stats(session.id).unwrap();
    assert_eq!(scanner.reconcile_stats(session.id).unwrap(), cached);
}
