mod common;

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use common::setup;
use rand::Rng;
use strata_catalog::{Catalog, CatalogError};
use strata_transaction::{TxnContext, TxnError, TxnId, TxnState};

const NAMES: [&str; 3] = ["alpha", "beta", "gamma"];

fn visible_version(catalog: &Catalog, name: &str, txn: &TxnContext) -> Option<TxnId> {
    match catalog.get_database(name, txn) {
        Ok(entry) => Some(entry.txn_id()),
        Err(CatalogError::NotFound { .. } | CatalogError::ObjectDropped { .. }) => None,
        Err(e) => panic!("unexpected read error: {e}"),
    }
}

#[test]
fn test_concurrent_create_follows_priority() {
    for _ in 0..200 {
        let (catalog, manager) = setup();
        let older = manager.begin().unwrap();
        let younger = manager.begin().unwrap();
        assert!(older.txn_id() < younger.txn_id());

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [older.clone(), younger.clone()]
            .into_iter()
            .map(|txn| {
                let catalog = catalog.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    catalog.create_database("db1", &txn).is_ok()
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Whichever thread ran first, the lower id ends up owning the head.
        assert!(results[0]);
        if results[1] {
            assert_eq!(younger.state(), TxnState::Rollbacking);
            assert!(matches!(
                manager.commit(&younger),
                Err(TxnError::Evicted(_))
            ));
        } else {
            assert_eq!(younger.state(), TxnState::Started);
            manager.rollback(&younger).unwrap();
        }
        manager.commit(&older).unwrap();

        let reader = manager.begin().unwrap();
        assert_eq!(
            visible_version(&catalog, "db1", &reader),
            Some(older.txn_id())
        );
        manager.commit(&reader).unwrap();
        assert_eq!(catalog.pending_txn_count(), 0);
        assert_eq!(manager.active_count(), 0);
    }
}

#[test]
fn test_concurrent_creates_of_distinct_names() {
    let (catalog, manager) = setup();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let catalog = catalog.clone();
            let manager = manager.clone();
            thread::spawn(move || {
                let txn = manager.begin().unwrap();
                catalog.create_database(&format!("db{i}"), &txn).unwrap();
                manager.commit(&txn).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reader = manager.begin().unwrap();
    let names: Vec<_> = catalog
        .list_databases(&reader)
        .iter()
        .map(|db| db.as_database().unwrap().db_name().to_string())
        .collect();
    assert_eq!(names, (0..8).map(|i| format!("db{i}")).collect::<Vec<_>>());
}

#[test]
fn test_snapshot_reads_are_repeatable() {
    let (catalog, manager) = setup();
    let writer = {
        let catalog = catalog.clone();
        let manager = manager.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let txn = manager.begin().unwrap();
                match catalog.create_database("db1", &txn) {
                    Ok(_) => {}
                    Err(CatalogError::DuplicateObject { .. }) => {
                        catalog.drop_database("db1", &txn).unwrap();
                    }
                    Err(e) => panic!("single writer hit {e}"),
                }
                manager.commit(&txn).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let catalog = catalog.clone();
            let manager = manager.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let txn = manager.begin().unwrap();
                    let first = visible_version(&catalog, "db1", &txn);
                    for _ in 0..20 {
                        assert_eq!(visible_version(&catalog, "db1", &txn), first);
                    }
                    manager.commit(&txn).unwrap();
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_random_workload_keeps_chains_consistent() {
    let (catalog, manager) = setup();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let catalog = catalog.clone();
            let manager = manager.clone();
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut committed = 0usize;
                for _ in 0..300 {
                    let txn = manager.begin().unwrap();
                    let name = NAMES[rng.random_range(0..NAMES.len())];
                    let written = if rng.random_bool(0.5) {
                        catalog.create_database(name, &txn)
                    } else {
                        catalog.drop_database(name, &txn)
                    };
                    if written.is_err() || rng.random_bool(0.2) {
                        manager.rollback(&txn).unwrap();
                        continue;
                    }
                    match manager.commit(&txn) {
                        Ok(_) => committed += 1,
                        Err(e) => assert!(
                            matches!(e, TxnError::Evicted(_)),
                            "unexpected commit failure: {e}"
                        ),
                    }
                }
                committed
            })
        })
        .collect();
    let committed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(manager.active_count(), 0);
    assert_eq!(catalog.pending_txn_count(), 0);

    let doc = catalog.to_document();
    let mut versions = 0;
    for db in &doc.databases {
        versions += db.entries.len();
        for pair in db.entries.windows(2) {
            assert!(pair[0].commit_ts.is_committed());
            assert!(pair[0].commit_ts > pair[1].commit_ts);
            // Creates and drops alternate: never two live versions in a row.
            assert_ne!(pair[0].deleted, pair[1].deleted, "chain of {}", db.name);
        }
        if let Some(oldest) = db.entries.last() {
            assert!(oldest.commit_ts.is_committed());
            assert!(!oldest.deleted);
        }
    }
    // Every committed transaction left exactly one version behind.
    assert_eq!(versions, committed);

    let reader = manager.begin().unwrap();
    let live: HashMap<_, _> = NAMES
        .iter()
        .map(|name| (*name, visible_version(&catalog, name, &reader)))
        .collect();
    for db in &doc.databases {
        let head_live = db.entries.first().is_some_and(|e| !e.deleted);
        assert_eq!(live[db.name.as_str()].is_some(), head_live);
    }
}
