//! Cross-backend and durability tests: the persistent engine must agree
//! with the in-memory engine operation for operation, and must carry its
//! state (records, ledger, next id) across a reopen.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use ecotrace_core::{
    Amount, Category, CentiKg, EmissionPatch, Engine, FactorTable, NewEmission, Pagination,
    RecordFilter, TimeRange, UserId,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn emission(owner: u64, category: Category, subcategory: &str, milli: i64, ts: i64) -> NewEmission {
    NewEmission {
        owner: UserId(owner),
        category,
        subcategory: subcategory.to_string(),
        amount: Amount::new(milli),
        unit: "unit".to_string(),
        timestamp: ts,
        description: None,
        metadata: BTreeMap::new(),
    }
}

fn run_scenario(engine: &mut Engine) {
    let (first, _) = engine
        .create(emission(1, Category::Transportation, "car_gasoline", 100_000, 100))
        .unwrap();
    engine
        .create(emission(1, Category::Food, "beef", 2_000, 200))
        .unwrap();
    let (victim, _) = engine
        .create(emission(1, Category::Waste, "landfill", 10_000, 300))
        .unwrap();
    engine
        .create(emission(2, Category::Electricity, "coal", 5_000, 150))
        .unwrap();

    let patch = EmissionPatch {
        amount: Some(Amount::new(50_000)),
        ..EmissionPatch::default()
    };
    engine.update(first.id, UserId(1), patch).unwrap();
    engine.delete(victim.id, UserId(1)).unwrap();
}

#[test]
fn memory_and_redb_backends_agree() {
    let dir = TempDir::new().unwrap();

    let mut mem = Engine::in_memory(FactorTable::builtin());
    let mut redb = Engine::open(dir.path().join("agree.db"), FactorTable::builtin()).unwrap();
    run_scenario(&mut mem);
    run_scenario(&mut redb);

    for user in [UserId(1), UserId(2)] {
        assert_eq!(
            mem.ledger_total(user).unwrap(),
            redb.ledger_total(user).unwrap()
        );
        let mem_page = mem
            .list(user, &RecordFilter::default(), Pagination::default())
            .unwrap();
        let redb_page = redb
            .list(user, &RecordFilter::default(), Pagination::default())
            .unwrap();
        assert_eq!(mem_page, redb_page);

        let now = Utc.timestamp_opt(1_718_452_800, 0).single().unwrap();
        assert_eq!(
            mem.stats(user, &TimeRange::All, now).unwrap(),
            redb.stats(user, &TimeRange::All, now).unwrap()
        );
    }
}

#[test]
fn persistent_engine_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("durable.db");

    {
        let mut engine = Engine::open(&path, FactorTable::builtin()).unwrap();
        run_scenario(&mut engine);
        assert!(engine.is_persistent());
    }

    let mut engine = Engine::open(&path, FactorTable::builtin()).unwrap();

    // 50 km gasoline (1200) + 2 kg beef (5400) survive for user 1.
    assert_eq!(engine.ledger_total(UserId(1)).unwrap(), CentiKg::new(6600));
    assert_eq!(engine.verify_ledger(UserId(1)).unwrap(), CentiKg::new(6600));
    let page = engine
        .list(UserId(1), &RecordFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(page.total_count, 2);

    // New ids continue past everything assigned before the reopen.
    let (fresh, _) = engine
        .create(emission(1, Category::Waste, "recycling", 1_000, 400))
        .unwrap();
    assert!(page.records.iter().all(|r| r.id < fresh.id));
}

#[test]
fn ownership_is_isolated_on_disk_too() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::open(dir.path().join("iso.db"), FactorTable::builtin()).unwrap();
    run_scenario(&mut engine);

    let page = engine
        .list(UserId(2), &RecordFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert!(page.records.iter().all(|r| r.owner == UserId(2)));

    // User 2 cannot see or touch user 1's records.
    let foreign = engine
        .list(UserId(1), &RecordFilter::default(), Pagination::default())
        .unwrap();
    for record in &foreign.records {
        assert!(engine.get(record.id, UserId(2)).is_err());
    }
}
