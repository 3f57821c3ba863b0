//! Randomized workloads checked against a reference model and the index
//! verifier.

use depot_engine::{KeyPrefix, ScanDirection};
use depot_test::utils::{memory_engine, DurableEngine};
use depot_test::workload::{Model, Op, Workload};

const CHANGES: i32 = 12;

fn assert_matches_model(engine: &depot_engine::Engine, model: &Model) {
    let mut txn = engine.begin();
    let rows: Vec<((String, i32), i32)> = txn
        .scan("rev", KeyPrefix::partial("//depot/w/"), ScanDirection::Forward)
        .unwrap()
        .map(|r| {
            let r = r.unwrap();
            (
                (
                    r.get_str("depotFile").unwrap().to_owned(),
                    r.get_i32("depotRev").unwrap(),
                ),
                r.get_i32("change").unwrap(),
            )
        })
        .collect();
    let expected: Vec<_> = model.rows().iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(rows, expected);

    for change in 0..CHANGES {
        let filed: Vec<(String, i32)> = txn
            .index_lookup("rev", "by_change", KeyPrefix::new([change]))
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r.get_str("depotFile").unwrap().to_owned(),
                    r.get_i32("depotRev").unwrap(),
                )
            })
            .collect();
        assert_eq!(filed, model.with_change(change), "change {change}");
    }
    drop(txn);

    let report = engine.verify_indexes().unwrap();
    assert!(report.is_consistent(), "{:?}", report.problems);
}

#[test]
fn test_random_batches_keep_indexes_consistent() {
    for seed in [1, 7, 42] {
        let engine = memory_engine();
        let mut workload = Workload::new(seed, 20, 3, CHANGES);
        let mut model = Model::new();

        for _ in 0..40 {
            let ops = workload.batch(8);
            let mut txn = engine.begin();
            for op in &ops {
                op.apply(&mut txn).unwrap();
            }
            txn.commit().unwrap();
            ops.iter().for_each(|op| model.apply(op));
        }
        assert_matches_model(&engine, &model);
    }
}

#[test]
fn test_aborted_batches_leave_no_trace() {
    let engine = memory_engine();
    let mut workload = Workload::new(3, 10, 2, CHANGES);
    let mut model = Model::new();

    for round in 0..30 {
        let ops = workload.batch(5);
        let mut txn = engine.begin();
        for op in &ops {
            op.apply(&mut txn).unwrap();
        }
        if round % 3 == 0 {
            txn.abort();
        } else {
            txn.commit().unwrap();
            ops.iter().for_each(|op| model.apply(op));
        }
    }
    assert_matches_model(&engine, &model);
}

#[test]
fn test_random_workload_survives_reopen_and_gc() {
    let store = DurableEngine::new();
    let mut workload = Workload::new(99, 15, 2, CHANGES);
    let mut model = Model::new();
    {
        let engine = store.open().unwrap();
        for _ in 0..25 {
            let ops = workload.batch(6);
            let mut txn = engine.begin();
            for op in &ops {
                op.apply(&mut txn).unwrap();
            }
            txn.commit().unwrap();
            ops.iter().for_each(|op| model.apply(op));
        }
        engine.collect_garbage();
        assert_matches_model(&engine, &model);
    }

    let engine = store.open().unwrap();
    assert_matches_model(&engine, &model);
}

#[test]
fn test_put_then_delete_in_one_transaction() {
    let engine = memory_engine();
    let file = "//depot/w/transient".to_owned();
    let mut txn = engine.begin();
    Op::Put {
        file: file.clone(),
        rev: 1,
        change: 3,
    }
    .apply(&mut txn)
    .unwrap();
    Op::Put {
        file: file.clone(),
        rev: 1,
        change: 4,
    }
    .apply(&mut txn)
    .unwrap();
    Op::Delete { file, rev: 1 }.apply(&mut txn).unwrap();
    txn.commit().unwrap();

    assert_matches_model(&engine, &Model::new());
}
