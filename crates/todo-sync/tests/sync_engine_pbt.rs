//! Property-based tests for the local list under arbitrary operation sequences
//!
//! After any mix of creates, edits, deletes, filters and failed remote calls,
//! a full refresh must leave the local list identical to the remote table:
//! every entry has an id, ids are unique, and order is ascending by id.

use std::sync::Arc;

use proptest::prelude::*;
use todo_sync::{
    InMemoryBlobStore, InMemoryRecordStore, StoreOperation, SyncEngine, TodoRecord,
};

#[derive(Debug, Clone)]
enum Op {
    Create(String),
    ToggleNth(usize),
    RenameNth(usize, String),
    DeleteNth(usize),
    Filter(String),
    FetchAll,
    /// Make the next call of this operation fail
    Fault(StoreOperation),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-zA-Z ]{1,12}".prop_map(Op::Create),
        2 => (0..8usize).prop_map(Op::ToggleNth),
        1 => (0..8usize, "[a-z]{1,8}").prop_map(|(n, t)| Op::RenameNth(n, t)),
        2 => (0..8usize).prop_map(Op::DeleteNth),
        1 => "[a-zA-Z%_*]{0,3}".prop_map(Op::Filter),
        1 => Just(Op::FetchAll),
        1 => prop_oneof![
            Just(StoreOperation::Select),
            Just(StoreOperation::SelectFiltered),
            Just(StoreOperation::Insert),
            Just(StoreOperation::Update),
            Just(StoreOperation::Delete),
        ]
        .prop_map(Op::Fault),
    ]
}

fn nth(engine: &SyncEngine, n: usize) -> Option<TodoRecord> {
    let todos = engine.todos();
    if todos.is_empty() {
        return None;
    }
    Some(todos[n % todos.len()].clone())
}

async fn apply(engine: &SyncEngine, records: &InMemoryRecordStore, op: Op) {
    // Individual operations may fail by injection; only the end state matters
    match op {
        Op::Create(title) => {
            let _ = engine.create(&title, None).await;
        }
        Op::ToggleNth(n) => {
            if let Some(id) = nth(engine, n).and_then(|r| r.id()) {
                let _ = engine.toggle_done(id).await;
            }
        }
        Op::RenameNth(n, title) => {
            if let Some(id) = nth(engine, n).and_then(|r| r.id()) {
                let _ = engine.set_title(id, title).await;
            }
        }
        Op::DeleteNth(n) => {
            if let Some(record) = nth(engine, n) {
                let _ = engine.delete(&record).await;
            }
        }
        Op::Filter(term) => {
            let _ = engine.filter(&term).await;
        }
        Op::FetchAll => {
            let _ = engine.fetch_all().await;
        }
        Op::Fault(op) => records.fail_next(op),
    }
}

fn run_ops(titles: Vec<String>, ops: Vec<Op>) -> (Vec<TodoRecord>, Vec<TodoRecord>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let seeded: Vec<&str> = titles.iter().map(String::as_str).collect();
        let records = Arc::new(InMemoryRecordStore::with_titles(&seeded));
        let engine = SyncEngine::new(records.clone(), Arc::new(InMemoryBlobStore::new()));
        let _ = engine.fetch_all().await;

        for op in ops {
            apply(&engine, &records, op).await;
        }

        // Drain select faults left pending by the sequence
        while engine.fetch_all().await.is_err() {}

        (engine.todos(), records.rows())
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn refresh_converges_to_remote_table(
        titles in prop::collection::vec("[a-zA-Z ]{1,12}", 0..5),
        ops in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let (local, remote) = run_ops(titles, ops);

        prop_assert_eq!(&local, &remote);

        let ids: Vec<i64> = local.iter().map(|r| r.id().unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(ids, sorted);
    }

    #[test]
    fn filter_keeps_exactly_matching_titles(
        titles in prop::collection::vec("[a-cA-C%_* ]{0,6}", 0..8),
        term in "[a-cA-C%_*]{1,2}",
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (filtered, all) = runtime.block_on(async {
            let seeded: Vec<&str> = titles.iter().map(String::as_str).collect();
            let records = Arc::new(InMemoryRecordStore::with_titles(&seeded));
            let engine = SyncEngine::new(records.clone(), Arc::new(InMemoryBlobStore::new()));
            engine.filter(&term).await.unwrap();
            (engine.todos(), records.rows())
        });

        let needle = term.to_lowercase();
        let expected: Vec<TodoRecord> = all
            .into_iter()
            .filter(|r| r.title.to_lowercase().contains(&needle))
            .collect();
        prop_assert_eq!(filtered, expected);
    }
}
