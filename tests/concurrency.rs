use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use stratadb::{AccessType, ColumnInfo, DataType, Database, StrataError, Table, TableName, Value};

fn events() -> TableName {
    TableName::new("APP", "events")
}

fn open() -> Arc<Database> {
    let db = Database::default();
    let mut txn = db.begin();
    txn.create_table(events(), vec![ColumnInfo::new("n", DataType::Integer)])
        .unwrap();
    txn.get_mutable_table(&events())
        .unwrap()
        .add_row(vec![Value::Integer(0)])
        .unwrap();
    txn.commit().unwrap();
    Arc::new(db)
}

#[test]
fn concurrent_inserts_all_merge() {
    let db = open();
    let threads = 8;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let txn = db.begin();
                let table = txn.get_mutable_table(&events()).unwrap();
                for i in 0..per_thread {
                    table
                        .add_row(vec![Value::Integer((t * per_thread + i + 1) as i64)])
                        .unwrap();
                }
                barrier.wait();
                txn.commit().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let txn = db.begin();
    let table = txn.get_table(&events()).unwrap();
    assert_eq!(table.row_count().unwrap(), 1 + threads * per_thread);
    assert_eq!(db.global().active_count(), 1);
}

#[test]
fn only_one_remover_of_a_row_wins() {
    let db = open();
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let txn = db.begin();
                let table = txn.get_mutable_table(&events()).unwrap();
                let row = table.row_ids().unwrap()[0];
                table.remove_row(row).unwrap();
                barrier.wait();
                txn.commit()
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(()) => committed += 1,
            Err(err) => assert!(matches!(err, StrataError::CommitConflict { .. })),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(db.begin().get_table(&events()).unwrap().row_count().unwrap(), 0);
}

#[test]
fn write_lock_blocks_readers_until_commit() {
    let db = open();
    let released = Arc::new(AtomicBool::new(false));
    let (locked_tx, locked_rx) = mpsc::channel();

    let writer = {
        let db = db.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut txn = db.begin();
            txn.lock_tables(&[], &[events()]).unwrap();
            txn.check_access(&events(), AccessType::Write).unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            txn.commit().unwrap();
        })
    };

    locked_rx.recv().unwrap();
    let mut reader = db.begin();
    reader.lock_tables(&[events()], &[]).unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert!(matches!(
        reader.check_access(&events(), AccessType::Write),
        Err(StrataError::AccessDenied { .. })
    ));
    reader.unlock_tables().unwrap();
    reader.rollback().unwrap();
    writer.join().unwrap();
}
