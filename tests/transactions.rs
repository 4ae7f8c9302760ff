use std::sync::{Arc, Mutex};

use stratadb::{ColumnInfo, DataType, Database, StrataError, Table, TableName, Transaction, TxnState, Value};

fn accounts() -> TableName {
    TableName::new("APP", "accounts")
}

fn open_with_accounts(balances: &[i64]) -> Database {
    let db = Database::default();
    let mut txn = db.begin();
    txn.create_table(
        accounts(),
        vec![
            ColumnInfo::new("owner", DataType::Text).not_null(),
            ColumnInfo::new("balance", DataType::Integer),
        ],
    )
    .unwrap();
    let table = txn.get_mutable_table(&accounts()).unwrap();
    for (i, balance) in balances.iter().enumerate() {
        table
            .add_row(vec![Value::from(format!("owner{i}")), Value::Integer(*balance)])
            .unwrap();
    }
    txn.commit().unwrap();
    db
}

fn balances(txn: &Transaction) -> Vec<i64> {
    let table = txn.get_table(&accounts()).unwrap();
    table
        .row_ids()
        .unwrap()
        .into_iter()
        .map(|row| table.cell(row, 1).unwrap().as_integer().unwrap())
        .collect()
}

fn row_with_balance(txn: &Transaction, balance: i64) -> u64 {
    let table = txn.get_table(&accounts()).unwrap();
    table
        .row_ids()
        .unwrap()
        .into_iter()
        .find(|row| table.cell(*row, 1).unwrap() == Value::Integer(balance))
        .unwrap()
}

#[test]
fn committed_removal_is_invisible_to_older_snapshots() {
    let db = open_with_accounts(&[10, 20, 30]);
    let a = db.begin();
    let b = db.begin();

    let row = row_with_balance(&a, 20);
    a.get_mutable_table(&accounts()).unwrap().remove_row(row).unwrap();
    a.commit().unwrap();

    assert_eq!(balances(&b), vec![10, 20, 30]);
    b.rollback().unwrap();

    let c = db.begin();
    assert_eq!(balances(&c), vec![10, 30]);
}

#[test]
fn update_stages_a_new_row_version() {
    let db = open_with_accounts(&[10, 20]);
    let txn = db.begin();
    let row = row_with_balance(&txn, 10);
    let table = txn.get_mutable_table(&accounts()).unwrap();
    let new_row = table
        .update_row(row, vec![Value::from("owner0"), Value::Integer(15)])
        .unwrap();
    assert_ne!(row, new_row);
    txn.commit().unwrap();

    let mut after = balances(&db.begin());
    after.sort_unstable();
    assert_eq!(after, vec![15, 20]);
}

#[test]
fn removing_the_same_row_twice_conflicts() {
    let db = open_with_accounts(&[10, 20]);
    let first = db.begin();
    let second = db.begin();

    let row = row_with_balance(&first, 10);
    first.get_mutable_table(&accounts()).unwrap().remove_row(row).unwrap();
    second.get_mutable_table(&accounts()).unwrap().remove_row(row).unwrap();
    second
        .get_mutable_table(&accounts())
        .unwrap()
        .add_row(vec![Value::from("late"), Value::Integer(99)])
        .unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StrataError::CommitConflict { .. }));

    // Nothing from the failed commit is applied.
    assert_eq!(balances(&db.begin()), vec![20]);
    assert!(!db.global().has_active_transactions());
}

#[test]
fn read_only_transactions_reject_every_write() {
    let db = open_with_accounts(&[10]);
    let mut txn = db.begin_read_only();
    assert!(txn.is_read_only());

    let table = txn.get_mutable_table(&accounts()).unwrap();
    assert!(matches!(
        table.add_row(vec![Value::from("x"), Value::Integer(1)]),
        Err(StrataError::ReadOnlyViolation)
    ));
    assert!(matches!(
        txn.create_table(TableName::new("APP", "other"), Vec::new()),
        Err(StrataError::ReadOnlyViolation)
    ));
    assert!(matches!(txn.drop_table(&accounts()), Err(StrataError::ReadOnlyViolation)));
    assert_eq!(balances(&txn), vec![10]);
    txn.commit().unwrap();
}

#[test]
fn dropping_a_transaction_rolls_it_back() {
    let db = open_with_accounts(&[10]);
    {
        let txn = db.begin();
        txn.get_mutable_table(&accounts())
            .unwrap()
            .add_row(vec![Value::from("ghost"), Value::Integer(1)])
            .unwrap();
        assert_eq!(txn.state(), TxnState::Active);
    }
    assert!(!db.global().has_active_transactions());
    assert_eq!(balances(&db.begin()), vec![10]);
}

#[test]
fn commit_callbacks_see_each_changed_table() {
    let db = open_with_accounts(&[10]);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut txn = db.begin();
    let sink = seen.clone();
    txn.register_on_commit(move |info| {
        sink.lock()
            .unwrap()
            .push((info.table_name.clone(), info.added_rows.len(), info.removed_rows.len()));
    });
    let row = row_with_balance(&txn, 10);
    let table = txn.get_mutable_table(&accounts()).unwrap();
    table.remove_row(row).unwrap();
    table.add_row(vec![Value::from("a"), Value::Integer(1)]).unwrap();
    table.add_row(vec![Value::from("b"), Value::Integer(2)]).unwrap();
    txn.commit().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(accounts(), 2, 1)]);
}

#[test]
fn dropped_tables_disappear_after_commit() {
    let db = open_with_accounts(&[10]);
    let reader = db.begin();

    let mut txn = db.begin();
    txn.drop_table(&accounts()).unwrap();
    assert!(!txn.table_exists(&accounts()));
    txn.commit().unwrap();

    assert!(reader.table_exists(&accounts()));
    assert!(!db.begin().table_exists(&accounts()));
    assert!(db.global().find_committed(&accounts()).is_none());
}

#[test]
fn unqualified_names_resolve_against_the_default_schema() {
    let db = open_with_accounts(&[]);
    let txn = db.begin();
    assert_eq!(txn.resolve_name("accounts").unwrap(), accounts());
    assert_eq!(
        txn.resolve_name("SYSTEM.views").unwrap(),
        TableName::new("SYSTEM", "views")
    );
    assert!(txn.real_table_exists(&accounts()));
    assert_eq!(txn.get_table_type(&accounts()).unwrap(), "TABLE");
}
