use stratadb::query::BinaryOp;
use stratadb::txn::CursorAttributes;
use stratadb::{
    ColumnInfo, ColumnRef, DataType, Database, DatabaseConfig, Expr, FunctionColumn, QueryPlanNode, StrataError,
    Table, TableName, Value,
};

fn name(n: &str) -> TableName {
    TableName::new("APP", n)
}

fn open(config: DatabaseConfig) -> Database {
    let db = Database::open(config);
    let mut txn = db.begin();
    txn.create_table(
        name("customers"),
        vec![
            ColumnInfo::new("id", DataType::Integer),
            ColumnInfo::new("name", DataType::Text),
        ],
    )
    .unwrap();
    txn.create_table(
        name("orders"),
        vec![
            ColumnInfo::new("id", DataType::Integer),
            ColumnInfo::new("item", DataType::Text),
        ],
    )
    .unwrap();

    let customers = txn.get_mutable_table(&name("customers")).unwrap();
    for (id, who) in [(1, "ada"), (2, "bob"), (3, "cy")] {
        customers.add_row(vec![Value::Integer(id), Value::from(who)]).unwrap();
    }
    let orders = txn.get_mutable_table(&name("orders")).unwrap();
    for (id, item) in [(1, "lamp"), (1, "desk"), (3, "pen")] {
        orders.add_row(vec![Value::Integer(id), Value::from(item)]).unwrap();
    }
    txn.commit().unwrap();
    db
}

fn rows(table: &dyn Table) -> Vec<Vec<Value>> {
    table
        .row_ids()
        .unwrap()
        .into_iter()
        .map(|row| table.row_values(row).unwrap())
        .collect()
}

fn row(values: &[Value]) -> Vec<Value> {
    values.to_vec()
}

fn labelled_orders() -> QueryPlanNode {
    QueryPlanNode::create_functions(
        QueryPlanNode::fetch_table(name("orders")),
        vec![FunctionColumn::new(
            "label",
            Expr::call("upper", vec![Expr::column("item")]),
        )],
    )
}

#[test]
fn join_reads_the_transaction_snapshot() {
    let db = open(DatabaseConfig::default());
    let reader = db.begin();

    let writer = db.begin();
    writer
        .get_mutable_table(&name("orders"))
        .unwrap()
        .add_row(vec![Value::Integer(2), Value::from("mug")])
        .unwrap();
    writer.commit().unwrap();

    let plan = QueryPlanNode::natural_join(
        QueryPlanNode::fetch_table(name("customers")),
        QueryPlanNode::fetch_table(name("orders")),
    );
    let joined = plan.evaluate(&reader).unwrap();
    assert_eq!(
        rows(joined.as_ref()),
        vec![
            row(&[Value::Integer(1), Value::from("ada"), Value::from("lamp")]),
            row(&[Value::Integer(1), Value::from("ada"), Value::from("desk")]),
            row(&[Value::Integer(3), Value::from("cy"), Value::from("pen")]),
        ]
    );

    let later = db.begin();
    assert_eq!(plan.evaluate(&later).unwrap().row_count().unwrap(), 4);
}

#[test]
fn union_of_a_table_with_itself_is_distinct() {
    let db = open(DatabaseConfig::default());
    let txn = db.begin();
    let plan = QueryPlanNode::logical_union(
        QueryPlanNode::fetch_table(name("customers")),
        QueryPlanNode::fetch_table(name("customers")),
    );
    assert_eq!(plan.evaluate(&txn).unwrap().row_count().unwrap(), 3);

    let mismatched = QueryPlanNode::logical_union(
        QueryPlanNode::fetch_table(name("customers")),
        labelled_orders(),
    );
    assert!(matches!(
        mismatched.evaluate(&txn),
        Err(StrataError::IncompatibleUnion(_))
    ));
}

#[test]
fn views_are_stored_and_evaluated_through_the_catalog() {
    let db = open(DatabaseConfig::default());
    let views = db.view_manager().unwrap().clone();

    let txn = db.begin();
    views
        .define_view(&txn, &name("labels"), "SELECT *, UPPER(item) AS label FROM orders", &labelled_orders())
        .unwrap();
    assert!(views.view_exists(&txn, &name("labels")).unwrap());
    txn.commit().unwrap();

    let reader = db.begin();
    assert_eq!(views.view_names(&reader).unwrap(), vec![name("labels")]);
    assert_eq!(
        views.view_query(&reader, &name("labels")).unwrap().as_deref(),
        Some("SELECT *, UPPER(item) AS label FROM orders")
    );

    let alias = name("o");
    let plan = QueryPlanNode::fetch_view(name("labels")).with_alias(alias.clone());
    let table = plan.evaluate(&reader).unwrap();
    assert_eq!(table.name(), &alias);
    let label = table
        .resolve_column(&ColumnRef::qualified(alias, "label"))
        .unwrap();
    let first = table.row_ids().unwrap()[0];
    assert_eq!(table.cell(first, label).unwrap(), Value::from("LAMP"));
}

#[test]
fn redefining_a_view_evicts_the_cached_plan() {
    let db = open(DatabaseConfig::default());
    let views = db.view_manager().unwrap().clone();

    let txn = db.begin();
    views
        .define_view(&txn, &name("v"), "SELECT * FROM customers", &QueryPlanNode::fetch_table(name("customers")))
        .unwrap();
    txn.commit().unwrap();

    let reader = db.begin();
    let plan = QueryPlanNode::fetch_view(name("v"));
    assert_eq!(plan.evaluate(&reader).unwrap().row_count().unwrap(), 3);
    assert_eq!(views.cached_plan_count(), 1);

    let txn = db.begin();
    views
        .define_view(&txn, &name("v"), "SELECT * FROM orders", &QueryPlanNode::fetch_table(name("orders")))
        .unwrap();
    txn.commit().unwrap();
    assert_eq!(views.cached_plan_count(), 0);

    let later = db.begin();
    let table = plan.evaluate(&later).unwrap();
    assert_eq!(table.name(), &name("orders"));
    assert_eq!(views.view_names(&later).unwrap().len(), 1);
}

#[test]
fn dropped_views_can_no_longer_be_fetched() {
    let db = open(DatabaseConfig::default());
    let views = db.view_manager().unwrap().clone();

    let txn = db.begin();
    views
        .define_view(&txn, &name("v"), "SELECT * FROM customers", &QueryPlanNode::fetch_table(name("customers")))
        .unwrap();
    txn.commit().unwrap();

    let txn = db.begin();
    assert!(views.drop_view(&txn, &name("v")).unwrap());
    assert!(!views.drop_view(&txn, &name("v")).unwrap());
    txn.commit().unwrap();

    let reader = db.begin();
    assert!(matches!(
        QueryPlanNode::fetch_view(name("v")).evaluate(&reader),
        Err(StrataError::ViewNotFound(_))
    ));
}

#[test]
fn views_need_the_view_catalog() {
    let db = open(DatabaseConfig::new().views_enabled(false));
    assert!(db.view_manager().is_none());

    let txn = db.begin();
    assert!(!txn.table_exists(&TableName::new("SYSTEM", "views")));
    assert!(matches!(
        QueryPlanNode::fetch_view(name("v")).evaluate(&txn),
        Err(StrataError::ViewNotFound(_))
    ));
}

#[test]
fn cursors_iterate_an_evaluated_plan() {
    let db = open(DatabaseConfig::default());
    let mut txn = db.begin();
    let cursor = name("c");
    let plan = QueryPlanNode::create_functions(
        QueryPlanNode::fetch_table(name("customers")),
        vec![FunctionColumn::new(
            "double_id",
            Expr::binary(BinaryOp::Multiply, Expr::column("id"), Expr::constant(Value::Integer(2))),
        )],
    );
    txn.declare_cursor(cursor.clone(), plan, CursorAttributes::default())
        .unwrap();
    txn.open_cursor(&cursor).unwrap();

    let mut doubled = Vec::new();
    while let Some(values) = txn.fetch_next(&cursor).unwrap() {
        doubled.push(values[2].as_integer().unwrap());
    }
    assert_eq!(doubled, vec![2, 4, 6]);

    txn.close_cursor(&cursor).unwrap();
    txn.drop_cursor(&cursor).unwrap();
    assert!(!txn.cursor_exists(&cursor));
}

#[test]
fn plans_join_dynamic_tables() {
    let db = open(DatabaseConfig::default());
    let regions = TableName::new("SYS", "regions");
    db.dynamic_tables()
        .register(
            regions.clone(),
            "SYSTEM TABLE",
            vec![
                ColumnInfo::new("id", DataType::Integer),
                ColumnInfo::new("region", DataType::Text),
            ],
            vec![
                vec![Value::Integer(2), Value::from("north")],
                vec![Value::Integer(3), Value::from("south")],
            ],
        )
        .unwrap();

    let txn = db.begin();
    assert_eq!(txn.get_table_type(&regions).unwrap(), "SYSTEM TABLE");
    let plan = QueryPlanNode::natural_join(
        QueryPlanNode::fetch_table(name("customers")),
        QueryPlanNode::fetch_table(regions),
    );
    assert_eq!(
        rows(plan.evaluate(&txn).unwrap().as_ref()),
        vec![
            row(&[Value::Integer(2), Value::from("bob"), Value::from("north")]),
            row(&[Value::Integer(3), Value::from("cy"), Value::from("south")]),
        ]
    );
}

#[test]
fn identifier_case_can_be_ignored() {
    let db = open(DatabaseConfig::new().ignore_identifier_case(true));
    let txn = db.begin();
    assert_eq!(txn.resolve_name("CUSTOMERS").unwrap(), name("customers"));

    let plan = QueryPlanNode::fetch_table(TableName::new("app", "Customers"));
    assert_eq!(plan.evaluate(&txn).unwrap().row_count().unwrap(), 3);
}

#[test]
fn views_that_expand_into_themselves_are_rejected() {
    let db = open(DatabaseConfig::default());
    let views = db.view_manager().unwrap().clone();

    let txn = db.begin();
    assert!(matches!(
        views.define_view(&txn, &name("me"), "SELECT * FROM me", &QueryPlanNode::fetch_view(name("me"))),
        Err(StrataError::RecursiveView(n)) if n == name("me")
    ));
    views
        .define_view(&txn, &name("a"), "SELECT * FROM customers", &QueryPlanNode::fetch_table(name("customers")))
        .unwrap();
    views
        .define_view(&txn, &name("b"), "SELECT * FROM a", &QueryPlanNode::fetch_view(name("a")))
        .unwrap();
    let back_to_b = QueryPlanNode::natural_join(
        QueryPlanNode::fetch_table(name("customers")),
        QueryPlanNode::fetch_view(name("b")),
    );
    assert!(matches!(
        views.define_view(&txn, &name("a"), "SELECT * FROM customers NATURAL JOIN b", &back_to_b),
        Err(StrataError::RecursiveView(n)) if n == name("a")
    ));
    txn.commit().unwrap();

    // The rejected redefinition left the stored view untouched.
    let reader = db.begin();
    assert_eq!(
        views.view_query(&reader, &name("a")).unwrap().as_deref(),
        Some("SELECT * FROM customers")
    );
    assert!(!views.view_exists(&reader, &name("me")).unwrap());
    assert_eq!(
        QueryPlanNode::fetch_view(name("b")).evaluate(&reader).unwrap().row_count().unwrap(),
        3
    );
}

#[test]
fn the_same_snapshot_evaluates_to_the_same_result() {
    let db = open(DatabaseConfig::default());
    let plan = QueryPlanNode::natural_join(
        QueryPlanNode::fetch_table(name("customers")),
        labelled_orders(),
    );

    let first = db.begin();
    let second = db.begin();
    let left = plan.evaluate(&first).unwrap();
    let right = plan.evaluate(&second).unwrap();

    let column_names = |table: &dyn Table| -> Vec<String> {
        table.columns().iter().map(|c| c.column.name.clone()).collect()
    };
    assert_eq!(column_names(left.as_ref()), column_names(right.as_ref()));
    assert_eq!(column_names(left.as_ref()), vec!["id", "name", "item", "label"]);
    assert_eq!(rows(left.as_ref()), rows(right.as_ref()));
    assert_eq!(rows(left.as_ref()).len(), 3);
}

#[test]
fn joins_match_integer_and_float_keys_like_comparisons_do() {
    let db = open(DatabaseConfig::default());
    let mut txn = db.begin();
    txn.create_table(
        name("rates"),
        vec![
            ColumnInfo::new("id", DataType::Float),
            ColumnInfo::new("rate", DataType::Text),
        ],
    )
    .unwrap();
    let rates = txn.get_mutable_table(&name("rates")).unwrap();
    rates.add_row(vec![Value::Float(1.0), Value::from("low")]).unwrap();
    rates.add_row(vec![Value::Integer(3), Value::from("high")]).unwrap();
    rates.add_row(vec![Value::Float(2.5), Value::from("odd")]).unwrap();
    txn.commit().unwrap();

    let reader = db.begin();
    let plan = QueryPlanNode::create_functions(
        QueryPlanNode::natural_join(
            QueryPlanNode::fetch_table(name("customers")),
            QueryPlanNode::fetch_table(name("rates")),
        ),
        vec![FunctionColumn::new(
            "same",
            Expr::binary(BinaryOp::Equal, Expr::column("id"), Expr::constant(Value::Float(1.0))),
        )],
    );
    assert_eq!(
        rows(plan.evaluate(&reader).unwrap().as_ref()),
        vec![
            row(&[Value::Integer(1), Value::from("ada"), Value::from("low"), Value::Boolean(true)]),
            row(&[Value::Integer(3), Value::from("cy"), Value::from("high"), Value::Boolean(false)]),
        ]
    );
}

#[test]
fn plans_of_rolled_back_views_are_not_cached() {
    let db = open(DatabaseConfig::default());
    let views = db.view_manager().unwrap().clone();

    let txn = db.begin();
    views
        .define_view(&txn, &name("v"), "SELECT * FROM customers", &QueryPlanNode::fetch_table(name("customers")))
        .unwrap();
    let plan = QueryPlanNode::fetch_view(name("v"));
    assert_eq!(plan.evaluate(&txn).unwrap().row_count().unwrap(), 3);
    assert_eq!(views.cached_plan_count(), 0);
    txn.rollback().unwrap();

    let reader = db.begin();
    assert!(matches!(plan.evaluate(&reader), Err(StrataError::ViewNotFound(_))));
    assert_eq!(views.cached_plan_count(), 0);
}
