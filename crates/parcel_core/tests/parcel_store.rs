use parcel_core::db::migrations::{apply_migrations, latest_version};
use parcel_core::db::{open_db, open_db_in_memory};
use parcel_core::{Parcel, ParcelStatus, ParcelStore, RepoError, SqliteParcelStore};
use rusqlite::Connection;
use std::collections::HashSet;

fn test_parcel(client: i64, address: &str) -> Parcel {
    Parcel::new(
        client,
        ParcelStatus::Registered,
        address,
        "2024-01-01T00:00:00Z",
    )
}

#[test]
fn add_get_update_delete_scenario() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let number = store.add(&test_parcel(42, "A St")).unwrap();
    assert_eq!(number, 1);

    let loaded = store.get(1).unwrap();
    assert_eq!(loaded.number, 1);
    assert_eq!(loaded.client, 42);
    assert_eq!(loaded.status, ParcelStatus::Registered);
    assert_eq!(loaded.address, "A St");
    assert_eq!(loaded.created_at, "2024-01-01T00:00:00Z");

    store.set_status(1, ParcelStatus::Sent).unwrap();
    assert_eq!(store.get(1).unwrap().status, ParcelStatus::Sent);

    store.set_address(1, "B St").unwrap();
    assert_eq!(store.get(1).unwrap().address, "B St");

    store.delete(1).unwrap();
    let err = store.get(1).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(1)));
    assert!(err.is_not_found());
}

#[test]
fn add_ignores_caller_supplied_number() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let mut parcel = test_parcel(5, "Elm St");
    parcel.number = 999;
    let number = store.add(&parcel).unwrap();

    assert_ne!(number, 999);
    assert!(store.get(999).unwrap_err().is_not_found());
    assert_eq!(store.get(number).unwrap().address, "Elm St");
}

#[test]
fn numbers_are_never_reused_after_delete() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let first = store.add(&test_parcel(1, "one")).unwrap();
    let second = store.add(&test_parcel(1, "two")).unwrap();
    store.delete(second).unwrap();
    let third = store.add(&test_parcel(1, "three")).unwrap();

    assert!(second > first);
    assert!(third > second);
}

#[test]
fn set_address_twice_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();
    let number = store.add(&test_parcel(3, "Old Rd")).unwrap();

    store.set_address(number, "New Rd").unwrap();
    store.set_address(number, "New Rd").unwrap();

    assert_eq!(store.get(number).unwrap().address, "New Rd");
}

#[test]
fn mutations_on_missing_number_succeed_without_effect() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();
    let number = store.add(&test_parcel(3, "Kept Rd")).unwrap();
    let before = store.get(number).unwrap();

    store.set_status(number + 100, ParcelStatus::Sent).unwrap();
    store.set_address(number + 100, "Elsewhere").unwrap();
    store.delete(number + 100).unwrap();

    assert_eq!(store.get(number).unwrap(), before);
    assert_eq!(store.get_by_client(3).unwrap().len(), 1);
}

#[test]
fn conditional_writes_apply_only_while_status_matches() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();
    let number = store.add(&test_parcel(6, "Guard St")).unwrap();

    assert!(store
        .set_status_if(number, ParcelStatus::Registered, ParcelStatus::Sent)
        .unwrap());
    assert!(!store
        .set_status_if(number, ParcelStatus::Registered, ParcelStatus::Sent)
        .unwrap());
    assert!(!store
        .set_address_if(number, ParcelStatus::Registered, "Late St")
        .unwrap());
    assert!(!store.delete_if(number, ParcelStatus::Registered).unwrap());

    let stored = store.get(number).unwrap();
    assert_eq!(stored.status, ParcelStatus::Sent);
    assert_eq!(stored.address, "Guard St");

    assert!(store
        .set_address_if(number, ParcelStatus::Sent, "Sent St")
        .unwrap());
    assert!(store.delete_if(number, ParcelStatus::Sent).unwrap());
    assert!(store.get(number).unwrap_err().is_not_found());
}

#[test]
fn conditional_writes_on_missing_number_report_no_change() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    assert!(!store
        .set_status_if(9, ParcelStatus::Registered, ParcelStatus::Sent)
        .unwrap());
    assert!(!store
        .set_address_if(9, ParcelStatus::Registered, "Nowhere")
        .unwrap());
    assert!(!store.delete_if(9, ParcelStatus::Registered).unwrap());
}

#[test]
fn get_by_client_returns_only_that_clients_parcels() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let a = store.add(&test_parcel(7, "Address 1")).unwrap();
    let b = store.add(&test_parcel(7, "Address 2")).unwrap();
    store.add(&test_parcel(9, "Other")).unwrap();

    let parcels = store.get_by_client(7).unwrap();
    assert_eq!(parcels.len(), 2);
    assert!(parcels.iter().all(|parcel| parcel.client == 7));
    let numbers: HashSet<_> = parcels.iter().map(|parcel| parcel.number).collect();
    assert_eq!(numbers, HashSet::from([a, b]));

    assert!(store.get_by_client(8).unwrap().is_empty());
}

#[test]
fn get_by_client_excludes_deleted_and_is_ordered_by_number() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let first = store.add(&test_parcel(11, "first")).unwrap();
    let removed = store.add(&test_parcel(11, "removed")).unwrap();
    let last = store.add(&test_parcel(11, "last")).unwrap();
    store.delete(removed).unwrap();

    let numbers: Vec<_> = store
        .get_by_client(11)
        .unwrap()
        .into_iter()
        .map(|parcel| parcel.number)
        .collect();
    assert_eq!(numbers, vec![first, last]);
}

#[test]
fn store_is_usable_through_trait_object() {
    let conn = open_db_in_memory().unwrap();
    let sqlite = SqliteParcelStore::try_new(&conn).unwrap();
    let store: &dyn ParcelStore = &sqlite;

    let number = store.add(&test_parcel(1, "dyn")).unwrap();
    assert_eq!(store.get(number).unwrap().client, 1);
}

#[test]
fn unknown_persisted_status_is_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO parcel (client, status, address, created_at)
         VALUES (1, 'lost', 'Nowhere', '2024-01-01T00:00:00Z');",
        [],
    )
    .unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let err = store.get(1).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(ref message) if message.contains("lost")));
    assert!(matches!(
        store.get_by_client(1),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn null_persisted_column_is_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO parcel (client, status, address, created_at)
         VALUES (1, 'sent', NULL, '2024-01-01T00:00:00Z');",
        [],
    )
    .unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let err = store.get(1).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(ref message) if message.contains("address")));
}

#[test]
fn storage_failure_surfaces_as_db_error() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();
    conn.execute_batch("DROP TABLE parcel;").unwrap();

    assert!(matches!(
        store.add(&test_parcel(1, "gone")),
        Err(RepoError::Db(_))
    ));
    assert!(matches!(store.get(1), Err(RepoError::Db(_))));
    assert!(matches!(store.delete(1), Err(RepoError::Db(_))));
}

#[test]
fn store_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteParcelStore::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn store_rejects_connection_without_parcel_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteParcelStore::try_new(&conn),
        Err(RepoError::MissingRequiredTable("parcel"))
    ));
}

#[test]
fn store_rejects_parcel_table_missing_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE parcel (
            number INTEGER PRIMARY KEY AUTOINCREMENT,
            client INTEGER,
            status TEXT,
            address TEXT
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteParcelStore::try_new(&conn),
        Err(RepoError::MissingRequiredColumn {
            table: "parcel",
            column: "created_at"
        })
    ));
}

#[test]
fn caller_created_table_is_adopted_by_migrations() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS parcel (
            number INTEGER PRIMARY KEY AUTOINCREMENT,
            client INTEGER,
            status TEXT,
            address TEXT,
            created_at TEXT
        );
        INSERT INTO parcel (client, status, address, created_at)
        VALUES (4, 'registered', 'Legacy Ln', '2023-12-31T23:59:59Z');",
    )
    .unwrap();

    apply_migrations(&mut conn).unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();

    let legacy = store.get(1).unwrap();
    assert_eq!(legacy.address, "Legacy Ln");
    assert_eq!(store.add(&test_parcel(4, "Next")).unwrap(), 2);
}

#[test]
fn parcels_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.db");

    let number = {
        let conn = open_db(&path).unwrap();
        let store = SqliteParcelStore::try_new(&conn).unwrap();
        store.add(&test_parcel(21, "Durable Dr")).unwrap()
    };

    let conn = open_db(&path).unwrap();
    let store = SqliteParcelStore::try_new(&conn).unwrap();
    assert_eq!(store.get(number).unwrap().address, "Durable Dr");
}
