//! Balance and purchase semantics: all-or-nothing batches, oldest-first
//! allocation, corrective balance overrides and rollback on failure.

use keyhub::db::ledger;
use keyhub::error::AppError;
use keyhub::models::*;

use crate::helpers::*;

#[test]
fn buy_reserves_oldest_stock_and_debits_once_per_key() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1", "k2", "k3"]);
    ledger::set_balance(&mut conn, &reseller.id, 1200).unwrap();

    let tokens = ledger::buy_keys(&mut conn, &reseller.id, &product, 2).unwrap();

    assert_eq!(tokens, vec!["k1".to_string(), "k2".to_string()]);
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 200);
    assert_eq!(key_status(&conn, "k1"), KeyStatus::Reserved);
    assert_eq!(key_status(&conn, "k2"), KeyStatus::Reserved);
    assert_eq!(key_status(&conn, "k3"), KeyStatus::Available);

    let txns = keyhub::db::queries::list_transactions_for_reseller(&conn, &reseller.id, 100).unwrap();
    let debits: Vec<&Transaction> = txns
        .iter()
        .filter(|t| t.kind == TransactionType::Debit)
        .collect();
    assert_eq!(debits.len(), 2);
    assert!(debits.iter().all(|t| t.amount_cents == -500));
    assert!(debits.iter().all(|t| t.key_id.is_some()));
}

#[test]
fn buy_fails_without_touching_anything_when_balance_is_short() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1", "k2"]);
    ledger::set_balance(&mut conn, &reseller.id, 400).unwrap();
    let txns_before = transaction_count(&conn, &reseller.id);

    let err = ledger::buy_keys(&mut conn, &reseller.id, &product, 1).unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds));
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 400);
    assert_eq!(key_status(&conn, "k1"), KeyStatus::Available);
    assert_eq!(transaction_count(&conn, &reseller.id), txns_before);
}

#[test]
fn buy_is_all_or_nothing_when_stock_is_short() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 100);
    upload_stock(&mut conn, &product, &["k1", "k2", "k3"]);
    ledger::set_balance(&mut conn, &reseller.id, 10_000).unwrap();

    let err = ledger::buy_keys(&mut conn, &reseller.id, &product, 5).unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 10_000);
    for token in ["k1", "k2", "k3"] {
        assert_eq!(key_status(&conn, token), KeyStatus::Available);
    }
}

#[test]
fn buy_rejects_zero_quantity() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 100);

    let err = ledger::buy_keys(&mut conn, &reseller.id, &product, 0).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[test]
fn upload_skips_duplicate_and_blank_tokens() {
    let mut conn = setup();
    let product = create_product(&conn, "pro", 100);

    let tokens = vec![
        "a".to_string(),
        "b".to_string(),
        "a".to_string(),
        "   ".to_string(),
    ];
    let outcome = ledger::upload_keys(&mut conn, &product, &tokens, None).unwrap();

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.debit_cents, 0);

    // Re-uploading the same tokens inserts nothing.
    let outcome = ledger::upload_keys(&mut conn, &product, &tokens, None).unwrap();
    assert_eq!(outcome.inserted, 0);
}

#[test]
fn owned_upload_debits_the_owner_for_inserted_keys_only() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 400);
    ledger::set_balance(&mut conn, &reseller.id, 1000).unwrap();

    let tokens = vec!["a".to_string(), "b".to_string(), "a".to_string()];
    let outcome = ledger::upload_keys(&mut conn, &product, &tokens, Some(&reseller.id)).unwrap();

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.debit_cents, 800);
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 200);
    assert_eq!(key_status(&conn, "a"), KeyStatus::Reserved);
}

#[test]
fn owned_upload_rolls_back_entirely_when_balance_is_short() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let product = create_product(&conn, "pro", 400);
    ledger::set_balance(&mut conn, &reseller.id, 300).unwrap();

    let tokens = vec!["a".to_string(), "b".to_string()];
    let err = ledger::upload_keys(&mut conn, &product, &tokens, Some(&reseller.id)).unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds));
    assert!(keyhub::db::queries::get_key_by_token(&conn, "a").unwrap().is_none());
    assert!(keyhub::db::queries::get_key_by_token(&conn, "b").unwrap().is_none());
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 300);
}

#[test]
fn set_balance_appends_a_corrective_entry() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);

    assert_eq!(ledger::set_balance(&mut conn, &reseller.id, 1000).unwrap(), 1000);
    assert_eq!(ledger::set_balance(&mut conn, &reseller.id, 400).unwrap(), -600);
    assert_eq!(ledger::set_balance(&mut conn, &reseller.id, 400).unwrap(), 0);

    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 400);

    // The ledger reconciles to the snapshot: +1000 credit, -600 debit.
    let txns =
        keyhub::db::queries::list_transactions_for_reseller(&conn, &reseller.id, 100).unwrap();
    assert_eq!(txns.len(), 2);
    let sum: i64 = txns.iter().map(|t| t.amount_cents).sum();
    assert_eq!(sum, 400);
}

#[test]
fn set_balance_rejects_negative_amounts() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let err = ledger::set_balance(&mut conn, &reseller.id, -1).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[test]
fn standalone_debit_checks_and_records_atomically() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    ledger::set_balance(&mut conn, &reseller.id, 1000).unwrap();

    let remaining = ledger::debit(&mut conn, &reseller.id, 250, None, None).unwrap();
    assert_eq!(remaining, 750);

    let err = ledger::debit(&mut conn, &reseller.id, 0, None, None).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = ledger::debit(&mut conn, &reseller.id, 10_000, None, None).unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds));
    assert_eq!(ledger::current_balance(&conn, &reseller.id).unwrap(), 750);
}

#[test]
fn concurrent_buyers_never_double_allocate_a_key() {
    use rusqlite::Connection;
    use std::time::Duration;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let open = |path: &std::path::Path| {
        let conn = Connection::open(path).unwrap();
        conn.busy_timeout(Duration::from_secs(5)).unwrap();
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .unwrap();
        conn
    };

    let mut conn = open(&path);
    keyhub::db::init_schema(&conn).unwrap();
    let a = create_account(&conn, "shop_a", Role::Reseller);
    let b = create_account(&conn, "shop_b", Role::Reseller);
    let product = create_product(&conn, "pro", 100);
    upload_stock(&mut conn, &product, &["only"]);
    ledger::set_balance(&mut conn, &a.id, 1000).unwrap();
    ledger::set_balance(&mut conn, &b.id, 1000).unwrap();

    let results: Vec<bool> = std::thread::scope(|scope| {
        [&a.id, &b.id]
            .map(|reseller_id| {
                let path = path.clone();
                let product = product.clone();
                scope.spawn(move || {
                    let mut conn = open(&path);
                    ledger::buy_keys(&mut conn, reseller_id, &product, 1).is_ok()
                })
            })
            .map(|handle| handle.join().unwrap())
            .to_vec()
    });

    // Exactly one buyer wins the single key.
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(key_status(&conn, "only"), KeyStatus::Reserved);

    let total = ledger::current_balance(&conn, &a.id).unwrap()
        + ledger::current_balance(&conn, &b.id).unwrap();
    assert_eq!(total, 1900);
}
